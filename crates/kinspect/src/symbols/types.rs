use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of a symbol or struct field, as recorded in the symbol file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeInfo {
    /// Linker markers and other symbols with no storage of their own.
    Void,
    Int {
        size: u8,
        signed: bool,
    },
    Pointer {
        pointee: Box<TypeInfo>,
    },
    Array {
        element: Box<TypeInfo>,
        len: u64,
    },
    Struct {
        name: String,
        size: u64,
    },
}

impl TypeInfo {
    pub fn pointer_to(pointee: TypeInfo) -> Self {
        TypeInfo::Pointer {
            pointee: Box::new(pointee),
        }
    }

    pub fn array_of(element: TypeInfo, len: u64) -> Self {
        TypeInfo::Array {
            element: Box::new(element),
            len,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            TypeInfo::Void => 0,
            TypeInfo::Int { size, .. } => *size as u64,
            TypeInfo::Pointer { .. } => 8,
            TypeInfo::Array { element, len } => element.size() * len,
            TypeInfo::Struct { size, .. } => *size,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeInfo::Pointer { .. })
    }

    pub fn pointee(&self) -> Option<&TypeInfo> {
        match self {
            TypeInfo::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<u64> {
        match self {
            TypeInfo::Array { len, .. } => Some(*len),
            _ => None,
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeInfo::Void => write!(f, "void"),
            TypeInfo::Int { size, signed } => {
                write!(f, "{}{}", if *signed { "i" } else { "u" }, *size as u32 * 8)
            }
            TypeInfo::Pointer { pointee } => write!(f, "{pointee} *"),
            TypeInfo::Array { element, len } => write!(f, "{element} [{len}]"),
            TypeInfo::Struct { name, .. } => write!(f, "struct {name}"),
        }
    }
}

/// A struct member: its byte offset and type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub offset: u64,
    #[serde(rename = "type")]
    pub ty: TypeInfo,
}

/// Field offsets for one struct of the imaged kernel build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructLayout {
    pub size: u64,
    pub fields: BTreeMap<String, Field>,
}

impl StructLayout {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }
}
