//! Versioned symbol and struct-layout table.
//!
//! Tables are generated out-of-band from the kernel build's debug info and
//! loaded here as JSON. A table may be partial; lookups that miss report a
//! pending error so callers can retry after more symbols arrive (module
//! tables, late extraction passes).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::symbols::types::{Field, StructLayout, TypeInfo};
use crate::symbols::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub address: u64,
    #[serde(rename = "type")]
    pub ty: TypeInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    /// Kernel build identifier the table was generated from.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    symbols: BTreeMap<String, Symbol>,
    #[serde(default)]
    structs: BTreeMap<String, StructLayout>,
}

impl SymbolTable {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    /// Load a table from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table: SymbolTable = serde_json::from_str(&fs::read_to_string(path.as_ref())?)?;
        info!(
            "loaded symbol table: kernel {}, {} symbols, {} struct layouts",
            table.version,
            table.symbols.len(),
            table.structs.len()
        );
        Ok(table)
    }

    pub fn insert(&mut self, name: impl Into<String>, address: u64, ty: TypeInfo) {
        self.symbols.insert(name.into(), Symbol { address, ty });
    }

    pub fn insert_struct(&mut self, name: impl Into<String>, layout: StructLayout) {
        self.structs.insert(name.into(), layout);
    }

    /// Merge another table in; its entries win on name collisions.
    pub fn extend(&mut self, other: SymbolTable) {
        debug!(
            "extending symbol table with {} symbols, {} struct layouts",
            other.symbols.len(),
            other.structs.len()
        );
        self.symbols.extend(other.symbols);
        self.structs.extend(other.structs);
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn has_struct(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn struct_count(&self) -> usize {
        self.structs.len()
    }

    /// The typed object a symbol names.
    pub fn value_of(&self, name: &str) -> Result<Value> {
        let sym = self
            .lookup(name)
            .ok_or_else(|| Error::SymbolPending(name.into()))?;
        Ok(Value::new(sym.ty.clone(), sym.address))
    }

    pub fn address_of(&self, name: &str) -> Result<u64> {
        Ok(self
            .lookup(name)
            .ok_or_else(|| Error::SymbolPending(name.into()))?
            .address)
    }

    pub fn struct_layout(&self, name: &str) -> Result<&StructLayout> {
        self.structs
            .get(name)
            .ok_or_else(|| Error::LayoutPending(name.into()))
    }

    pub fn field(&self, strukt: &str, field: &str) -> Result<&Field> {
        self.struct_layout(strukt)?
            .field(field)
            .ok_or_else(|| Error::MissingMember(strukt.into(), field.into()))
    }

    pub fn field_offset(&self, strukt: &str, field: &str) -> Result<u64> {
        Ok(self.field(strukt, field)?.offset)
    }

    /// Element count of an array symbol.
    pub fn array_len(&self, name: &str) -> Result<u64> {
        let sym = self
            .lookup(name)
            .ok_or_else(|| Error::SymbolPending(name.into()))?;
        sym.ty
            .array_len()
            .ok_or_else(|| Error::ArgumentType(format!("symbol {name} is not an array")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ulong() -> TypeInfo {
        TypeInfo::Int {
            size: 8,
            signed: false,
        }
    }

    #[test]
    fn test_missing_symbol_is_pending() {
        let table = SymbolTable::new("6.4.0-test");
        let err = table.value_of("jiffies").unwrap_err();
        assert!(err.is_pending());
    }

    #[test]
    fn test_extend_resolves_pending_lookup() {
        let mut table = SymbolTable::new("6.4.0-test");
        assert!(table.value_of("jiffies").is_err());

        let mut more = SymbolTable::default();
        more.insert("jiffies", 0xffff_ffff_8200_0000, ulong());
        table.extend(more);

        let value = table.value_of("jiffies").unwrap();
        assert_eq!(value.address, 0xffff_ffff_8200_0000);
    }

    #[test]
    fn test_field_lookup_errors() {
        let mut table = SymbolTable::new("6.4.0-test");
        assert!(table.field_offset("pcpu_chunk", "map").unwrap_err().is_pending());

        table.insert_struct(
            "pcpu_chunk",
            StructLayout {
                size: 40,
                fields: BTreeMap::from([(
                    "map".to_string(),
                    Field {
                        offset: 24,
                        ty: TypeInfo::pointer_to(TypeInfo::Int {
                            size: 4,
                            signed: true,
                        }),
                    },
                )]),
            },
        );

        assert_eq!(table.field_offset("pcpu_chunk", "map").unwrap(), 24);
        assert!(matches!(
            table.field_offset("pcpu_chunk", "nope"),
            Err(Error::MissingMember(_, _))
        ));
    }

    #[test]
    fn test_array_len() {
        let mut table = SymbolTable::new("6.4.0-test");
        table.insert(
            "__per_cpu_offset",
            0x1000,
            TypeInfo::array_of(ulong(), 64),
        );
        table.insert("pcpu_base_addr", 0x2000, ulong());

        assert_eq!(table.array_len("__per_cpu_offset").unwrap(), 64);
        assert!(matches!(
            table.array_len("pcpu_base_addr"),
            Err(Error::ArgumentType(_))
        ));
    }

    #[test]
    fn test_load_round_trip() {
        let mut table = SymbolTable::new("6.4.0-test");
        table.insert("init_task", 0xffff_ffff_8260_c940, TypeInfo::Struct {
            name: "task_struct".into(),
            size: 9792,
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.json");
        fs::write(&path, serde_json::to_string_pretty(&table).unwrap()).unwrap();

        let loaded = SymbolTable::load(&path).unwrap();
        assert_eq!(loaded.version, "6.4.0-test");
        assert_eq!(loaded.address_of("init_task").unwrap(), 0xffff_ffff_8260_c940);
    }
}
