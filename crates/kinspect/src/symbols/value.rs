use crate::error::{Error, Result};
use crate::image::ReadImage;
use crate::symbols::types::TypeInfo;

/// A typed object at a known location in the image.
///
/// The value itself is not materialized; contents are read on demand
/// through the image accessor.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub ty: TypeInfo,
    pub address: u64,
}

impl Value {
    pub fn new(ty: TypeInfo, address: u64) -> Self {
        Self { ty, address }
    }

    pub fn is_pointer(&self) -> bool {
        self.ty.is_pointer()
    }

    /// Numeric contents of a pointer-typed value.
    pub fn read_pointer(&self, image: &impl ReadImage) -> Result<u64> {
        if !self.is_pointer() {
            return Err(Error::ArgumentType(format!(
                "value of type {} is not a pointer",
                self.ty
            )));
        }
        image.read_u64(self.address)
    }

    /// Integer contents, sign-extended for signed types.
    pub fn read_int(&self, image: &impl ReadImage) -> Result<i64> {
        let (size, signed) = match &self.ty {
            TypeInfo::Int { size, signed } => (*size, *signed),
            other => {
                return Err(Error::ArgumentType(format!(
                    "value of type {other} is not an integer"
                )));
            }
        };
        let raw = match size {
            1 => image.read_u8(self.address)? as u64,
            2 => image.read_u16(self.address)? as u64,
            4 => image.read_u32(self.address)? as u64,
            8 => image.read_u64(self.address)?,
            other => {
                return Err(Error::ArgumentType(format!(
                    "unsupported integer width {other}"
                )));
            }
        };
        if signed {
            // Sign-extend from the declared width.
            let shift = 64 - size as u32 * 8;
            Ok((raw as i64) << shift >> shift)
        } else {
            Ok(raw as i64)
        }
    }

    /// Follow a pointer: the pointee object at the target address.
    pub fn deref(&self, image: &impl ReadImage) -> Result<Value> {
        let target = self.read_pointer(image)?;
        let pointee = self.ty.pointee().ok_or_else(|| {
            Error::ArgumentType(format!("value of type {} is not a pointer", self.ty))
        })?;
        Ok(Value::new(pointee.clone(), target))
    }
}
