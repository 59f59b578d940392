//! Registered character devices, read from the kernel's `chrdevs` table.

use tracing::debug;

use crate::error::Result;
use crate::image::ReadImage;
use crate::symbols::SymbolTable;

#[cfg(feature = "debug-tools")]
pub(crate) const REQUIRED_SYMBOLS: &[&str] = &["chrdevs"];
#[cfg(feature = "debug-tools")]
pub(crate) const REQUIRED_STRUCTS: &[&str] = &["char_device_struct", "cdev"];

/// Length of the fixed name buffer in `char_device_struct`.
const CHRDEV_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct CharDev {
    /// Address of the `char_device_struct` in the image.
    pub address: u64,
    pub major: u32,
    pub name: String,
    /// Attached `struct cdev`, 0 when none is registered yet.
    pub cdev: u64,
    /// The cdev's file operations table, 0 without a cdev.
    pub ops: u64,
}

/// Scan the `chrdevs` registration table, skipping empty slots.
// TODO: follow each entry's `next` chain so majors sharing a hash slot are
// all listed, not just the slot head.
pub fn chardevs(image: &impl ReadImage, symbols: &SymbolTable) -> Result<Vec<CharDev>> {
    let table = symbols.address_of("chrdevs")?;
    let len = symbols.array_len("chrdevs")?;
    let major_off = symbols.field_offset("char_device_struct", "major")?;
    let name_off = symbols.field_offset("char_device_struct", "name")?;
    let cdev_off = symbols.field_offset("char_device_struct", "cdev")?;
    let ops_off = symbols.field_offset("cdev", "ops")?;

    let mut devs = Vec::new();
    for i in 0..len {
        let entry = image.read_u64(table + i * 8)?;
        if entry == 0 {
            continue;
        }
        let cdev = image.read_u64(entry + cdev_off)?;
        let ops = if cdev != 0 {
            image.read_u64(cdev + ops_off)?
        } else {
            0
        };
        devs.push(CharDev {
            address: entry,
            major: image.read_u32(entry + major_off)?,
            name: image.read_cstr(entry + name_off, CHRDEV_NAME_LEN)?,
            cdev,
            ops,
        });
    }
    debug!("chrdevs: {} registered entries", devs.len());
    Ok(devs)
}
