use tracing::debug;

use crate::error::{Error, Result};
use crate::image::ReadImage;
use crate::symbols::{SymbolTable, TypeInfo};

/// Symbols the static descriptor binds against.
#[cfg(feature = "debug-tools")]
pub(crate) const REQUIRED_SYMBOLS: &[&str] = &["__per_cpu_start", "__per_cpu_end"];

/// Symbols the offset table binds against.
#[cfg(feature = "debug-tools")]
pub(crate) const OFFSET_SYMBOLS: &[&str] = &["__per_cpu_offset"];

/// The link-time per-CPU template region.
///
/// Every compile-time per-CPU variable lives at `[start, start + size)`;
/// each CPU's instance is that address rebased by the offset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRegion {
    pub start: u64,
    pub size: u64,
}

impl StaticRegion {
    /// Bind against the section boundary markers. Marker symbols carry no
    /// storage: their addresses are the values.
    pub(crate) fn bind(symbols: &SymbolTable) -> Result<Self> {
        let start = symbols.address_of("__per_cpu_start")?;
        let end = symbols.address_of("__per_cpu_end")?;
        let region = Self {
            start,
            size: end.wrapping_sub(start),
        };
        debug!(
            "static per-cpu region: {:#x} + {:#x}",
            region.start, region.size
        );
        Ok(region)
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr - self.start < self.size
    }
}

/// Per-logical-CPU displacement of the template region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetTable {
    offsets: Vec<u64>,
}

impl OffsetTable {
    /// Read the `__per_cpu_offset` array. The CPU count is the array
    /// type's element count.
    pub(crate) fn bind(image: &impl ReadImage, symbols: &SymbolTable) -> Result<Self> {
        let sym = symbols.value_of("__per_cpu_offset")?;
        let (stride, len) = match &sym.ty {
            TypeInfo::Array { element, len } => (element.size(), *len),
            other => {
                return Err(Error::ArgumentType(format!(
                    "__per_cpu_offset has type {other}, expected an array"
                )));
            }
        };
        if stride != 8 {
            return Err(Error::ArgumentType(format!(
                "__per_cpu_offset element width is {stride}, expected 8"
            )));
        }

        let mut offsets = Vec::with_capacity(len as usize);
        for cpu in 0..len {
            offsets.push(image.read_u64(sym.address + cpu * stride)?);
        }
        debug!("per-cpu offset table: {} cpus", offsets.len());
        Ok(Self { offsets })
    }

    pub fn nr_cpus(&self) -> u32 {
        self.offsets.len() as u32
    }

    pub fn get(&self, cpu: u32) -> Result<u64> {
        self.offsets
            .get(cpu as usize)
            .copied()
            .ok_or(Error::NoSuchCpu {
                cpu,
                nr_cpus: self.nr_cpus(),
            })
    }
}
