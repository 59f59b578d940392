//! Dynamic per-CPU chunk walk.
//!
//! The allocator tracks runtime per-CPU storage as chunks hanging off a
//! slot-indexed array of lists. Each chunk records its allocations in a
//! signed run-length map: negative entries are allocated byte runs,
//! non-negative entries are free runs. Walking every map once rebuilds the
//! set of live byte ranges, expressed in the static template's coordinate
//! space so they compare directly against template addresses.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::image::ReadImage;
use crate::lists::list_entries;
use crate::percpu::region::StaticRegion;
use crate::symbols::{SymbolTable, TypeInfo};

#[cfg(feature = "debug-tools")]
pub(crate) const REQUIRED_SYMBOLS: &[&str] = &["pcpu_base_addr", "pcpu_slot", "pcpu_nr_slots"];
#[cfg(feature = "debug-tools")]
pub(crate) const REQUIRED_STRUCTS: &[&str] = &["pcpu_chunk"];

/// A byte range of live dynamically-allocated per-CPU storage, in the
/// static template's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// `struct pcpu_chunk` field offsets for the imaged kernel build.
#[derive(Debug, Clone, Copy)]
struct ChunkLayout {
    list: u64,
    base_addr: u64,
    map: u64,
    map_used: u64,
}

impl ChunkLayout {
    fn bind(symbols: &SymbolTable) -> Result<Self> {
        Ok(Self {
            list: symbols.field_offset("pcpu_chunk", "list")?,
            base_addr: symbols.field_offset("pcpu_chunk", "base_addr")?,
            map: symbols.field_offset("pcpu_chunk", "map")?,
            map_used: symbols.field_offset("pcpu_chunk", "map_used")?,
        })
    }
}

/// Two-state scanner over a chunk's run-length map.
///
/// States: no run open, or an allocated run open since `open`. A negative
/// entry opens a run; a non-negative entry closes any open run, even when
/// its own length is zero. Closing on transition rather than merging by
/// proximity keeps runs around an empty free entry separate.
#[derive(Debug, Default)]
struct RunScanner {
    cursor: u64,
    open: Option<u64>,
    runs: Vec<(u64, u64)>,
}

impl RunScanner {
    fn step(&mut self, run: i64) {
        if run < 0 {
            if self.open.is_none() {
                self.open = Some(self.cursor);
            }
        } else if let Some(start) = self.open.take() {
            self.runs.push((start, self.cursor));
        }
        self.cursor += run.unsigned_abs();
    }

    /// Terminal transition: a map ending inside an allocated run still
    /// emits that run.
    fn finish(mut self) -> Vec<(u64, u64)> {
        if let Some(start) = self.open.take() {
            self.runs.push((start, self.cursor));
        }
        self.runs
    }
}

/// Walk every chunk in every slot and emit the live intervals.
///
/// Pure function of the chunk lists at call time; memoization is the
/// caller's concern.
pub(crate) fn build_intervals(
    image: &impl ReadImage,
    symbols: &SymbolTable,
    region: StaticRegion,
) -> Result<Vec<Interval>> {
    let layout = ChunkLayout::bind(symbols)?;
    let base_addr = image.read_u64(symbols.address_of("pcpu_base_addr")?)?;
    let nr_slots = image.read_i32(symbols.address_of("pcpu_nr_slots")?)?.max(0) as u64;

    let slots = symbols.value_of("pcpu_slot")?;
    let slot_stride = match &slots.ty {
        TypeInfo::Array { element, .. } => element.size(),
        other => {
            return Err(Error::ArgumentType(format!(
                "pcpu_slot has type {other}, expected an array of list heads"
            )));
        }
    };

    let mut intervals = Vec::new();
    for slot in 0..nr_slots {
        let head = slots.address + slot * slot_stride;
        for entry in list_entries(image, head, layout.list) {
            let chunk = entry?;
            let chunk_base = image
                .read_u64(chunk + layout.base_addr)?
                .wrapping_sub(base_addr)
                .wrapping_add(region.start);
            let map_used = image.read_i32(chunk + layout.map_used)?;
            if map_used <= 0 {
                continue;
            }
            let map = image.read_u64(chunk + layout.map)?;
            if map == 0 {
                warn!("chunk {chunk:#x} has {map_used} map entries but a null map, skipping");
                continue;
            }

            let mut scanner = RunScanner::default();
            for i in 0..map_used as u64 {
                scanner.step(image.read_i32(map + i * 4)? as i64);
            }
            intervals.extend(scanner.finish().into_iter().map(|(start, end)| Interval {
                start: chunk_base.wrapping_add(start),
                end: chunk_base.wrapping_add(end),
            }));
        }
    }

    debug!(
        "dynamic per-cpu map: {} intervals from {} slots",
        intervals.len(),
        nr_slots
    );
    Ok(intervals)
}
