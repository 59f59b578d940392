//! File-backed kernel memory image.
//!
//! A captured image arrives as two files: the raw dump bytes and a JSON
//! segment map describing which virtual address ranges the dump covers and
//! where each range sits inside the file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::image::reader::ReadImage;

/// One mapped range in the segment map file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDesc {
    /// Virtual address of the first mapped byte.
    pub addr: u64,
    /// Byte offset of the range inside the raw dump file.
    pub offset: u64,
    /// Length of the range in bytes.
    pub size: u64,
}

/// Segment map file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentMap {
    pub segments: Vec<SegmentDesc>,
}

struct Segment {
    addr: u64,
    data: Vec<u8>,
}

/// A fully loaded kernel memory image.
///
/// Reads must fall inside a single mapped segment; the map producer is
/// expected to merge contiguous ranges.
pub struct CoreImage {
    segments: Vec<Segment>,
}

impl CoreImage {
    /// Load a raw dump and its segment map.
    pub fn load(image: &Path, map: &Path) -> Result<Self> {
        let map: SegmentMap = serde_json::from_str(&fs::read_to_string(map)?)?;
        let raw = fs::read(image)?;

        let mut segments = Vec::with_capacity(map.segments.len());
        for desc in &map.segments {
            let start = desc.offset as usize;
            let end = start
                .checked_add(desc.size as usize)
                .filter(|end| *end <= raw.len())
                .ok_or_else(|| Error::ImageRead {
                    address: desc.addr,
                    message: format!(
                        "segment at file offset {:#x} extends past the end of the dump",
                        desc.offset
                    ),
                })?;
            segments.push(Segment {
                addr: desc.addr,
                data: raw[start..end].to_vec(),
            });
        }

        let image = Self::from_parts(segments);
        debug!(
            "loaded image: {} segments, {} bytes mapped",
            image.segments.len(),
            image.mapped_bytes()
        );
        Ok(image)
    }

    /// Build an image from in-memory segments.
    pub fn from_segments(segments: Vec<(u64, Vec<u8>)>) -> Self {
        Self::from_parts(
            segments
                .into_iter()
                .map(|(addr, data)| Segment { addr, data })
                .collect(),
        )
    }

    fn from_parts(mut segments: Vec<Segment>) -> Self {
        segments.sort_by_key(|s| s.addr);
        for pair in segments.windows(2) {
            if pair[0].addr + pair[0].data.len() as u64 > pair[1].addr {
                warn!(
                    "segments at {:#x} and {:#x} overlap; the higher one wins",
                    pair[0].addr, pair[1].addr
                );
            }
        }
        Self { segments }
    }

    /// Mapped ranges as `(addr, len)` pairs, sorted by address.
    pub fn segments(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.segments.iter().map(|s| (s.addr, s.data.len() as u64))
    }

    pub fn mapped_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.data.len() as u64).sum()
    }

    fn segment_for(&self, addr: u64) -> Option<&Segment> {
        let idx = self.segments.partition_point(|s| s.addr <= addr);
        let seg = &self.segments[idx.checked_sub(1)?];
        (addr - seg.addr < seg.data.len() as u64).then_some(seg)
    }
}

impl ReadImage for CoreImage {
    fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let seg = self.segment_for(addr).ok_or_else(|| Error::ImageRead {
            address: addr,
            message: "address is not mapped".into(),
        })?;
        let start = (addr - seg.addr) as usize;
        let end = start.checked_add(len).filter(|end| *end <= seg.data.len());
        match end {
            Some(end) => Ok(seg.data[start..end].to_vec()),
            None => Err(Error::ImageRead {
                address: addr,
                message: format!("read of {len} bytes crosses the end of the segment"),
            }),
        }
    }
}
