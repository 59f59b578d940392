//! In-memory image builder for tests.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::image::reader::ReadImage;

/// Builds a sparse fake image by writing typed values at addresses.
#[derive(Debug, Default)]
pub struct MockImageBuilder {
    bytes: BTreeMap<u64, u8>,
}

impl MockImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(mut self, addr: u64, bytes: &[u8]) -> Self {
        for (i, byte) in bytes.iter().enumerate() {
            self.bytes.insert(addr + i as u64, *byte);
        }
        self
    }

    pub fn write_u64(self, addr: u64, value: u64) -> Self {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn write_u32(self, addr: u64, value: u32) -> Self {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn write_i32(self, addr: u64, value: i32) -> Self {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn write_i64(self, addr: u64, value: i64) -> Self {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Write a NUL-terminated string into a fixed-size buffer.
    pub fn write_cstr(self, addr: u64, s: &str, buf_len: usize) -> Self {
        let mut buf = vec![0u8; buf_len];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        self.write_bytes(addr, &buf)
    }

    pub fn build(self) -> MockImage {
        MockImage { bytes: self.bytes }
    }

    /// Layer these writes over an existing image.
    pub fn build_over(self, base: MockImage) -> MockImage {
        let mut bytes = base.bytes;
        bytes.extend(self.bytes);
        MockImage { bytes }
    }
}

/// Sparse in-memory image; reads of unwritten bytes fail like unmapped
/// addresses in a real dump.
#[derive(Debug)]
pub struct MockImage {
    bytes: BTreeMap<u64, u8>,
}

impl ReadImage for MockImage {
    fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        for i in 0..len as u64 {
            match self.bytes.get(&(addr + i)) {
                Some(byte) => out.push(*byte),
                None => {
                    return Err(Error::ImageRead {
                        address: addr + i,
                        message: "address is not mapped".into(),
                    });
                }
            }
        }
        Ok(out)
    }
}
