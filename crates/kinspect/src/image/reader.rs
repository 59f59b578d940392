use crate::error::{Error, Result};

/// Read access to a frozen memory image.
///
/// All multi-byte reads are little-endian, matching the x86_64 and arm64
/// images this tool targets. Implementations never expose a write path.
pub trait ReadImage {
    /// Read `len` bytes starting at virtual address `addr`.
    fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>>;

    fn read_u8(&self, addr: u64) -> Result<u8> {
        let [byte] = read_array(self, addr)?;
        Ok(byte)
    }

    fn read_u16(&self, addr: u64) -> Result<u16> {
        Ok(u16::from_le_bytes(read_array(self, addr)?))
    }

    fn read_u32(&self, addr: u64) -> Result<u32> {
        Ok(u32::from_le_bytes(read_array(self, addr)?))
    }

    fn read_u64(&self, addr: u64) -> Result<u64> {
        Ok(u64::from_le_bytes(read_array(self, addr)?))
    }

    fn read_i32(&self, addr: u64) -> Result<i32> {
        Ok(i32::from_le_bytes(read_array(self, addr)?))
    }

    fn read_i64(&self, addr: u64) -> Result<i64> {
        Ok(i64::from_le_bytes(read_array(self, addr)?))
    }

    /// Decode a fixed-size C string buffer, stopping at the first NUL.
    fn read_cstr(&self, addr: u64, max_len: usize) -> Result<String> {
        let bytes = self.read_bytes(addr, max_len)?;
        let end = memchr::memchr(0, &bytes).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

fn read_array<const N: usize>(image: &(impl ReadImage + ?Sized), addr: u64) -> Result<[u8; N]> {
    let bytes = image.read_bytes(addr, N)?;
    bytes.try_into().map_err(|_| Error::ImageRead {
        address: addr,
        message: format!("short read, wanted {N} bytes"),
    })
}
