//! Raw image bytes in hexdump form.

use anyhow::Result;
use kinspect::{CoreImage, ReadImage, Session};

pub fn run(session: &Session<CoreImage>, address: u64, size: usize, ascii: bool) -> Result<()> {
    let bytes = session.image().read_bytes(address, size)?;
    for (i, row) in bytes.chunks(16).enumerate() {
        println!("{}", format_row(address + i as u64 * 16, row, ascii));
    }
    Ok(())
}

fn format_row(addr: u64, row: &[u8], ascii: bool) -> String {
    let mut line = format!("{addr:#018x}: ");
    for i in 0..16 {
        if i == 8 {
            line.push(' ');
        }
        match row.get(i) {
            Some(byte) => line.push_str(&format!("{byte:02x} ")),
            None => line.push_str("   "),
        }
    }
    if ascii {
        line.push('|');
        for byte in row {
            line.push(if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            });
        }
        for _ in row.len()..16 {
            line.push(' ');
        }
        line.push('|');
    } else {
        // Drop the trailing pad after the last byte group.
        while line.ends_with(' ') {
            line.pop();
        }
    }
    line
}
