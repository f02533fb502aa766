//! Hex/ASCII dump of inspected bytes, for probe tracing.

use std::fmt::Write;

const HEXDUMP_COLS: usize = 16;

/// Render `data` as an offset / hex / ASCII table, 16 bytes per line
///
/// ```
/// let dump = portmux::common::hexdump(b"SSH-2.0");
/// assert!(dump.starts_with("0x000000: 53 53 48 2d"));
/// assert!(dump.trim_end().ends_with("SSH-2.0"));
/// ```
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() / HEXDUMP_COLS + 1) * 78);

    for (line, chunk) in data.chunks(HEXDUMP_COLS).enumerate() {
        let _ = write!(out, "0x{:06x}: ", line * HEXDUMP_COLS);

        for byte in chunk {
            let _ = write!(out, "{:02x} ", byte);
        }
        // Pad short final line so the ASCII gutter stays aligned
        for _ in chunk.len()..HEXDUMP_COLS {
            out.push_str("   ");
        }

        for &byte in chunk {
            if byte.is_ascii_graphic() || byte == b' ' {
                out.push(byte as char);
            } else {
                out.push('.');
            }
        }
        out.push('\n');
    }

    out
}
