//! # Boot Trace
//!
//! Serial lines emitted while the image is mapped:
//!
//! ```text
//!   00001000 00000010 .text
//!   00003000 00000040 .bss
//!
//!   EP 00001000
//! ```
//!
//! Written byte by byte through [`ConsoleWriter`]; no formatting machinery,
//! so it can run from the relocated trampoline.

use helix_hal::hex::hex32;
use helix_hal::serial::ConsoleWriter;

/// `AAAAAAAA SSSSSSSS name\r\n`
#[inline(always)]
pub fn section<W: ConsoleWriter + ?Sized>(out: &mut W, addr: u32, size: u32, name: &[u8]) {
    out.write_bytes(&hex32(addr as u64));
    out.write_byte(b' ');
    out.write_bytes(&hex32(size as u64));
    out.write_byte(b' ');
    out.write_bytes(name);
    out.write_crlf();
}

/// `\r\nEP EEEEEEEE\r\n`
#[inline(always)]
pub fn entry<W: ConsoleWriter + ?Sized>(out: &mut W, entry: u32) {
    out.write_crlf();
    out.write_bytes(b"EP ");
    out.write_bytes(&hex32(entry as u64));
    out.write_crlf();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture(Vec<u8>);

    impl ConsoleWriter for Capture {
        fn write_byte(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }

    #[test]
    fn test_section_line() {
        let mut out = Capture::default();
        section(&mut out, 0x1000, 0x10, b".text");
        assert_eq!(out.0, b"00001000 00000010 .text\r\n");
    }

    #[test]
    fn test_section_line_without_name() {
        let mut out = Capture::default();
        section(&mut out, 0x8000_2000, 0x1234, b"");
        assert_eq!(out.0, b"80002000 00001234 \r\n");
    }

    #[test]
    fn test_entry_line() {
        let mut out = Capture::default();
        entry(&mut out, 0x1000);
        assert_eq!(out.0, b"\r\nEP 00001000\r\n");
    }
}
