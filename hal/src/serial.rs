//! # Serial Output
//!
//! Transmit-only, busy-waiting UART output for the boot trace. Nothing here
//! buffers or locks: each byte waits for the transmitter and is written
//! straight to the data register.

use crate::spin::spin_until;

/// Xenon SMC UART base
pub const XENON_UART_BASE: usize = 0xEA00_1000;

/// Data register offset
pub const UART_DATA: usize = 0x14;

/// Status register offset
pub const UART_STATUS: usize = 0x18;

/// Transmitter ready bit in the status register
pub const UART_TX_READY: u32 = 0x0200_0000;

// =============================================================================
// CONSOLE TRAIT
// =============================================================================

/// Byte-oriented console sink
pub trait ConsoleWriter {
    /// Write a byte to the console
    fn write_byte(&mut self, byte: u8);

    /// Write raw bytes, stopping at the first NUL
    #[inline(always)]
    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == 0 {
                break;
            }
            self.write_byte(byte);
        }
    }

    /// Write a string to the console
    #[inline(always)]
    fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Carriage return + line feed
    #[inline(always)]
    fn write_crlf(&mut self) {
        self.write_byte(b'\r');
        self.write_byte(b'\n');
    }
}

impl<T: ConsoleWriter + ?Sized> ConsoleWriter for &mut T {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) {
        (**self).write_byte(byte);
    }
}

// =============================================================================
// MMIO UART
// =============================================================================

/// Memory-mapped transmit-only UART
#[derive(Debug, Clone, Copy)]
pub struct Uart {
    base: usize,
}

impl Uart {
    /// Create a UART handle at `base`
    ///
    /// # Safety
    /// `base` must map the UART register block (or, in tests, memory laid out
    /// like it) for as long as the handle is used.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// The Xenon SMC UART
    pub const fn xenon() -> Self {
        Self {
            base: XENON_UART_BASE,
        }
    }

    #[inline(always)]
    fn status(&self) -> u32 {
        // SAFETY: `base` maps the register block per `new`.
        unsafe { core::ptr::read_volatile((self.base + UART_STATUS) as *const u32) }
    }

    /// Is the transmitter ready for the next byte
    #[inline(always)]
    pub fn tx_ready(&self) -> bool {
        self.status() & UART_TX_READY != 0
    }

    /// Wait for the transmitter, then send one byte
    #[inline(always)]
    pub fn putc(&self, byte: u8) {
        spin_until(|| self.tx_ready());
        // SAFETY: `base` maps the register block per `new`.
        unsafe {
            core::ptr::write_volatile(
                (self.base + UART_DATA) as *mut u32,
                (u32::from(byte) << 24) & 0xFF00_0000,
            );
        }
    }
}

impl ConsoleWriter for Uart {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) {
        self.putc(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Register block image: words 5 (data) and 6 (status)
    #[repr(C, align(8))]
    struct FakeRegs([u32; 8]);

    #[test]
    fn test_putc_writes_high_byte() {
        let mut regs = FakeRegs([0; 8]);
        regs.0[UART_STATUS / 4] = UART_TX_READY;
        let base = regs.0.as_mut_ptr();
        let uart = unsafe { Uart::new(base as usize) };

        uart.putc(b'E');
        let data = unsafe { base.add(UART_DATA / 4).read_volatile() };
        assert_eq!(data, 0x4500_0000);
    }

    #[test]
    fn test_tx_ready_reflects_status() {
        let mut regs = FakeRegs([0; 8]);
        let base = regs.0.as_mut_ptr();
        let uart = unsafe { Uart::new(base as usize) };
        assert!(!uart.tx_ready());
        unsafe { base.add(UART_STATUS / 4).write_volatile(UART_TX_READY | 0x1) };
        assert!(uart.tx_ready());
    }

    #[derive(Default)]
    struct Capture(Vec<u8>);

    impl ConsoleWriter for Capture {
        fn write_byte(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }

    #[test]
    fn test_write_bytes_stops_at_nul() {
        let mut out = Capture::default();
        out.write_bytes(b".text\0.data");
        out.write_crlf();
        assert_eq!(out.0, b".text\r\n");
    }
}
