//! # Relocated Trampoline
//!
//! The transfer trampoline is linked at one address and executed at another.
//! Every address inside it is resolved the same way:
//!
//! ```text
//!   relocated(symbol) = staging_base + (symbol - link_start)
//! ```

use helix_hal::PhysAddr;

use crate::{RelocError, RelocResult};

/// Link-time addresses of the transfer section and its contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrampolineSymbols {
    /// Start of the transfer section
    pub start: u64,
    /// End of the transfer section (exclusive)
    pub end: u64,
    /// Section mapper entry, takes the staged image
    pub prepare_run: u64,
    /// Final jump into the loaded image
    pub run: u64,
    /// Secondary-core parking routine
    pub hold_thread: u64,
    /// Word polled by parked secondary cores
    pub hold_cell: u64,
}

/// Transfer trampoline bound to its staging base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trampoline {
    symbols: TrampolineSymbols,
    base: PhysAddr,
}

impl Trampoline {
    /// Bind `symbols` to `base`
    ///
    /// Fails when the section does not fit in `capacity` bytes or when a
    /// routine or the hold cell lies outside it.
    pub fn new(symbols: TrampolineSymbols, base: PhysAddr, capacity: u64) -> RelocResult<Self> {
        if symbols.end <= symbols.start {
            return Err(RelocError::EmptyTrampoline);
        }
        let size = symbols.end - symbols.start;
        if size > capacity {
            return Err(RelocError::TrampolineTooLarge { size, capacity });
        }

        let inside = |addr: u64| addr >= symbols.start && addr < symbols.end;
        for (name, addr) in [
            ("prepare_run", symbols.prepare_run),
            ("run", symbols.run),
            ("hold_thread", symbols.hold_thread),
        ] {
            if !inside(addr) {
                return Err(RelocError::SymbolOutsideTrampoline(name));
            }
        }
        if !inside(symbols.hold_cell) || symbols.end - symbols.hold_cell < 8 {
            return Err(RelocError::SymbolOutsideTrampoline("hold_cell"));
        }

        let trampoline = Self { symbols, base };
        if !trampoline.hold_cell().is_aligned(8) {
            return Err(RelocError::MisalignedHoldCell(symbols.hold_cell));
        }
        Ok(trampoline)
    }

    /// Link-time symbols
    pub fn symbols(&self) -> &TrampolineSymbols {
        &self.symbols
    }

    /// Staging base
    pub fn base(&self) -> PhysAddr {
        self.base
    }

    /// Size of the transfer section in bytes
    pub fn size(&self) -> u64 {
        self.symbols.end - self.symbols.start
    }

    /// Link-time start of the section, as a readable pointer
    pub fn link_start(&self) -> *const u8 {
        self.symbols.start as usize as *const u8
    }

    /// Relocated address of a link-time symbol
    #[inline(always)]
    pub fn resolve(&self, symbol: u64) -> PhysAddr {
        self.base + symbol.wrapping_sub(self.symbols.start)
    }

    /// Relocated section mapper
    pub fn prepare_run(&self) -> PhysAddr {
        self.resolve(self.symbols.prepare_run)
    }

    /// Relocated final jump
    pub fn run(&self) -> PhysAddr {
        self.resolve(self.symbols.run)
    }

    /// Relocated parking routine
    pub fn hold_thread(&self) -> PhysAddr {
        self.resolve(self.symbols.hold_thread)
    }

    /// Relocated hold cell
    pub fn hold_cell(&self) -> PhysAddr {
        self.resolve(self.symbols.hold_cell)
    }
}
