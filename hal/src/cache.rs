//! # Cache Synchronization
//!
//! Freshly written code must be pushed out of the data cache and dropped from
//! the instruction cache before it is executed. For every line touched the
//! order is fixed:
//!
//! ```text
//!   flush D-line  ──▶  global sync  ──▶  invalidate I-line  ──▶  fetch sync
//!     (dcbst)            (sync)              (icbi)               (isync)
//! ```
//!
//! Ranges are widened to whole lines: the start is rounded down and the end
//! (`addr + len`) rounded up, so misaligned or sub-line writes are covered.

use crate::PhysAddr;

/// Xenon L1/L2 cache line size in bytes
pub const XENON_LINE_SIZE: u64 = 128;

// =============================================================================
// CACHE MAINTENANCE TRAIT
// =============================================================================

/// Per-line cache maintenance operations
pub trait CacheMaintenance {
    /// Cache line size (power of two)
    const LINE_SIZE: u64;

    /// Flush the data line, order globally, invalidate the instruction line,
    /// order instruction fetch, in that order
    fn sync_line(&mut self, line: PhysAddr);

    /// Flush the data line to memory only
    fn flush_line(&mut self, line: PhysAddr);
}

// =============================================================================
// LINE RANGES
// =============================================================================

/// Whole-line cover of a byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    /// First line (inclusive)
    pub start: PhysAddr,
    /// End of the last line (exclusive)
    pub end: PhysAddr,
    line_size: u64,
}

impl LineRange {
    /// Lines covering `[addr, addr + len)`
    #[inline(always)]
    pub const fn covering(addr: PhysAddr, len: u64, line_size: u64) -> Self {
        let start = addr.align_down(line_size);
        let end = if len == 0 {
            start
        } else {
            PhysAddr::new(addr.as_u64().wrapping_add(len)).align_up(line_size)
        };
        Self {
            start,
            end,
            line_size,
        }
    }

    /// Is the range empty
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.end.as_u64() == self.start.as_u64()
    }

    /// Iterate over line addresses
    #[inline(always)]
    pub fn lines(&self) -> Lines {
        Lines {
            next: self.start,
            end: self.end,
            step: self.line_size,
        }
    }
}

/// Iterator over cache line addresses
#[derive(Debug, Clone)]
pub struct Lines {
    next: PhysAddr,
    end: PhysAddr,
    step: u64,
}

impl Iterator for Lines {
    type Item = PhysAddr;

    #[inline(always)]
    fn next(&mut self) -> Option<PhysAddr> {
        if self.next.as_u64() >= self.end.as_u64() {
            return None;
        }
        let line = self.next;
        self.next = line + self.step;
        Some(line)
    }
}

// =============================================================================
// RANGE OPERATIONS
// =============================================================================

/// Make `[addr, addr + len)` coherent for instruction fetch
#[inline(always)]
pub fn sync_before_exec<C: CacheMaintenance + ?Sized>(cache: &mut C, addr: PhysAddr, len: u64) {
    for line in LineRange::covering(addr, len, C::LINE_SIZE).lines() {
        cache.sync_line(line);
    }
}

/// Write back `[addr, addr + len)` to memory (data cache only)
#[inline(always)]
pub fn flush_range<C: CacheMaintenance + ?Sized>(cache: &mut C, addr: PhysAddr, len: u64) {
    for line in LineRange::covering(addr, len, C::LINE_SIZE).lines() {
        cache.flush_line(line);
    }
}
