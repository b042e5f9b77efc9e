//! # Xenon (powerpc64) Primitives
//!
//! Cache line maintenance and timebase access for the Xenon CPU. All of it is
//! `#[inline(always)]` so that it is emitted into whichever routine uses it,
//! including the relocated transfer code.

use core::arch::asm;

use crate::cache::{CacheMaintenance, XENON_LINE_SIZE};
use crate::timer::{Timebase, XENON_TIMEBASE_HZ};
use crate::PhysAddr;

/// Xenon cache maintenance over identity-mapped addresses
#[derive(Debug, Clone, Copy, Default)]
pub struct XenonCache;

impl CacheMaintenance for XenonCache {
    const LINE_SIZE: u64 = XENON_LINE_SIZE;

    #[inline(always)]
    fn sync_line(&mut self, line: PhysAddr) {
        let addr = line.as_u64();
        // SAFETY: cache maintenance on a mapped line has no memory effects
        // beyond write-back and invalidation.
        unsafe {
            asm!("dcbst 0, {0}", in(reg_nonzero) addr, options(nostack));
            asm!("sync", options(nostack));
            asm!("icbi 0, {0}", in(reg_nonzero) addr, options(nostack));
            asm!("isync", options(nostack));
        }
    }

    #[inline(always)]
    fn flush_line(&mut self, line: PhysAddr) {
        let addr = line.as_u64();
        // SAFETY: see `sync_line`.
        unsafe {
            asm!("dcbst 0, {0}", in(reg_nonzero) addr, options(nostack));
            asm!("sync", options(nostack));
        }
    }
}

/// The PowerPC timebase register
#[derive(Debug, Clone, Copy, Default)]
pub struct XenonTimebase;

impl Timebase for XenonTimebase {
    const FREQUENCY_HZ: u64 = XENON_TIMEBASE_HZ;

    #[inline(always)]
    fn ticks(&self) -> u64 {
        let tb: u64;
        // SAFETY: reading the timebase has no side effects.
        unsafe { asm!("mftb {0}", out(reg) tb, options(nomem, nostack)) };
        tb
    }
}
