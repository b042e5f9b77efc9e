//! # Control Handoff
//!
//! The hold cell and the transfers that leave the loader for good.

use helix_hal::cache::{sync_before_exec, CacheMaintenance};
use helix_hal::mem::{load_word, store_word};
use helix_hal::spin::spin_until;
use helix_hal::{PhysAddr, PhysMemory};

// =============================================================================
// HOLD CELL
// =============================================================================

/// One-shot broadcast of the secondary-core release address
///
/// A single word inside the relocated trampoline. Parked cores poll it until
/// it becomes non-zero, then jump to the value. There is exactly one writer
/// (the primary core, from the relocated mapper) and it writes exactly once,
/// after every section is mapped, followed by a cache sync of the line so the
/// store is visible to the pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldCell {
    addr: PhysAddr,
}

impl HoldCell {
    /// Value meaning "keep waiting"
    pub const EMPTY: u64 = 0;

    /// Cell at `addr` (word aligned)
    #[inline(always)]
    pub const fn at(addr: PhysAddr) -> Self {
        Self { addr }
    }

    /// Address of the cell
    pub const fn addr(&self) -> PhysAddr {
        self.addr
    }

    #[inline(always)]
    fn ptr<M: PhysMemory + ?Sized>(&self, mem: &mut M) -> *mut u64 {
        mem.phys_ptr(self.addr) as *mut u64
    }

    /// Clear the cell before any core is parked on it
    pub fn arm<B: PhysMemory + CacheMaintenance + ?Sized>(&self, board: &mut B) {
        self.store(board, Self::EMPTY);
    }

    /// Release every parked core to `target`
    #[inline(always)]
    pub fn publish<B: PhysMemory + CacheMaintenance + ?Sized>(&self, board: &mut B, target: u64) {
        self.store(board, target);
    }

    #[inline(always)]
    fn store<B: PhysMemory + CacheMaintenance + ?Sized>(&self, board: &mut B, value: u64) {
        let cell = self.ptr(board);
        // SAFETY: the cell is a word-aligned location inside the relocated
        // trampoline, checked when the trampoline was bound.
        unsafe { store_word(cell, value) };
        sync_before_exec(board, self.addr, 8);
    }

    /// Current value
    pub fn read<M: PhysMemory + ?Sized>(&self, mem: &mut M) -> u64 {
        let cell = self.ptr(mem);
        // SAFETY: see `store`.
        unsafe { load_word(cell) }
    }

    /// Spin until the cell is published, then return its value
    pub fn wait<M: PhysMemory + ?Sized>(&self, mem: &mut M) -> u64 {
        let cell = self.ptr(mem);
        let mut value = Self::EMPTY;
        spin_until(|| {
            // SAFETY: see `store`.
            value = unsafe { load_word(cell) };
            value != Self::EMPTY
        });
        value
    }
}

// =============================================================================
// TRANSFERS
// =============================================================================

/// Image staged for the relocated mapper
///
/// Everything the mapper needs is carried by value: once it runs, nothing
/// outside the relocated trampoline may be referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct StagedImage {
    /// Staged ELF bytes
    pub image: PhysAddr,
    /// Relocated hold cell
    pub hold_cell: PhysAddr,
    /// Relocated final jump routine
    pub run: PhysAddr,
}

/// Control transfers that never return
pub trait Transfer {
    /// Call the relocated section mapper with the staged image
    ///
    /// # Safety
    /// `routine` must be the relocated `prepare_run`, already copied and
    /// synced, and `staged` must describe a staged trusted image.
    unsafe fn enter_relocated(&mut self, routine: PhysAddr, staged: StagedImage) -> !;

    /// Call the relocated run routine, which enters the image at `entry`
    /// with `devtree` as its first argument
    ///
    /// # Safety
    /// The image must be fully mapped and synced.
    unsafe fn run(&mut self, routine: PhysAddr, entry: u64, devtree: u64) -> !;

    /// Jump a parked secondary core to `target` with its core index as the
    /// first argument
    ///
    /// # Safety
    /// `target` must be a published release address.
    unsafe fn release_secondary(&mut self, target: u64, core: usize) -> !;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, SimBoard};

    #[test]
    fn test_publish_stores_then_syncs() {
        let mut board = SimBoard::new();
        let cell = HoldCell::at(PhysAddr::new(0x87FF_0000));
        assert_eq!(cell.read(&mut board), HoldCell::EMPTY);

        cell.publish(&mut board, 0x1060);
        assert_eq!(cell.read(&mut board), 0x1060);
        assert_eq!(board.events().last(), Some(&Event::Sync(PhysAddr::new(0x87FF_0000))));
    }

    #[test]
    fn test_arm_clears() {
        let mut board = SimBoard::new();
        let cell = HoldCell::at(PhysAddr::new(0x87FF_0008));
        cell.publish(&mut board, 0xDEAD);
        cell.arm(&mut board);
        assert_eq!(cell.read(&mut board), HoldCell::EMPTY);
    }

    #[test]
    fn test_wait_returns_published_value() {
        let mut board = SimBoard::new();
        let cell = HoldCell::at(PhysAddr::new(0x87FF_0000));
        cell.publish(&mut board, 0x8000_1060);
        assert_eq!(cell.wait(&mut board), 0x8000_1060);
    }
}
