//! # Staging Layout
//!
//! Fixed physical regions used during the handoff. Loaded sections must never
//! overlap any of them; nothing checks this at run time.
//!
//! ```text
//!   0x87FE_0000  ┌──────────────────────┐
//!                │ device tree (64 KiB) │
//!   0x87FF_0000  ├──────────────────────┤
//!                │ code staging         │  relocated trampoline + hold cell
//!   0x8800_0000  ├──────────────────────┤
//!                │ data staging         │  raw ELF bytes
//!                └──────────────────────┘
//! ```

use helix_hal::PhysAddr;
use static_assertions::const_assert;

/// Physical layout of the handoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Where the transfer trampoline is relocated to
    pub code_staging: PhysAddr,
    /// Capacity of the code staging region
    pub code_staging_size: u64,
    /// Where the raw ELF bytes are copied to
    pub data_staging: PhysAddr,
    /// Where the device-tree blob is stored
    pub devtree_staging: PhysAddr,
    /// Largest accepted device-tree blob (also the flushed region size)
    pub devtree_max_size: usize,
    /// Bit OR'ed into every section address
    pub high_mem_bit: u64,
    /// Mask applied to the device-tree address handed to the image
    pub devtree_phys_mask: u64,
    /// Offset from the entry point where secondary cores are released
    pub secondary_entry_offset: u64,
    /// Total hardware threads (core 0 is the primary)
    pub core_count: usize,
    /// Settle time after dispatching secondaries
    pub park_delay_ms: u32,
}

impl Layout {
    /// Xenon (six hardware threads, 512 MiB)
    pub const XENON: Self = Self {
        code_staging: PhysAddr::new(0x87FF_0000),
        code_staging_size: 0x1_0000,
        data_staging: PhysAddr::new(0x8800_0000),
        devtree_staging: PhysAddr::new(0x87FE_0000),
        devtree_max_size: 0x1_0000,
        high_mem_bit: 0x8000_0000,
        devtree_phys_mask: 0x7FFF_FFFF,
        secondary_entry_offset: 0x60,
        core_count: 6,
        park_delay_ms: 200,
    };

    /// Target address of a section linked at `addr`
    #[inline(always)]
    pub const fn section_target(&self, addr: u64) -> PhysAddr {
        PhysAddr::new(addr).with_bits(self.high_mem_bit)
    }

    /// Device-tree address as seen by the loaded image
    #[inline(always)]
    pub const fn devtree_arg(&self) -> u64 {
        self.devtree_staging.as_u64() & self.devtree_phys_mask
    }

    /// Address published to parked secondary cores
    #[inline(always)]
    pub const fn secondary_release(&self, entry: u64) -> u64 {
        entry.wrapping_add(self.secondary_entry_offset)
    }

    /// Indices of the secondary cores
    #[inline(always)]
    pub const fn secondary_cores(&self) -> core::ops::Range<usize> {
        1..self.core_count
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::XENON
    }
}

const_assert!(
    Layout::XENON.devtree_staging.as_u64() + Layout::XENON.devtree_max_size as u64
        <= Layout::XENON.code_staging.as_u64()
);
const_assert!(
    Layout::XENON.code_staging.as_u64() + Layout::XENON.code_staging_size
        <= Layout::XENON.data_staging.as_u64()
);
const_assert!(Layout::XENON.code_staging.as_u64() % 8 == 0);
