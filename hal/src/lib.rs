//! # Helix HAL - Loader Primitives
//!
//! The smallest set of hardware primitives the ELF loader relies on. Everything
//! in this crate must stay usable after the rest of the system has been shut
//! down and while executing from a relocated copy of the loader's transfer
//! code:
//!
//! - no allocation;
//! - no calls outside this crate's primitive set;
//! - no failure paths (hardware waits are assumed to finish).
//!
//! ## Modules
//!
//! | Module   | Purpose                                               |
//! |----------|-------------------------------------------------------|
//! | `mem`    | Volatile byte copy / fill                             |
//! | `cache`  | Line rounding and D-cache/I-cache synchronization     |
//! | `serial` | Busy-waiting transmit-only UART and console trait     |
//! | `hex`    | Fixed-width hexadecimal rendering                     |
//! | `spin`   | Spin-wait on a hardware predicate                     |
//! | `timer`  | Fixed-duration busy delays                            |
//! | `arch`   | Xenon instructions, ELFv1 function descriptors        |

#![cfg_attr(not(test), no_std)]
#![cfg_attr(all(target_arch = "powerpc64", feature = "xenon"), feature(asm_experimental_arch))]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod arch;
pub mod cache;
pub mod hex;
pub mod mem;
pub mod serial;
pub mod spin;
pub mod timer;

use core::fmt;
use core::ops::{Add, Sub};

// =============================================================================
// PHYSICAL ADDRESSES
// =============================================================================

/// A physical address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    /// Null address
    pub const NULL: Self = Self(0);

    /// Create a new physical address
    #[inline(always)]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw value
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Round down to a power-of-two boundary
    #[inline(always)]
    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0 & !(align - 1))
    }

    /// Round up to a power-of-two boundary
    #[inline(always)]
    pub const fn align_up(self, align: u64) -> Self {
        Self(self.0.wrapping_add(align - 1) & !(align - 1))
    }

    /// Check alignment against a power-of-two boundary
    #[inline(always)]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }

    /// Set address bits (used to force the cached/physical selector bit)
    #[inline(always)]
    pub const fn with_bits(self, bits: u64) -> Self {
        Self(self.0 | bits)
    }

    /// Pointer view of the address for identity-mapped access
    #[inline(always)]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }
}

impl Add<u64> for PhysAddr {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: u64) -> Self {
        Self(self.0.wrapping_add(rhs))
    }
}

impl Sub<PhysAddr> for PhysAddr {
    type Output = u64;

    #[inline(always)]
    fn sub(self, rhs: PhysAddr) -> u64 {
        self.0.wrapping_sub(rhs.0)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

static_assertions::assert_eq_size!(PhysAddr, u64);

// =============================================================================
// PHYSICAL MEMORY ACCESS
// =============================================================================

/// Access to physical memory
///
/// The loader never dereferences a physical address directly: it asks the
/// board for the pointer that reaches it. On the real machine this is the
/// identity mapping; host tests back it with ordinary buffers.
pub trait PhysMemory {
    /// Pointer through which `addr` is reached
    fn phys_ptr(&mut self, addr: PhysAddr) -> *mut u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        let addr = PhysAddr::new(0x8000_1234);
        assert_eq!(addr.align_down(0x80), PhysAddr::new(0x8000_1200));
        assert_eq!(addr.align_up(0x80), PhysAddr::new(0x8000_1280));
        assert!(PhysAddr::new(0x8000_1280).is_aligned(0x80));
        assert!(!addr.is_aligned(0x80));
    }

    #[test]
    fn test_selector_bits() {
        let addr = PhysAddr::new(0x1000).with_bits(0x8000_0000);
        assert_eq!(addr.as_u64(), 0x8000_1000);
        assert_eq!(addr.with_bits(0x8000_0000), addr);
    }

    #[test]
    fn test_arithmetic() {
        let base = PhysAddr::new(0x87FF_0000);
        assert_eq!(base + 0x40, PhysAddr::new(0x87FF_0040));
        assert_eq!(PhysAddr::new(0x87FF_0040) - base, 0x40);
    }
}
