//! # Helix Relocation Subsystem
//!
//! Loads a trusted 32-bit ELF image over the running system and transfers
//! control to it. The code that does the final copy cannot stay where it was
//! linked (the image may land on top of it), so a small transfer trampoline
//! is relocated to a fixed staging region first and runs from there.
//!
//! ```text
//!   primary core                          relocated trampoline
//!   ────────────                          ────────────────────
//!   quiesce peripherals
//!   copy trampoline ──▶ code staging ──▶  prepare_run(staged image)
//!   copy ELF bytes  ──▶ data staging        map sections + trace
//!   park secondaries ─▶ hold_thread         publish entry + 0x60 ──▶ secondaries
//!   delay                                   run(entry, devtree)  ──▶ image
//! ```
//!
//! ## Modules
//!
//! | Module     | Purpose                                             |
//! |------------|-----------------------------------------------------|
//! | `config`   | Fixed staging layout (`Layout::XENON`)              |
//! | `elf`      | Unchecked ELF32 image view and section selection    |
//! | `context`  | Relocated trampoline addresses                      |
//! | `board`    | Collaborator traits implemented per board           |
//! | `handoff`  | Hold cell and control-transfer primitives           |
//! | `smp`      | Secondary-core dispatch and parking                 |
//! | `mapper`   | Section mapping and boot trace (runs relocated)     |
//! | `engine`   | Relocation sequence on the primary core             |
//! | `testing`  | Simulated board and ELF builder (feature `testing`) |

#![cfg_attr(not(any(test, feature = "testing")), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod board;
pub mod config;
pub mod context;
pub mod elf;
pub mod engine;
pub mod handoff;
pub mod mapper;
pub mod smp;
pub mod trace;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use core::fmt;

pub use board::{Board, Peripherals};
pub use config::Layout;
pub use context::{Trampoline, TrampolineSymbols};
pub use elf::{ElfImage, Section, SectionFlags, SectionKind};
pub use engine::Relocator;
pub use handoff::{HoldCell, StagedImage, Transfer};
pub use helix_hal::PhysAddr;
pub use smp::SecondaryCores;

// =============================================================================
// ERRORS
// =============================================================================

/// Result type for relocation operations
pub type RelocResult<T> = Result<T, RelocError>;

/// Relocation error types
///
/// Only the loader's own link layout is checked, and only before anything
/// destructive happens. The image itself is never validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocError {
    /// Transfer section bounds are inverted
    EmptyTrampoline,
    /// Transfer section does not fit in the code staging region
    TrampolineTooLarge {
        /// Size of the transfer section in bytes
        size: u64,
        /// Code staging capacity in bytes
        capacity: u64,
    },
    /// A routine or the hold cell was linked outside the transfer section
    SymbolOutsideTrampoline(&'static str),
    /// Hold cell is not word aligned
    MisalignedHoldCell(u64),
}

impl fmt::Display for RelocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTrampoline => write!(f, "Transfer section is empty"),
            Self::TrampolineTooLarge { size, capacity } => {
                write!(f, "Transfer section of {} bytes exceeds staging capacity {}", size, capacity)
            },
            Self::SymbolOutsideTrampoline(name) => {
                write!(f, "Symbol outside transfer section: {}", name)
            },
            Self::MisalignedHoldCell(addr) => write!(f, "Hold cell at {:#x} is not word aligned", addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelocError::TrampolineTooLarge {
            size: 0x2_0000,
            capacity: 0x1_0000,
        };
        assert_eq!(
            err.to_string(),
            "Transfer section of 131072 bytes exceeds staging capacity 65536"
        );
        assert_eq!(
            RelocError::SymbolOutsideTrampoline("run").to_string(),
            "Symbol outside transfer section: run"
        );
    }
}
