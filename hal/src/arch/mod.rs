//! # Architecture Support
//!
//! Instruction-level primitives for the boards the loader runs on. Only the
//! Xenon (powerpc64) board is supported; other targets build the portable
//! parts of the HAL for host testing.

pub mod abi;

pub use abi::FunctionDescriptor;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "powerpc64", feature = "xenon"))] {
        pub mod xenon;
        pub use xenon::{XenonCache, XenonTimebase};
    }
}
