//! # Helix ELF Loader
//!
//! Loads a 32-bit ELF image over the running system and hands every hardware
//! thread over to it. The image comes from memory or from a file, optionally
//! together with a device tree.
//!
//! ```text
//!   run_from_disk ──▶ read file ──┐
//!   run_with_device_tree ─▶ stage devtree ─┤
//!                                          ▼
//!                                  run_from_memory ──▶ helix-relocation
//! ```
//!
//! The only ways back to the caller are the errors in [`LoadError`], all
//! raised before anything outside the loader's own buffers is touched.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(all(target_arch = "powerpc64", feature = "xenon"), feature(asm_experimental_arch))]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod devtree;
pub mod error;
pub mod loader;
pub mod logger;
pub mod storage;

#[cfg(all(target_arch = "powerpc64", feature = "xenon"))]
pub mod xenon;

pub use error::{LoadError, LoadResult};
pub use loader::ElfLoader;
pub use logger::BootLogger;
pub use storage::Storage;
