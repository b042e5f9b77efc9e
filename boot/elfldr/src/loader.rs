//! # ELF Loader
//!
//! Entry points for loading an image from memory, from a file, or from
//! memory together with a device tree. Each either returns an error before
//! anything destructive happens or never returns.

use core::convert::Infallible;

use helix_relocation::{Board, Layout, Relocator};

use crate::devtree::stage_device_tree;
use crate::error::LoadResult;
use crate::storage::{read_file, Storage};

/// Loader bound to a board
pub struct ElfLoader<'b, B: Board + ?Sized> {
    relocator: Relocator<'b, B>,
}

impl<'b, B: Board + ?Sized> ElfLoader<'b, B> {
    /// Loader for `board` with `layout`
    pub fn new(board: &'b mut B, layout: Layout) -> Self {
        Self {
            relocator: Relocator::new(board, layout),
        }
    }

    /// Loader for a Xenon board
    pub fn xenon(board: &'b mut B) -> Self {
        Self::new(board, Layout::XENON)
    }

    /// Load `image` and enter it
    ///
    /// # Safety
    /// `image` must be a trusted ELF32 image whose sections avoid the staging
    /// regions. All other memory may be overwritten.
    pub unsafe fn run_from_memory(self, image: &[u8]) -> LoadResult<Infallible> {
        // SAFETY: forwarded to the caller.
        match unsafe { self.relocator.run_from_memory(image) }? {}
    }

    /// Read the image at `path` and enter it
    ///
    /// Storage failures come back as [`LoadError::Storage`](crate::LoadError::Storage)
    /// with the collaborator's code; nothing has been touched at that point.
    ///
    /// # Safety
    /// See [`run_from_memory`](Self::run_from_memory).
    pub unsafe fn run_from_disk<S: Storage + ?Sized>(self, storage: &mut S, path: &str) -> LoadResult<Infallible> {
        let image = read_file(storage, path)?;
        // SAFETY: forwarded to the caller.
        unsafe { self.run_from_memory(&image) }
    }

    /// Stage `devtree`, then load `image` and enter it
    ///
    /// An oversized device tree is rejected before anything is copied.
    ///
    /// # Safety
    /// See [`run_from_memory`](Self::run_from_memory).
    pub unsafe fn run_with_device_tree(mut self, image: &[u8], devtree: &[u8]) -> LoadResult<Infallible> {
        let layout = *self.relocator.layout();
        stage_device_tree(self.relocator.board(), devtree, &layout)?;
        // SAFETY: forwarded to the caller.
        unsafe { self.run_from_memory(image) }
    }
}
