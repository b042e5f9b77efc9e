//! # Relocation Engine
//!
//! The primary-core half of the handoff. Once [`Relocator::run_from_memory`]
//! passes its checks it never returns: peripherals are stopped, the transfer
//! trampoline is relocated, the image is staged, the secondary cores are
//! parked and control moves to the relocated mapper.

use core::convert::Infallible;

use helix_hal::cache::sync_before_exec;
use helix_hal::mem::copy_bytes;
use helix_hal::PhysAddr;

use crate::board::Board;
use crate::config::Layout;
use crate::context::Trampoline;
use crate::handoff::{HoldCell, StagedImage};
use crate::smp;
use crate::RelocResult;

/// Primary-core relocation sequence over a board
pub struct Relocator<'b, B: Board + ?Sized> {
    board: &'b mut B,
    layout: Layout,
}

impl<'b, B: Board + ?Sized> Relocator<'b, B> {
    /// Create a relocator for `board`
    pub fn new(board: &'b mut B, layout: Layout) -> Self {
        Self { board, layout }
    }

    /// Staging layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Underlying board
    pub fn board(&mut self) -> &mut B {
        self.board
    }

    /// Bind the board's transfer trampoline to the code staging region
    pub fn trampoline(&self) -> RelocResult<Trampoline> {
        Trampoline::new(
            self.board.trampoline_symbols(),
            self.layout.code_staging,
            self.layout.code_staging_size,
        )
    }

    /// Stop DMA-capable peripherals
    pub fn quiesce(&mut self) {
        log::debug!("relocation: quiescing network and USB");
        self.board.quiesce_network();
        self.board.shutdown_usb();
    }

    /// Copy the trampoline to its staging base and make it executable
    ///
    /// The relocated hold cell is cleared so parked cores wait.
    ///
    /// # Safety
    /// The code staging region must be free for the loader's use.
    pub unsafe fn relocate_trampoline(&mut self, trampoline: &Trampoline) {
        let size = trampoline.size();
        let dst = self.board.phys_ptr(trampoline.base());
        // SAFETY: the link-time section is readable for `size` bytes and the
        // staging region holds at least that much (checked when bound).
        unsafe { copy_bytes(dst, trampoline.link_start(), size as usize) };
        sync_before_exec(self.board, trampoline.base(), size);
        HoldCell::at(trampoline.hold_cell()).arm(self.board);

        log::debug!(
            "relocation: trampoline {:#x}..{:#x} -> {}",
            trampoline.symbols().start,
            trampoline.symbols().end,
            trampoline.base()
        );
    }

    /// Copy the raw image to the data staging region
    ///
    /// # Safety
    /// The data staging region must be free for the loader's use and large
    /// enough for `image`.
    pub unsafe fn stage_image(&mut self, image: &[u8]) -> PhysAddr {
        let at = self.layout.data_staging;
        let dst = self.board.phys_ptr(at);
        // SAFETY: per the contract.
        unsafe { copy_bytes(dst, image.as_ptr(), image.len()) };
        log::debug!("relocation: staged {} image bytes at {}", image.len(), at);
        at
    }

    /// Start the secondary cores and park them on the relocated hold routine
    ///
    /// Waits a fixed settle delay afterwards; arrival is not confirmed.
    pub fn park_secondaries(&mut self, trampoline: &Trampoline) {
        self.board.startup();
        let attempts = smp::park_secondaries(
            self.board,
            self.layout.secondary_cores(),
            trampoline.hold_thread(),
        );
        log::debug!(
            "relocation: {} secondary cores dispatched ({} attempts)",
            self.layout.secondary_cores().len(),
            attempts
        );
        self.board.delay_ms(self.layout.park_delay_ms);
    }

    /// Load `image` over the running system and enter it
    ///
    /// Returns only when the trampoline cannot be bound, before anything is
    /// touched.
    ///
    /// # Safety
    /// `image` must be a trusted ELF32 image whose sections avoid the staging
    /// regions. Everything outside the staging regions may be overwritten.
    pub unsafe fn run_from_memory(mut self, image: &[u8]) -> RelocResult<Infallible> {
        let trampoline = self.trampoline()?;
        log::info!("relocation: loading {} byte image", image.len());

        self.quiesce();
        // SAFETY: forwarded to the caller.
        unsafe { self.relocate_trampoline(&trampoline) };
        // SAFETY: forwarded to the caller.
        let staged_at = unsafe { self.stage_image(image) };
        self.park_secondaries(&trampoline);

        let staged = StagedImage {
            image: staged_at,
            hold_cell: trampoline.hold_cell(),
            run: trampoline.run(),
        };
        // SAFETY: the trampoline is copied and synced, the image staged.
        unsafe { self.board.enter_relocated(trampoline.prepare_run(), staged) }
    }
}
