//! # Board Collaborators
//!
//! Everything the relocation sequence needs from the machine, behind traits
//! so the sequence can run against the real board or a simulated one.

use helix_hal::cache::CacheMaintenance;
use helix_hal::serial::ConsoleWriter;
use helix_hal::timer::Delay;
use helix_hal::PhysMemory;

use crate::context::TrampolineSymbols;
use crate::handoff::Transfer;
use crate::smp::SecondaryCores;

/// Peripherals that must be stopped before memory is overwritten
///
/// Both calls are fire-and-forget; results are not inspected.
pub trait Peripherals {
    /// Stop network DMA
    fn quiesce_network(&mut self);

    /// Shut down the USB controllers
    fn shutdown_usb(&mut self);
}

/// A board the loader can hand off on
pub trait Board:
    PhysMemory + CacheMaintenance + ConsoleWriter + Delay + Peripherals + SecondaryCores + Transfer
{
    /// Link-time layout of the transfer trampoline
    fn trampoline_symbols(&self) -> TrampolineSymbols;
}
