//! # Secondary Cores
//!
//! Secondary cores are moved into the relocated trampoline before the image
//! overwrites whatever they were running, and wait there on the hold cell.
//!
//! ```text
//!   core 0: dispatch(1..N, hold_thread) ─ delay ─ map ─ publish ─ run
//!   core n:            hold_thread: poll cell ─────────────────┴─▶ target(n)
//! ```
//!
//! The settle delay is fixed; the primary never confirms that every core has
//! actually reached the parking routine.

use helix_hal::PhysAddr;
use helix_hal::PhysMemory;

use crate::handoff::{HoldCell, Transfer};

/// Secondary hardware threads
pub trait SecondaryCores {
    /// Bring the secondary threads up
    fn startup(&mut self);

    /// Ask `core` to run `routine`
    ///
    /// Returns whether the core accepted the task.
    fn dispatch(&mut self, core: usize, routine: PhysAddr) -> bool;
}

/// Dispatch `routine` to every core in `cores`, retrying each until accepted
///
/// Returns the total number of dispatch attempts.
pub fn park_secondaries<S, I>(cores: &mut S, indices: I, routine: PhysAddr) -> usize
where
    S: SecondaryCores + ?Sized,
    I: IntoIterator<Item = usize>,
{
    let mut attempts = 0;
    for core in indices {
        loop {
            attempts += 1;
            if cores.dispatch(core, routine) {
                break;
            }
            core::hint::spin_loop();
        }
        log::debug!("smp: core {} parked at {}", core, routine);
    }
    attempts
}

/// Parking routine body for a secondary core
///
/// Polls `cell` until it is published, then leaves for the published address.
///
/// # Safety
/// Must run on the secondary core `core`, from the relocated trampoline.
pub unsafe fn hold_thread<B>(board: &mut B, cell: HoldCell, core: usize) -> !
where
    B: PhysMemory + Transfer + ?Sized,
{
    let target = cell.wait(board);
    // SAFETY: a non-zero cell value is only ever a published release address.
    unsafe { board.release_secondary(target, core) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{expect_handoff, Event, Handoff, SimBoard};

    #[test]
    fn test_park_retries_until_accepted() {
        let mut board = SimBoard::new();
        board.reject_dispatches(2, 3);
        board.reject_dispatches(4, 1);
        let routine = PhysAddr::new(0x87FF_0300);

        let attempts = park_secondaries(&mut board, 1..6, routine);
        assert_eq!(attempts, 5 + 3 + 1);

        let accepted: Vec<usize> = board
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Dispatch { core, accepted: true, .. } => Some(*core),
                _ => None,
            })
            .collect();
        assert_eq!(accepted, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_every_dispatch_targets_routine() {
        let mut board = SimBoard::new();
        board.reject_dispatches(1, 2);
        let routine = PhysAddr::new(0x87FF_0300);
        park_secondaries(&mut board, [1], routine);
        assert!(board.events().iter().all(|e| match e {
            Event::Dispatch { routine: r, .. } => *r == routine,
            _ => true,
        }));
    }

    #[test]
    fn test_hold_thread_leaves_for_published_address() {
        let mut board = SimBoard::new();
        let cell = HoldCell::at(PhysAddr::new(0x87FF_0000));
        cell.publish(&mut board, 0x1060);

        let handoff = expect_handoff(|| unsafe { hold_thread(&mut board, cell, 3) });
        assert_eq!(handoff, Handoff::Secondary { target: 0x1060, core: 3 });
    }
}
