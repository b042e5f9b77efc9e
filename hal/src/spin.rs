//! # Spin-Waiting
//!
//! Busy-wait on a hardware predicate. These loops burn the core; they are not
//! a blocking primitive and never yield, because there is nothing to yield to.

/// Spin until `ready` returns true
///
/// Unbounded: the hardware is assumed to become ready eventually.
#[inline(always)]
pub fn spin_until<F: FnMut() -> bool>(mut ready: F) {
    while !ready() {
        core::hint::spin_loop();
    }
}

/// Spin until `ready` returns true or `max_polls` polls have failed
///
/// Returns whether the predicate was observed true.
#[inline(always)]
pub fn spin_until_bounded<F: FnMut() -> bool>(mut ready: F, max_polls: u64) -> bool {
    let mut polls = 0;
    while polls < max_polls {
        if ready() {
            return true;
        }
        core::hint::spin_loop();
        polls += 1;
    }
    false
}
