//! # Busy Delays
//!
//! Fixed-duration delays built on a free-running tick counter.

use crate::spin::spin_until;

/// Xenon timebase frequency (Hz)
pub const XENON_TIMEBASE_HZ: u64 = 50_000_000;

/// Fixed-duration delay
pub trait Delay {
    /// Busy-wait for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
}

/// Free-running monotonic tick source
pub trait Timebase {
    /// Ticks per second
    const FREQUENCY_HZ: u64;

    /// Current tick count
    fn ticks(&self) -> u64;
}

/// Delay that spins on a [`Timebase`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TimebaseDelay<T> {
    timebase: T,
}

impl<T: Timebase> TimebaseDelay<T> {
    /// Create a delay over `timebase`
    pub const fn new(timebase: T) -> Self {
        Self { timebase }
    }

    /// Ticks in `ms` milliseconds
    pub const fn ticks_for_ms(ms: u32) -> u64 {
        (ms as u64) * (T::FREQUENCY_HZ / 1000)
    }
}

impl<T: Timebase> Delay for TimebaseDelay<T> {
    fn delay_ms(&mut self, ms: u32) {
        let start = self.timebase.ticks();
        let wait = Self::ticks_for_ms(ms);
        spin_until(|| self.timebase.ticks().wrapping_sub(start) >= wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// Timebase that advances by a fixed step on every read
    struct Stepping {
        now: Cell<u64>,
        step: u64,
    }

    impl Timebase for Stepping {
        const FREQUENCY_HZ: u64 = XENON_TIMEBASE_HZ;

        fn ticks(&self) -> u64 {
            let now = self.now.get();
            self.now.set(now.wrapping_add(self.step));
            now
        }
    }

    #[test]
    fn test_ticks_for_ms() {
        assert_eq!(TimebaseDelay::<Stepping>::ticks_for_ms(200), 10_000_000);
        assert_eq!(TimebaseDelay::<Stepping>::ticks_for_ms(0), 0);
    }

    #[test]
    fn test_delay_waits_full_duration() {
        let mut delay = TimebaseDelay::new(Stepping {
            now: Cell::new(0),
            step: 50_000,
        });
        delay.delay_ms(200);
        // 200 ms at 50 MHz is 200 steps of 1 ms, plus the initial read.
        assert!(delay.timebase.now.get() >= 10_000_000);
    }

    #[test]
    fn test_delay_survives_wraparound() {
        let mut delay = TimebaseDelay::new(Stepping {
            now: Cell::new(u64::MAX - 100_000),
            step: 50_000,
        });
        delay.delay_ms(1);
    }
}
