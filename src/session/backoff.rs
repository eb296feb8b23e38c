//! Reconnect delay schedule
//!
//! Retry delays follow a fixed doubling table from 8 seconds up to 4096
//! seconds (just over an hour). Consecutive failures walk the table in
//! order and wrap back to the start, so retries never stop on their own;
//! only an explicit cancel or a successful connect ends them.

use std::time::Duration;

/// Retry delay table in seconds
pub const RETRY_DELAYS_SECS: [u64; 10] = [8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096];

/// Position in the retry delay table
///
/// Pure arithmetic over the table; timers and cancellation live with the
/// caller. A fresh schedule always starts at the shortest delay.
#[derive(Debug, Clone, Default)]
pub struct ReconnectSchedule {
    next_index: usize,
}

impl ReconnectSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay to wait before the next attempt
    pub fn current_delay(&self) -> Duration {
        Duration::from_secs(RETRY_DELAYS_SECS[self.next_index % RETRY_DELAYS_SECS.len()])
    }

    /// Move to the next table entry, wrapping past the end
    pub fn advance(&mut self) {
        self.next_index = (self.next_index + 1) % RETRY_DELAYS_SECS.len();
    }

    /// Back to the shortest delay
    pub fn reset(&mut self) {
        self.next_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_delays_double_from_eight_seconds() {
        let mut schedule = ReconnectSchedule::new();
        for expected in RETRY_DELAYS_SECS {
            assert_eq!(schedule.current_delay(), Duration::from_secs(expected));
            schedule.advance();
        }
    }

    #[test]
    fn test_wraps_to_shortest_delay() {
        let mut schedule = ReconnectSchedule::new();
        for _ in 0..RETRY_DELAYS_SECS.len() {
            schedule.advance();
        }
        assert_eq!(schedule.current_delay(), Duration::from_secs(8));
    }

    #[test]
    fn test_reset_returns_to_start() {
        let mut schedule = ReconnectSchedule::new();
        schedule.advance();
        schedule.advance();
        schedule.reset();
        assert_eq!(schedule.current_delay(), Duration::from_secs(8));
    }

    proptest! {
        #[test]
        fn test_nth_delay_is_table_entry_mod_len(n in 0usize..1000) {
            let mut schedule = ReconnectSchedule::new();
            for _ in 0..n {
                schedule.advance();
            }
            let expected = RETRY_DELAYS_SECS[n % RETRY_DELAYS_SECS.len()];
            prop_assert_eq!(schedule.current_delay(), Duration::from_secs(expected));
        }
    }
}
