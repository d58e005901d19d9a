//! Bounded-retry readiness wait
//!
//! Sensors need a moment after reset before their data-ready flags come up.
//! [`BringUp`] polls a readiness check a fixed number of times with a blocking
//! backoff between polls. Giving up is not fatal: the device is simply left
//! out of sampling for the rest of the run.

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::config::BringUpConfig;
use crate::sensors::SensorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpState {
    Init,
    /// Waiting; `polls_left` status reads remain.
    Polling { polls_left: u32 },
    Ready,
    GaveUp,
}

impl BringUpState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::GaveUp)
    }
}

/// Readiness wait for one device.
#[derive(Debug, Clone)]
pub struct BringUp {
    name: &'static str,
    state: BringUpState,
    config: BringUpConfig,
}

impl BringUp {
    pub const fn new(name: &'static str, config: BringUpConfig) -> Self {
        Self {
            name,
            state: BringUpState::Init,
            config,
        }
    }

    pub const fn state(&self) -> BringUpState {
        self.state
    }

    pub const fn is_ready(&self) -> bool {
        matches!(self.state, BringUpState::Ready)
    }

    /// Advance by one poll.
    ///
    /// `poll` reports whether every required readiness flag is set. A failed
    /// status read counts as not ready. The backoff is only taken between two
    /// polls, never before the first or after the last.
    pub fn step<D: DelayNs>(
        &mut self,
        poll: &mut impl FnMut() -> Result<bool, SensorError>,
        delay: &mut D,
    ) -> BringUpState {
        let polls_left = match self.state {
            BringUpState::Init => self.config.retry_count.max(1),
            BringUpState::Polling { polls_left } => {
                delay.delay_ms(self.config.backoff_ms);
                polls_left
            }
            terminal => return terminal,
        };

        let ready = match poll() {
            Ok(ready) => ready,
            Err(e) => {
                warn!("{}: status read failed during bring-up: {}", self.name, e);
                false
            }
        };

        let polls_left = polls_left - 1;
        self.state = if ready {
            info!("{}: ready", self.name);
            BringUpState::Ready
        } else if polls_left == 0 {
            warn!(
                "{}: not ready after {} polls, giving up",
                self.name, self.config.retry_count
            );
            BringUpState::GaveUp
        } else {
            BringUpState::Polling { polls_left }
        };
        self.state
    }

    /// Poll until the device is ready or the retry budget is spent.
    pub fn run<D: DelayNs>(
        &mut self,
        mut poll: impl FnMut() -> Result<bool, SensorError>,
        delay: &mut D,
    ) -> bool {
        while !self.step(&mut poll, delay).is_terminal() {}
        self.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingDelay {
        waits: u32,
        total_ns: u64,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.waits += 1;
            self.total_ns += ns as u64;
        }
    }

    const CONFIG: BringUpConfig = BringUpConfig {
        retry_count: 20,
        backoff_ms: 500,
    };

    #[test]
    fn test_never_ready_gives_up_after_retry_count() {
        let mut bring_up = BringUp::new("test", CONFIG);
        let mut delay = RecordingDelay::default();
        let mut polls = 0;

        let ready = bring_up.run(
            || {
                polls += 1;
                Ok(false)
            },
            &mut delay,
        );

        assert!(!ready);
        assert_eq!(bring_up.state(), BringUpState::GaveUp);
        assert_eq!(polls, 20);
        assert_eq!(delay.waits, 19);
        assert_eq!(delay.total_ns, 19 * 500_000_000);
    }

    #[test]
    fn test_ready_on_first_poll_never_waits() {
        let mut bring_up = BringUp::new("test", CONFIG);
        let mut delay = RecordingDelay::default();

        assert!(bring_up.run(|| Ok(true), &mut delay));
        assert_eq!(delay.waits, 0);
    }

    #[test]
    fn test_becomes_ready_mid_way() {
        let mut bring_up = BringUp::new("test", CONFIG);
        let mut delay = RecordingDelay::default();
        let mut polls = 0;

        assert!(bring_up.run(
            || {
                polls += 1;
                Ok(polls == 4)
            },
            &mut delay,
        ));
        assert_eq!(polls, 4);
        assert_eq!(delay.waits, 3);
    }

    #[test]
    fn test_status_errors_count_as_not_ready() {
        let mut bring_up = BringUp::new(
            "test",
            BringUpConfig {
                retry_count: 3,
                backoff_ms: 1,
            },
        );
        let mut delay = RecordingDelay::default();

        let ready = bring_up.run(
            || {
                Err(SensorError::Timeout {
                    sensor: "test",
                    operation: "status",
                })
            },
            &mut delay,
        );
        assert!(!ready);
        assert_eq!(delay.waits, 2);
    }

    #[test]
    fn test_step_walks_through_states() {
        let mut bring_up = BringUp::new(
            "test",
            BringUpConfig {
                retry_count: 2,
                backoff_ms: 10,
            },
        );
        let mut delay = RecordingDelay::default();
        let mut poll = || -> Result<bool, SensorError> { Ok(false) };

        assert_eq!(bring_up.state(), BringUpState::Init);
        assert_eq!(
            bring_up.step(&mut poll, &mut delay),
            BringUpState::Polling { polls_left: 1 }
        );
        assert_eq!(bring_up.step(&mut poll, &mut delay), BringUpState::GaveUp);
        // Terminal states are sticky and do not poll or wait
        assert_eq!(bring_up.step(&mut poll, &mut delay), BringUpState::GaveUp);
        assert_eq!(delay.waits, 1);
    }
}
