//! Timer-driven sampling
//!
//! The sampling timer only raises a flag. Each time the main loop sees it,
//! [`Sampler::on_tick`] reads every channel once, refreshes the live values
//! and, every `interval` ticks, appends the readings to the logs.

use log::{debug, info};

use crate::storage::{Channel, SampleLogs};

/// Source of one scaled reading per channel.
///
/// `None` means the reading is unavailable this cycle; implementations log
/// the reason.
pub trait SampleSource {
    fn sample(&mut self, channel: Channel) -> Option<f32>;
}

/// Latest reading of every channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveValues {
    pub temperature: Option<f32>,
    pub pressure: Option<f32>,
    pub light: Option<f32>,
}

impl LiveValues {
    pub const fn get(&self, channel: Channel) -> Option<f32> {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Pressure => self.pressure,
            Channel::Light => self.light,
        }
    }

    fn set(&mut self, channel: Channel, value: Option<f32>) {
        match channel {
            Channel::Temperature => self.temperature = value,
            Channel::Pressure => self.pressure = value,
            Channel::Light => self.light = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Live values refreshed only.
    Refreshed,
    /// Live values refreshed and one sample appended per available channel.
    Logged,
}

pub struct Sampler {
    ticks: u16,
    pending_depth: Option<usize>,
    live: LiveValues,
    logs: SampleLogs,
}

impl Sampler {
    pub fn new(depth: usize) -> Self {
        Self {
            ticks: 0,
            pending_depth: None,
            live: LiveValues::default(),
            logs: SampleLogs::new(depth),
        }
    }

    /// Queue a log window change; it is applied before the next tick.
    pub fn request_depth(&mut self, depth: usize) {
        self.pending_depth = Some(depth);
    }

    pub fn pending_depth(&self) -> Option<usize> {
        self.pending_depth
    }

    pub fn on_tick<S: SampleSource>(&mut self, source: &mut S, interval: u16) -> TickOutcome {
        if let Some(depth) = self.pending_depth.take() {
            let applied = self.logs.resize(depth);
            info!("Log depth set to {}", applied);
        }

        self.ticks = self.ticks.saturating_add(1);
        let due = self.ticks >= interval.max(1);

        for channel in Channel::ALL {
            let value = source.sample(channel);
            if due && let Some(value) = value {
                self.logs.log_mut(channel).write(value);
            }
            self.live.set(channel, value);
        }

        if due {
            debug!("Logged samples: {:?}", self.live);
            self.ticks = 0;
            TickOutcome::Logged
        } else {
            TickOutcome::Refreshed
        }
    }

    pub fn live(&self) -> &LiveValues {
        &self.live
    }

    pub fn logs(&self) -> &SampleLogs {
        &self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        next: f32,
        light_available: bool,
    }

    impl SampleSource for Counter {
        fn sample(&mut self, channel: Channel) -> Option<f32> {
            if channel == Channel::Light && !self.light_available {
                return None;
            }
            self.next += 1.0;
            Some(self.next)
        }
    }

    fn counter() -> Counter {
        Counter {
            next: 0.0,
            light_available: true,
        }
    }

    #[test]
    fn test_logs_every_interval_ticks() {
        let mut sampler = Sampler::new(10);
        let mut source = counter();

        let outcomes: Vec<_> = (0..6).map(|_| sampler.on_tick(&mut source, 3)).collect();
        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Refreshed,
                TickOutcome::Refreshed,
                TickOutcome::Logged,
                TickOutcome::Refreshed,
                TickOutcome::Refreshed,
                TickOutcome::Logged,
            ]
        );
        assert_eq!(sampler.logs().log(Channel::Temperature).len(), 2);
    }

    #[test]
    fn test_live_values_refresh_every_tick() {
        let mut sampler = Sampler::new(10);
        let mut source = counter();

        sampler.on_tick(&mut source, 5);
        assert_eq!(sampler.live().temperature, Some(1.0));
        sampler.on_tick(&mut source, 5);
        assert_eq!(sampler.live().temperature, Some(4.0));
        assert!(sampler.logs().log(Channel::Temperature).is_empty());
    }

    #[test]
    fn test_channels_land_in_their_own_logs() {
        let mut sampler = Sampler::new(10);
        let mut source = counter();

        sampler.on_tick(&mut source, 1);

        let logs = sampler.logs();
        assert_eq!(logs.log(Channel::Temperature).iter().collect::<Vec<_>>(), vec![1.0]);
        assert_eq!(logs.log(Channel::Pressure).iter().collect::<Vec<_>>(), vec![2.0]);
        assert_eq!(logs.log(Channel::Light).iter().collect::<Vec<_>>(), vec![3.0]);
    }

    #[test]
    fn test_unavailable_reading_is_not_logged() {
        let mut sampler = Sampler::new(10);
        let mut source = Counter {
            next: 0.0,
            light_available: false,
        };

        assert_eq!(sampler.on_tick(&mut source, 1), TickOutcome::Logged);
        assert_eq!(sampler.live().light, None);
        assert!(sampler.logs().log(Channel::Light).is_empty());
        assert_eq!(sampler.logs().log(Channel::Pressure).len(), 1);
    }

    #[test]
    fn test_depth_change_waits_for_next_tick() {
        let mut sampler = Sampler::new(4);
        let mut source = counter();
        for _ in 0..4 {
            sampler.on_tick(&mut source, 1);
        }

        sampler.request_depth(2);
        assert_eq!(sampler.logs().depth(), 4);
        assert_eq!(sampler.pending_depth(), Some(2));

        sampler.on_tick(&mut source, 1);
        assert_eq!(sampler.pending_depth(), None);
        assert_eq!(sampler.logs().depth(), 2);
        assert_eq!(sampler.logs().log(Channel::Temperature).len(), 2);
        // Newest temperature reading is 3 * 5 - 2
        assert_eq!(
            sampler.logs().log(Channel::Temperature).iter().last(),
            Some(13.0)
        );
    }
}
