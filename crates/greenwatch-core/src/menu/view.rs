use crate::config::Config;
use crate::sampling::LiveValues;
use crate::storage::{Channel, SampleLogs};

use super::SettingField;

/// One logged sample with its age relative to the newest slot of the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    pub age_ms: u32,
    pub value: f32,
}

/// Everything a renderer may show, borrowed from the main-loop context.
#[derive(Clone, Copy)]
pub struct MenuView<'a> {
    live: &'a LiveValues,
    logs: &'a SampleLogs,
    config: &'a Config,
}

impl<'a> MenuView<'a> {
    pub const fn new(live: &'a LiveValues, logs: &'a SampleLogs, config: &'a Config) -> Self {
        Self { live, logs, config }
    }

    pub const fn current(&self, channel: Channel) -> Option<f32> {
        self.live.get(channel)
    }

    /// Logged samples oldest first, each labelled with how long ago it was taken.
    ///
    /// Samples are `sample_interval` timer ticks of `tick_ms` apart.
    pub fn log_entries(&self, channel: Channel) -> impl Iterator<Item = LogEntry> + 'a {
        let log = self.logs.log(channel);
        let count = log.len() as u32;
        let spacing_ms = (self.config.sample_interval as u32).saturating_mul(self.config.tick_ms);
        log.iter().zip(0u32..).map(move |(value, i)| LogEntry {
            age_ms: (count - i).saturating_mul(spacing_ms),
            value,
        })
    }

    pub const fn setting(&self, field: SettingField) -> u16 {
        match field {
            SettingField::SampleInterval => self.config.sample_interval,
            SettingField::LogDepth => self.config.log_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entries_are_aged_from_newest() {
        let live = LiveValues::default();
        let mut logs = SampleLogs::new(5);
        for value in [10.0, 20.0, 30.0] {
            logs.log_mut(Channel::Pressure).write(value);
        }
        let config = Config {
            sample_interval: 4,
            ..Config::default()
        };
        let view = MenuView::new(&live, &logs, &config);

        let entries: Vec<_> = view.log_entries(Channel::Pressure).collect();
        assert_eq!(
            entries,
            vec![
                LogEntry { age_ms: 12_000, value: 10.0 },
                LogEntry { age_ms: 8_000, value: 20.0 },
                LogEntry { age_ms: 4_000, value: 30.0 },
            ]
        );
        assert_eq!(view.log_entries(Channel::Light).count(), 0);
    }

    #[test]
    fn test_log_ages_follow_timer_period() {
        let live = LiveValues::default();
        let mut logs = SampleLogs::new(5);
        for value in [10.0, 20.0, 30.0] {
            logs.log_mut(Channel::Pressure).write(value);
        }
        let config = Config {
            sample_interval: 4,
            tick_ms: 500,
            ..Config::default()
        };
        let view = MenuView::new(&live, &logs, &config);

        let ages: Vec<_> = view.log_entries(Channel::Pressure).map(|e| e.age_ms).collect();
        assert_eq!(ages, vec![6_000, 4_000, 2_000]);
    }

    #[test]
    fn test_view_reads_settings_and_live_values() {
        let live = LiveValues {
            temperature: Some(21.5),
            ..LiveValues::default()
        };
        let logs = SampleLogs::new(5);
        let config = Config::default();
        let view = MenuView::new(&live, &logs, &config);

        assert_eq!(view.current(Channel::Temperature), Some(21.5));
        assert_eq!(view.current(Channel::Light), None);
        assert_eq!(view.setting(SettingField::LogDepth), config.log_depth);
    }
}
