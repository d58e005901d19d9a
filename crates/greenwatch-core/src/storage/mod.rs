pub mod circular_log;

pub use circular_log::CircularLog;

use crate::config::LOG_CAPACITY;

/// Measured quantity with its own history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Barometer temperature in °C
    Temperature,
    /// Barometric pressure in hPa
    Pressure,
    /// Ambient light sensor output in V
    Light,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Self::Temperature, Self::Pressure, Self::Light];

    /// Get a short label for display
    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Pressure => "Pressure",
            Self::Light => "Ambient light",
        }
    }

    /// Get the engineering unit of the channel
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "*C",
            Self::Pressure => "hPa",
            Self::Light => "V",
        }
    }
}

pub type SampleLog = CircularLog<f32, LOG_CAPACITY>;

/// The three independent sample histories.
#[derive(Debug, Clone)]
pub struct SampleLogs {
    temperature: SampleLog,
    pressure: SampleLog,
    light: SampleLog,
}

impl SampleLogs {
    pub fn new(depth: usize) -> Self {
        Self {
            temperature: SampleLog::new(depth),
            pressure: SampleLog::new(depth),
            light: SampleLog::new(depth),
        }
    }

    pub fn log(&self, channel: Channel) -> &SampleLog {
        match channel {
            Channel::Temperature => &self.temperature,
            Channel::Pressure => &self.pressure,
            Channel::Light => &self.light,
        }
    }

    pub fn log_mut(&mut self, channel: Channel) -> &mut SampleLog {
        match channel {
            Channel::Temperature => &mut self.temperature,
            Channel::Pressure => &mut self.pressure,
            Channel::Light => &mut self.light,
        }
    }

    /// Apply a new window to every log. Returns the depth actually applied.
    pub fn resize(&mut self, depth: usize) -> usize {
        let mut applied = depth;
        for channel in Channel::ALL {
            applied = self.log_mut(channel).resize(depth);
        }
        applied
    }

    pub fn depth(&self) -> usize {
        self.temperature.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_are_independent() {
        let mut logs = SampleLogs::new(4);
        logs.log_mut(Channel::Light).write(1.25);

        assert!(logs.log(Channel::Temperature).is_empty());
        assert!(logs.log(Channel::Pressure).is_empty());
        assert_eq!(logs.log(Channel::Light).len(), 1);
    }

    #[test]
    fn test_resize_applies_to_all_logs() {
        let mut logs = SampleLogs::new(4);
        assert_eq!(logs.resize(2), 2);
        for channel in Channel::ALL {
            assert_eq!(logs.log(channel).size(), 2);
        }
        assert_eq!(logs.depth(), 2);
    }
}
