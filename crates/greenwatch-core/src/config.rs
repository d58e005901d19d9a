//! Boot-time configuration and runtime-editable settings

use serde::{Deserialize, Serialize};

/// Number of slots allocated for every sample log.
pub const LOG_CAPACITY: usize = 20;

/// Inclusive range accepted for a runtime-editable setting.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingRange {
    pub min: u16,
    pub max: u16,
}

impl SettingRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub const fn contains(&self, value: u16) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Valid sample decimation interval, in timer ticks (seconds).
pub const SAMPLE_INTERVAL_RANGE: SettingRange = SettingRange::new(1, 3600);

/// Valid log depth, in samples.
pub const LOG_DEPTH_RANGE: SettingRange = SettingRange::new(1, LOG_CAPACITY as u16);

/// Parameters for the bounded-retry readiness wait at boot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct BringUpConfig {
    /// Number of status polls before giving up.
    pub retry_count: u32,
    /// Wait between two polls.
    pub backoff_ms: u32,
}

impl Default for BringUpConfig {
    fn default() -> Self {
        Self {
            retry_count: 20,
            backoff_ms: 500,
        }
    }
}

/// Parameters for the ambient-light ADC channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct AdcConfig {
    pub channel_mask: u32,
    pub interval_ms: u32,
    pub reference_mv: u32,
    /// Full-scale code of the converter.
    pub max_code: u32,
}

impl AdcConfig {
    /// Convert a raw conversion result to volts.
    pub fn to_volts(&self, raw: u32) -> f32 {
        (raw as f32 * self.reference_mv as f32 / 1000.0) / self.max_code as f32
    }
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            channel_mask: 0x01,
            interval_ms: 1000,
            reference_mv: 2500,
            max_code: 0xFFF,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Timer ticks between retained log samples.
    pub sample_interval: u16,
    /// Number of samples kept in each log window.
    pub log_depth: u16,
    /// Period of the sampling timer.
    pub tick_ms: u32,
    /// Maximum status reads while waiting on a sensor-hub or reset bit.
    pub poll_limit: u32,
    pub bring_up: BringUpConfig,
    pub adc: AdcConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval: 5,
            log_depth: 10,
            tick_ms: 1000,
            poll_limit: 1000,
            bring_up: BringUpConfig::default(),
            adc: AdcConfig::default(),
        }
    }
}

impl Config {
    /// Clamp the editable settings into their valid ranges.
    ///
    /// Applied to values that did not come through the menu, e.g. environment
    /// overrides in the simulator.
    pub fn sanitized(mut self) -> Self {
        self.sample_interval = self
            .sample_interval
            .clamp(SAMPLE_INTERVAL_RANGE.min, SAMPLE_INTERVAL_RANGE.max);
        self.log_depth = self.log_depth.clamp(LOG_DEPTH_RANGE.min, LOG_DEPTH_RANGE.max);
        self.poll_limit = self.poll_limit.max(1);
        self.tick_ms = self.tick_ms.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_in_range() {
        let config = Config::default();
        assert!(SAMPLE_INTERVAL_RANGE.contains(config.sample_interval));
        assert!(LOG_DEPTH_RANGE.contains(config.log_depth));
        assert_eq!(config.bring_up.retry_count, 20);
        assert_eq!(config.bring_up.backoff_ms, 500);
    }

    #[test]
    fn test_sanitized_clamps_out_of_range_settings() {
        let config = Config {
            sample_interval: 0,
            log_depth: 500,
            poll_limit: 0,
            ..Config::default()
        }
        .sanitized();

        assert_eq!(config.sample_interval, 1);
        assert_eq!(config.log_depth, LOG_CAPACITY as u16);
        assert_eq!(config.poll_limit, 1);
    }

    #[test]
    fn test_adc_full_scale_is_reference_voltage() {
        let adc = AdcConfig::default();
        assert!((adc.to_volts(0xFFF) - 2.5).abs() < 1e-6);
        assert_eq!(adc.to_volts(0), 0.0);
    }
}
