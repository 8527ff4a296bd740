//! Instrument configuration.
//!
//! Durations are kept in milliseconds and converted to ticks at the
//! configured tick rate when timers are armed.

use std::env;
use std::str::FromStr;

use crate::error::{InstrumentError, InstrumentResult};

/// Pass criterion of one test stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThresholdConfig {
    /// Vacuum, in raw sensor units below the idle reading, needed to pass.
    pub raw_vacuum: u32,
    /// Time allowed to reach `raw_vacuum`.
    pub timeout_ms: u32,
}

impl ThresholdConfig {
    pub const fn new(raw_vacuum: u32, timeout_ms: u32) -> Self {
        Self {
            raw_vacuum,
            timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TesterConfig {
    pub tick_hz: u32,
    /// Welcome screen duration before calibration.
    pub welcome_ms: u32,
    /// Pause between the preparing screen and the first stage.
    pub pre_test_ms: u32,
    /// Sampling period while a stage runs.
    pub test_refresh_ms: u32,
    /// Touch polling period of the idle screens.
    pub main_refresh_ms: u32,
    /// Display wake-up attempts before restarting the controller.
    pub wake_retries: u32,
    pub wake_retry_ms: u32,
    /// Settle time of the porator detector input.
    pub debounce_ms: u32,
    pub first: ThresholdConfig,
    pub second: ThresholdConfig,
    pub gui_priority: u8,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            tick_hz: 100,
            welcome_ms: 3000,
            pre_test_ms: 500,
            test_refresh_ms: 10,
            main_refresh_ms: 10,
            wake_retries: 10,
            wake_retry_ms: 100,
            debounce_ms: 50,
            first: ThresholdConfig::new(200, 10_000),
            second: ThresholdConfig::new(400, 10_000),
            gui_priority: 30,
        }
    }
}

impl TesterConfig {
    pub fn builder() -> TesterConfigBuilder {
        TesterConfigBuilder::default()
    }

    /// Defaults overridden by any `VT_*` variable present in the environment.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `VT_TICK_HZ` | `tick_hz` |
    /// | `VT_WELCOME_MS` | `welcome_ms` |
    /// | `VT_PRE_TEST_MS` | `pre_test_ms` |
    /// | `VT_WAKE_RETRIES` | `wake_retries` |
    /// | `VT_DEBOUNCE_MS` | `debounce_ms` |
    /// | `VT_FIRST_TH_RAW` / `VT_FIRST_TH_TIMEOUT_MS` | `first` |
    /// | `VT_SECOND_TH_RAW` / `VT_SECOND_TH_TIMEOUT_MS` | `second` |
    pub fn from_env() -> InstrumentResult<Self> {
        let mut config = Self::default();
        override_from_env("VT_TICK_HZ", &mut config.tick_hz)?;
        override_from_env("VT_WELCOME_MS", &mut config.welcome_ms)?;
        override_from_env("VT_PRE_TEST_MS", &mut config.pre_test_ms)?;
        if let Ok(raw) = env::var("VT_WAKE_RETRIES") {
            config.wake_retries = parse_nonzero("VT_WAKE_RETRIES", &raw)?;
        }
        override_from_env("VT_DEBOUNCE_MS", &mut config.debounce_ms)?;
        override_from_env("VT_FIRST_TH_RAW", &mut config.first.raw_vacuum)?;
        override_from_env("VT_FIRST_TH_TIMEOUT_MS", &mut config.first.timeout_ms)?;
        override_from_env("VT_SECOND_TH_RAW", &mut config.second.raw_vacuum)?;
        override_from_env("VT_SECOND_TH_TIMEOUT_MS", &mut config.second.timeout_ms)?;
        Ok(config)
    }
}

fn override_from_env<T: FromStr>(var: &'static str, field: &mut T) -> InstrumentResult<()> {
    if let Ok(raw) = env::var(var) {
        *field = parse_value(var, &raw)?;
    }
    Ok(())
}

fn parse_value<T: FromStr>(var: &'static str, raw: &str) -> InstrumentResult<T> {
    raw.trim().parse().map_err(|_| InstrumentError::Config {
        var,
        value: raw.to_string(),
    })
}

fn parse_nonzero(var: &'static str, raw: &str) -> InstrumentResult<u32> {
    match parse_value(var, raw)? {
        0 => Err(InstrumentError::Config {
            var,
            value: raw.to_string(),
        }),
        value => Ok(value),
    }
}

#[derive(Debug, Clone, Default)]
pub struct TesterConfigBuilder {
    config: TesterConfig,
}

impl TesterConfigBuilder {
    pub fn tick_hz(mut self, hz: u32) -> Self {
        self.config.tick_hz = hz;
        self
    }

    pub fn welcome_ms(mut self, ms: u32) -> Self {
        self.config.welcome_ms = ms;
        self
    }

    pub fn pre_test_ms(mut self, ms: u32) -> Self {
        self.config.pre_test_ms = ms;
        self
    }

    pub fn test_refresh_ms(mut self, ms: u32) -> Self {
        self.config.test_refresh_ms = ms;
        self
    }

    pub fn main_refresh_ms(mut self, ms: u32) -> Self {
        self.config.main_refresh_ms = ms;
        self
    }

    /// Sets how often and how far apart the display wake-up is retried.
    /// A count of zero still makes one attempt per controller power-up.
    pub fn wake_retries(mut self, retries: u32, retry_ms: u32) -> Self {
        self.config.wake_retries = retries;
        self.config.wake_retry_ms = retry_ms;
        self
    }

    pub fn debounce_ms(mut self, ms: u32) -> Self {
        self.config.debounce_ms = ms;
        self
    }

    pub fn first_threshold(mut self, threshold: ThresholdConfig) -> Self {
        self.config.first = threshold;
        self
    }

    pub fn second_threshold(mut self, threshold: ThresholdConfig) -> Self {
        self.config.second = threshold;
        self
    }

    pub fn gui_priority(mut self, priority: u8) -> Self {
        self.config.gui_priority = priority;
        self
    }

    pub fn build(self) -> TesterConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TesterConfig::default();
        assert_eq!(config.tick_hz, 100);
        assert_eq!(config.pre_test_ms, 500);
        assert_eq!(config.wake_retries, 10);
        assert_eq!(config.wake_retry_ms, 100);
        assert_eq!(config.debounce_ms, 50);
    }

    #[test]
    fn test_builder() {
        let config = TesterConfig::builder()
            .tick_hz(1000)
            .wake_retries(3, 20)
            .first_threshold(ThresholdConfig::new(150, 2000))
            .build();

        assert_eq!(config.tick_hz, 1000);
        assert_eq!(config.wake_retries, 3);
        assert_eq!(config.wake_retry_ms, 20);
        assert_eq!(config.first, ThresholdConfig::new(150, 2000));
        assert_eq!(config.second, TesterConfig::default().second);
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u32>("VT_X", " 250 ").unwrap(), 250);
        match parse_value::<u32>("VT_X", "fast") {
            Err(InstrumentError::Config { var, value }) => {
                assert_eq!(var, "VT_X");
                assert_eq!(value, "fast");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_zero_wake_retries_rejected() {
        assert_eq!(parse_nonzero("VT_WAKE_RETRIES", "4").unwrap(), 4);
        assert!(matches!(
            parse_nonzero("VT_WAKE_RETRIES", "0"),
            Err(InstrumentError::Config {
                var: "VT_WAKE_RETRIES",
                ..
            })
        ));
    }
}
