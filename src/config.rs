//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{DirectolorError, Result};
use crate::protocol::encoder::{DEFAULT_DUPLICATE_TOKEN, DUPLICATE_TOKEN_SIZE};
use crate::protocol::types::{RadioIdentity, MAX_REMOTES};
use crate::radio::{PaLevel, RadioSettings, RF_CHANNEL};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub radio: RadioConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default = "default_remotes")]
    pub remotes: Vec<RemoteConfig>,
}

/// Radio hardware configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_channel")]
    pub channel: u8,

    #[serde(default = "default_pa_level")]
    pub pa_level: PaLevel,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
}

/// Command scheduling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Transmissions of every command
    #[serde(default = "default_send_attempts")]
    pub send_attempts: u8,

    /// Identical frames pushed per transmission
    #[serde(default = "default_burst_repeats")]
    pub burst_repeats: u16,

    /// Minimum pause between two transmissions
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Distinct pending commands; twice the number of remotes when unset
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seed for nonces and random bytes; drawn from the OS when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Remote learning configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LearningConfig {
    /// Record only the first frame of every button press
    #[serde(default = "default_capture_first")]
    pub capture_first: bool,

    #[serde(default = "default_capture_debounce_ms")]
    pub capture_debounce_ms: u64,
}

/// Wire protocol configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolConfig {
    /// Fixed bytes carried by every duplicate frame
    #[serde(default = "default_duplicate_token")]
    pub duplicate_token: [u8; DUPLICATE_TOKEN_SIZE],
}

/// Traffic log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<String>,
}

/// One remote the bridge impersonates
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RemoteConfig {
    pub name: String,
    pub identity: RadioIdentity,
}

// Default value functions
fn default_channel() -> u8 { RF_CHANNEL }
fn default_pa_level() -> PaLevel { PaLevel::Max }
fn default_retry_interval_ms() -> u64 { 1000 }
fn default_warmup_ms() -> u64 { 20 }

fn default_send_attempts() -> u8 { 3 }
fn default_burst_repeats() -> u16 { 513 }
fn default_min_interval_ms() -> u64 { 512 / 3 }
fn default_poll_interval_ms() -> u64 { 1 }

fn default_capture_first() -> bool { true }
fn default_capture_debounce_ms() -> u64 { 50 }

fn default_duplicate_token() -> [u8; DUPLICATE_TOKEN_SIZE] { DEFAULT_DUPLICATE_TOKEN }

fn default_telemetry_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_log_level() -> String { "info".to_string() }

fn default_remotes() -> Vec<RemoteConfig> {
    [
        [0x12, 0xF0, 0x78, 0x09],
        [0x11, 0x11, 0xB9, 0x7B],
        [0x13, 0x7C, 0xBE, 0x09],
        [0x07, 0xB5, 0xCC, 0x83],
        [0x52, 0xC7, 0x75, 0xA9],
        [0x6F, 0xF1, 0xEE, 0xB7],
        [0x56, 0x13, 0x04, 0x67],
    ]
    .into_iter()
    .enumerate()
    .map(|(i, bytes)| RemoteConfig {
        name: format!("remote-{}", i + 1),
        identity: RadioIdentity::new(bytes),
    })
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radio: RadioConfig::default(),
            scheduler: SchedulerConfig::default(),
            learning: LearningConfig::default(),
            protocol: ProtocolConfig::default(),
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
            remotes: default_remotes(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            pa_level: default_pa_level(),
            retry_interval_ms: default_retry_interval_ms(),
            warmup_ms: default_warmup_ms(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            send_attempts: default_send_attempts(),
            burst_repeats: default_burst_repeats(),
            min_interval_ms: default_min_interval_ms(),
            queue_capacity: None,
            poll_interval_ms: default_poll_interval_ms(),
            seed: None,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            capture_first: default_capture_first(),
            capture_debounce_ms: default_capture_debounce_ms(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            duplicate_token: default_duplicate_token(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl RadioConfig {
    /// Hardware parameters for the transceiver
    pub fn settings(&self) -> RadioSettings {
        RadioSettings {
            channel: self.channel,
            pa_level: self.pa_level,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            warmup: Duration::from_millis(self.warmup_ms),
        }
    }
}

fn invalid(message: impl Display) -> DirectolorError {
    DirectolorError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use directolor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Identities of the configured remotes, in remote index order
    pub fn identities(&self) -> Vec<RadioIdentity> {
        self.remotes.iter().map(|remote| remote.identity).collect()
    }

    /// Pending store capacity
    pub fn queue_capacity(&self) -> usize {
        self.scheduler.queue_capacity.unwrap_or(2 * self.remotes.len())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.remotes.is_empty() || self.remotes.len() > MAX_REMOTES {
            return Err(invalid(format!(
                "between 1 and {} remotes must be configured, found {}",
                MAX_REMOTES,
                self.remotes.len()
            )));
        }

        for (i, remote) in self.remotes.iter().enumerate() {
            if remote.name.trim().is_empty() {
                return Err(invalid(format!("remote {} has an empty name", i + 1)));
            }
            if self.remotes[..i].iter().any(|other| other.identity == remote.identity) {
                return Err(invalid(format!(
                    "remote '{}' reuses identity {}",
                    remote.name, remote.identity
                )));
            }
        }

        // nRF24L01+ channels stop at 2525 MHz
        if self.radio.channel > 125 {
            return Err(invalid("radio channel must be between 0 and 125"));
        }

        if self.radio.retry_interval_ms == 0 || self.radio.retry_interval_ms > 60000 {
            return Err(invalid("retry_interval_ms must be between 1 and 60000"));
        }

        if self.radio.warmup_ms > 1000 {
            return Err(invalid("warmup_ms must be at most 1000"));
        }

        if self.scheduler.send_attempts == 0 {
            return Err(invalid("send_attempts must be greater than 0"));
        }

        if self.scheduler.burst_repeats == 0 {
            return Err(invalid("burst_repeats must be greater than 0"));
        }

        if self.scheduler.min_interval_ms > 10000 {
            return Err(invalid("min_interval_ms must be at most 10000"));
        }

        // A join or remove needs two slots at once
        if self.queue_capacity() < 2 {
            return Err(invalid("queue_capacity must be at least 2"));
        }

        if self.scheduler.poll_interval_ms == 0 || self.scheduler.poll_interval_ms > 1000 {
            return Err(invalid("poll_interval_ms must be between 1 and 1000"));
        }

        if self.learning.capture_debounce_ms > 10000 {
            return Err(invalid("capture_debounce_ms must be at most 10000"));
        }

        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.logging.level.trim().is_empty() {
            return Err(invalid("logging level cannot be empty"));
        }

        Ok(())
    }
}
