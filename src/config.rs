//! # Console Configuration
//!
//! Everything the console needs at startup lives in one TOML file. Every field
//! has a default, so an empty file (or no file) yields a working setup against a
//! robot API on `localhost:5000`.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! log_level = "debug"
//!
//! [transport]
//! mode = "auto"
//! probe_timeout_ms = 800
//!
//! [playback]
//! step_rate_hz = 30.0
//! speed_warning_deg_s = 90.0
//!
//! [playback.neutral]
//! r_elbow_pitch = -20.0
//!
//! [limits.neck_yaw]
//! min = -30.0
//! max = 30.0
//! ```

// src/config.rs - Single configuration file
use crate::joints::{JointName, Pose};
use crate::kinematics::{JointLimit, KinematicTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the console.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-joint overrides of the stock constraint table.
    #[serde(default)]
    pub limits: BTreeMap<String, JointLimit>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            robot: RobotConfig::default(),
            proxy: ProxyConfig::default(),
            transport: TransportConfig::default(),
            feed: FeedConfig::default(),
            recorder: RecorderConfig::default(),
            playback: PlaybackConfig::default(),
            storage: StorageConfig::default(),
            limits: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen: default_listen() }
    }
}

/// Direct robot HTTP API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Local WebSocket relay used when the robot API is unreachable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_url")]
    pub url: String,
    #[serde(default = "default_deadband_deg")]
    pub deadband_deg: f64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_origin")]
    pub origin: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            url: default_proxy_url(),
            deadband_deg: default_deadband_deg(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            origin: default_origin(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Probe the robot API once, fall back to the proxy.
    #[default]
    Auto,
    Http,
    Proxy,
    Sim,
}

impl std::str::FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(TransportMode::Auto),
            "http" => Ok(TransportMode::Http),
            "proxy" => Ok(TransportMode::Proxy),
            "sim" => Ok(TransportMode::Sim),
            other => Err(ConfigError::Invalid(format!("unknown transport mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { poll_interval_ms: default_poll_interval_ms() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecorderConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { sample_interval_ms: default_sample_interval_ms() }
    }
}

/// Macro playback timing and safety settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Current pose -> neutral, and last frame -> neutral.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Neutral -> first frame.
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,
    #[serde(default = "default_step_rate_hz")]
    pub step_rate_hz: f64,
    /// Segment delay used when timestamps are missing or not increasing.
    #[serde(default = "default_fallback_delay_ms")]
    pub fallback_delay_ms: u64,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_speed_warning")]
    pub speed_warning_deg_s: f64,
    /// Stretch segments that exceed `max_speed_deg_s` instead of only warning.
    #[serde(default)]
    pub limit_speed: bool,
    #[serde(default = "default_max_speed")]
    pub max_speed_deg_s: f64,
    #[serde(default)]
    pub neutral: BTreeMap<String, f64>,
    /// How long a finished or cancelled run waits for the robot to take its
    /// last pose before the transmitter is abandoned.
    #[serde(default = "default_transmit_grace_ms")]
    pub transmit_grace_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            start_ms: default_start_ms(),
            step_rate_hz: default_step_rate_hz(),
            fallback_delay_ms: default_fallback_delay_ms(),
            min_delay_ms: default_min_delay_ms(),
            speed_warning_deg_s: default_speed_warning(),
            limit_speed: false,
            max_speed_deg_s: default_max_speed(),
            neutral: BTreeMap::new(),
            transmit_grace_ms: default_transmit_grace_ms(),
        }
    }
}

impl PlaybackConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn transmit_grace(&self) -> Duration {
        Duration::from_millis(self.transmit_grace_ms)
    }

    /// Every joint at 0° unless overridden, clamped to the table.
    pub fn neutral_pose(&self, table: &KinematicTable) -> Result<Pose, ConfigError> {
        let mut pose = Pose::uniform(0.0);
        for (name, angle) in &self.neutral {
            let joint = parse_joint(name)?;
            pose.insert(joint, *angle);
        }
        Ok(table.clamp_pose(&pose))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: String,
    #[serde(default = "default_storage_key")]
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            key: default_storage_key(),
        }
    }
}

impl Config {
    /// Stock table with the `[limits]` overrides applied.
    pub fn kinematic_table(&self) -> Result<KinematicTable, ConfigError> {
        let mut table = KinematicTable::reachy();
        for (name, limit) in &self.limits {
            table = table.with_limit(parse_joint(name)?, *limit);
        }
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, limit) in &self.limits {
            parse_joint(name)?;
            if !(limit.min <= limit.max) {
                return Err(ConfigError::Invalid(format!(
                    "limit for '{}' has min {} above max {}",
                    name, limit.min, limit.max
                )));
            }
        }
        for name in self.playback.neutral.keys() {
            parse_joint(name)?;
        }
        if !(self.playback.step_rate_hz > 0.0) {
            return Err(ConfigError::Invalid("playback.step_rate_hz must be > 0".to_string()));
        }
        if self.playback.limit_speed && !(self.playback.max_speed_deg_s > 0.0) {
            return Err(ConfigError::Invalid(
                "playback.max_speed_deg_s must be > 0 when limit_speed is set".to_string(),
            ));
        }
        if self.feed.poll_interval_ms == 0 || self.recorder.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll and sample intervals must be > 0".to_string()));
        }
        if self.proxy.deadband_deg < 0.0 {
            return Err(ConfigError::Invalid("proxy.deadband_deg must be >= 0".to_string()));
        }
        if self.storage.key.is_empty() {
            return Err(ConfigError::Invalid("storage.key cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_joint(name: &str) -> Result<JointName, ConfigError> {
    name.parse()
        .map_err(|e: crate::joints::UnknownJoint| ConfigError::Invalid(e.to_string()))
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_listen() -> String { "127.0.0.1:8080".to_string() }
fn default_base_url() -> String { "http://localhost:5000".to_string() }
fn default_request_timeout_ms() -> u64 { 5000 }
fn default_proxy_url() -> String { "ws://localhost:5001/ws".to_string() }
fn default_deadband_deg() -> f64 { 0.5 }
fn default_reconnect_delay_ms() -> u64 { 1000 }
fn default_origin() -> String { "console".to_string() }
fn default_probe_timeout_ms() -> u64 { 800 }
fn default_poll_interval_ms() -> u64 { 100 }
fn default_sample_interval_ms() -> u64 { 1000 }
fn default_settle_ms() -> u64 { 1200 }
fn default_start_ms() -> u64 { 800 }
fn default_step_rate_hz() -> f64 { 30.0 }
fn default_fallback_delay_ms() -> u64 { 1000 }
fn default_min_delay_ms() -> u64 { 50 }
fn default_speed_warning() -> f64 { 90.0 }
fn default_max_speed() -> f64 { 60.0 }
fn default_transmit_grace_ms() -> u64 { 500 }
fn default_storage_dir() -> String { "data".to_string() }
fn default_storage_key() -> String { "reachy_macros".to_string() }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.transport.mode, TransportMode::Auto);
        assert_eq!(config.transport.probe_timeout_ms, 800);
        assert_eq!(config.feed.poll_interval_ms, 100);
        assert_eq!(config.recorder.sample_interval_ms, 1000);
        assert_eq!(config.playback.settle_ms, 1200);
        assert_eq!(config.playback.start_ms, 800);
        assert_eq!(config.playback.speed_warning_deg_s, 90.0);
        assert!(!config.playback.limit_speed);
        assert_eq!(config.storage.key, "reachy_macros");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("reachy.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "[transport]\nmode = 'proxy'\n[playback]\nstep_rate_hz = 50.0\n[limits.neck_yaw]\nmin = -30.0\nmax = 30.0"
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.transport.mode, TransportMode::Proxy);
        assert_eq!(config.playback.step_rate_hz, 50.0);
        // Defaults for missing fields
        assert_eq!(config.playback.settle_ms, 1200);
        let table = config.kinematic_table().unwrap();
        assert_eq!(table.clamp(JointName::NeckYaw, 44.0), 30.0);
        assert_eq!(table.clamp(JointName::NeckPitch, 44.0), 25.0);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_unknown_joint_in_limits_is_rejected() {
        let config: Config = toml::from_str("[limits.tail]\nmin = 0.0\nmax = 1.0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_inverted_limit_is_rejected() {
        let config: Config = toml::from_str("[limits.neck_yaw]\nmin = 10.0\nmax = -10.0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_neutral_pose_overrides_and_clamps() {
        let config: Config =
            toml::from_str("[playback.neutral]\nr_elbow_pitch = -20.0\nneck_roll = 99.0").unwrap();
        let table = config.kinematic_table().unwrap();
        let neutral = config.playback.neutral_pose(&table).unwrap();
        assert_eq!(neutral.len(), JointName::ALL.len());
        assert_eq!(neutral.get(JointName::RElbowPitch), Some(-20.0));
        assert_eq!(neutral.get(JointName::NeckRoll), Some(20.0));
        assert_eq!(neutral.get(JointName::LGripper), Some(0.0));
    }

    #[test]
    fn test_transport_mode_from_str() {
        assert_eq!("sim".parse::<TransportMode>().unwrap(), TransportMode::Sim);
        assert!("carrier-pigeon".parse::<TransportMode>().is_err());
    }
}
