//! # Bridge Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FARMLINK_API_KEY=...                                               │
//! │     FARMLINK_SERIAL_PORT=/dev/ttyUSB1                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path> or FARMLINK_CONFIG                                 │
//! │     else ~/.config/pi-bridge/bridge.toml (Linux)                       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # bridge.toml
//! [device]
//! name = "Harvest Room Scale"
//!
//! [uplink]
//! url = "wss://farm.example.com/ws"
//! api_key = "..."
//!
//! [scale]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! mode = "continuous"  # continuous | auto
//!
//! [scanner]
//! completion = "terminator_or_gap"  # terminator | terminator_or_gap
//! gap_ms = 300
//! capture = "exclusive"             # shared | exclusive
//!
//! [buffer]
//! max_queue_size = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use farmlink_core::{CompletionPolicy, ScaleMode, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_SCAN_GAP_MS};
use farmlink_db::DbConfig;
use farmlink_devices::{CaptureMode, ScaleSettings, ScannerSettings};
use farmlink_sync::TransportConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FARMLINK_CONFIG";

// =============================================================================
// Errors
// =============================================================================

/// Startup configuration failures. All are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("API key not configured. Set FARMLINK_API_KEY or uplink.api_key.")]
    MissingApiKey,

    #[error("Server URL must start with ws:// or wss://, got: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

/// Identity of this bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4). Generated if not provided.
    #[serde(default = "default_device_id")]
    pub id: String,

    /// Human-readable name shown in logs.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "Pi Bridge".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: default_device_id(),
            name: default_device_name(),
        }
    }
}

/// Connection to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkSettings {
    /// WebSocket URL of the service.
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Shared secret. Required.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_device_type")]
    pub device_type: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upper bound on a single frame write.
    #[serde(default = "default_emit_timeout")]
    pub emit_timeout_secs: u64,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

fn default_server_url() -> String {
    "ws://localhost:5000/ws".to_string()
}

fn default_device_type() -> String {
    "pi".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_emit_timeout() -> u64 {
    10
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    30
}

fn default_ping_interval() -> u64 {
    25
}

impl Default for UplinkSettings {
    fn default() -> Self {
        UplinkSettings {
            url: default_server_url(),
            api_key: String::new(),
            device_type: default_device_type(),
            connect_timeout_secs: default_connect_timeout(),
            emit_timeout_secs: default_emit_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

/// Replay of queued scans after reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushSettings {
    /// Pause between replayed scans.
    #[serde(default = "default_emit_delay")]
    pub emit_delay_ms: u64,
}

fn default_emit_delay() -> u64 {
    50
}

impl Default for FlushSettings {
    fn default() -> Self {
        FlushSettings {
            emit_delay_ms: default_emit_delay(),
        }
    }
}

/// Serial scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub mode: ScaleMode,

    /// Pause between read cycles.
    #[serde(default = "default_read_interval")]
    pub read_interval_ms: u64,

    /// Wait for one line per read attempt.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_stale_backlog")]
    pub stale_backlog_bytes: usize,

    #[serde(default = "default_immediate_poll_interval")]
    pub immediate_poll_interval_ms: u64,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_scale_reconnect_attempts")]
    pub reconnect_attempts: u32,

    #[serde(default = "default_scale_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_interval() -> u64 {
    50
}

fn default_read_timeout() -> u64 {
    100
}

fn default_stale_backlog() -> usize {
    100
}

fn default_immediate_poll_interval() -> u64 {
    500
}

fn default_settle_delay() -> u64 {
    500
}

fn default_scale_reconnect_attempts() -> u32 {
    5
}

fn default_scale_reconnect_delay() -> u64 {
    2000
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            mode: ScaleMode::default(),
            read_interval_ms: default_read_interval(),
            read_timeout_ms: default_read_timeout(),
            stale_backlog_bytes: default_stale_backlog(),
            immediate_poll_interval_ms: default_immediate_poll_interval(),
            settle_delay_ms: default_settle_delay(),
            reconnect_attempts: default_scale_reconnect_attempts(),
            reconnect_delay_ms: default_scale_reconnect_delay(),
        }
    }
}

/// How a scan is considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    #[default]
    Terminator,
    TerminatorOrGap,
}

/// Keyboard-wedge barcode scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fixed device node. Discovered by name when unset.
    #[serde(default)]
    pub device_path: Option<String>,

    #[serde(default = "default_name_filter")]
    pub name_filter: String,

    #[serde(default)]
    pub capture: CaptureMode,

    #[serde(default)]
    pub completion: CompletionKind,

    /// Inter-character silence that completes a scan (gap policy only).
    #[serde(default = "default_gap")]
    pub gap_ms: u64,

    /// Wait per read before the loop checks in.
    #[serde(default = "default_scanner_read_timeout")]
    pub read_timeout_secs: u64,

    /// Deliver buffered characters when a read times out mid-scan.
    #[serde(default = "default_true")]
    pub flush_partial_on_timeout: bool,

    #[serde(default = "default_scanner_reconnect_attempts")]
    pub reconnect_attempts: u32,

    #[serde(default = "default_scanner_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_name_filter() -> String {
    "Honeywell".to_string()
}

fn default_gap() -> u64 {
    DEFAULT_SCAN_GAP_MS
}

fn default_scanner_read_timeout() -> u64 {
    5
}

fn default_scanner_reconnect_attempts() -> u32 {
    5
}

fn default_scanner_reconnect_delay() -> u64 {
    5000
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            enabled: true,
            device_path: None,
            name_filter: default_name_filter(),
            capture: CaptureMode::default(),
            completion: CompletionKind::default(),
            gap_ms: default_gap(),
            read_timeout_secs: default_scanner_read_timeout(),
            flush_partial_on_timeout: true,
            reconnect_attempts: default_scanner_reconnect_attempts(),
            reconnect_delay_ms: default_scanner_reconnect_delay(),
        }
    }
}

/// Durable scan queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferSettings {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: u32,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "farmlink", "pi-bridge")
        .map(|dirs| dirs.data_dir().join("queue.db"))
        .unwrap_or_else(|| PathBuf::from("farmlink-queue.db"))
}

fn default_max_queue_size() -> u32 {
    DEFAULT_MAX_QUEUE_SIZE
}

impl Default for BufferSettings {
    fn default() -> Self {
        BufferSettings {
            database_path: default_database_path(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

/// Periodic `scale:debug` diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "default_telemetry_interval")]
    pub interval_secs: u64,
}

fn default_telemetry_interval() -> u64 {
    5
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        TelemetrySettings {
            interval_secs: default_telemetry_interval(),
        }
    }
}

// =============================================================================
// Bridge Configuration
// =============================================================================

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub uplink: UplinkSettings,

    #[serde(default)]
    pub flush: FlushSettings,

    #[serde(default)]
    pub scale: ScaleConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub buffer: BufferSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl BridgeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (bridge.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(config_path) {
            Some(path) if path.exists() => {
                info!(?path, "Loading bridge config from file");
                Self::from_file(&path)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uplink.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let url = &self.uplink.url;
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(ConfigError::InvalidUrl(url.clone()));
        }

        if self.scale.baud_rate == 0 {
            return Err(ConfigError::Invalid("scale.baud_rate must be greater than 0".into()));
        }

        if self.buffer.max_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "buffer.max_queue_size must be greater than 0".into(),
            ));
        }

        if self.scanner.gap_ms == 0 {
            return Err(ConfigError::Invalid("scanner.gap_ms must be greater than 0".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(id) = var("FARMLINK_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(url) = var("FARMLINK_SERVER_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.uplink.url = url;
        }

        if let Some(key) = var("FARMLINK_API_KEY") {
            self.uplink.api_key = key;
        }

        if let Some(port) = var("FARMLINK_SERIAL_PORT") {
            debug!(port = %port, "Overriding serial port from environment");
            self.scale.port = port;
        }

        if let Some(baud) = var("FARMLINK_BAUD_RATE") {
            match baud.parse::<u32>() {
                Ok(b) => self.scale.baud_rate = b,
                Err(_) => warn!(value = %baud, "Ignoring invalid FARMLINK_BAUD_RATE"),
            }
        }

        if let Some(interval) = var("FARMLINK_READ_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => self.scale.read_interval_ms = ms,
                Err(_) => warn!(value = %interval, "Ignoring invalid FARMLINK_READ_INTERVAL_MS"),
            }
        }

        if let Some(mode) = var("FARMLINK_SCALE_MODE") {
            match mode.parse::<ScaleMode>() {
                Ok(parsed) => {
                    debug!(mode = %parsed, "Overriding scale mode from environment");
                    self.scale.mode = parsed;
                }
                Err(e) => warn!(error = %e, "Ignoring FARMLINK_SCALE_MODE"),
            }
        }

        if let Some(path) = var("FARMLINK_BARCODE_DEVICE") {
            // Empty means auto-detect
            self.scanner.device_path = Some(path).filter(|p| !p.is_empty());
        }

        if let Some(path) = var("FARMLINK_DB_PATH") {
            self.buffer.database_path = PathBuf::from(path);
        }
    }

    // =========================================================================
    // Component Settings
    // =========================================================================

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            url: self.uplink.url.clone(),
            api_key: self.uplink.api_key.clone(),
            device_type: self.uplink.device_type.clone(),
            device_id: self.device.id.clone(),
            connect_timeout: Duration::from_secs(self.uplink.connect_timeout_secs),
            emit_timeout: Duration::from_secs(self.uplink.emit_timeout_secs),
            initial_backoff: Duration::from_millis(self.uplink.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.uplink.max_backoff_secs),
            ping_interval: Duration::from_secs(self.uplink.ping_interval_secs),
        }
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.buffer.database_path.clone()).max_queue_size(self.buffer.max_queue_size)
    }

    pub fn scale_settings(&self) -> ScaleSettings {
        ScaleSettings {
            port: self.scale.port.clone(),
            baud_rate: self.scale.baud_rate,
            mode: self.scale.mode,
            read_timeout: Duration::from_millis(self.scale.read_timeout_ms),
            settle_delay: Duration::from_millis(self.scale.settle_delay_ms),
            stale_backlog_bytes: self.scale.stale_backlog_bytes,
            immediate_poll_interval: Duration::from_millis(self.scale.immediate_poll_interval_ms),
            reconnect_attempts: self.scale.reconnect_attempts,
            reconnect_delay: Duration::from_millis(self.scale.reconnect_delay_ms),
            ..ScaleSettings::default()
        }
    }

    pub fn scanner_settings(&self) -> ScannerSettings {
        ScannerSettings {
            name_filter: self.scanner.name_filter.clone(),
            capture: self.scanner.capture,
            ..ScannerSettings::default()
        }
    }

    pub fn completion_policy(&self) -> Result<CompletionPolicy, ConfigError> {
        match self.scanner.completion {
            CompletionKind::Terminator => Ok(CompletionPolicy::Terminator),
            CompletionKind::TerminatorOrGap => {
                CompletionPolicy::terminator_or_gap(Duration::from_millis(self.scanner.gap_ms))
                    .map_err(|e| ConfigError::Invalid(e.to_string()))
            }
        }
    }
}

/// Picks the config file: explicit path, then `FARMLINK_CONFIG`, then the
/// platform config directory.
fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(|| {
            directories::ProjectDirs::from("com", "farmlink", "pi-bridge")
                .map(|dirs| dirs.config_dir().join("bridge.toml"))
        })
}
