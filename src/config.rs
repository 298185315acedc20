use crate::call::state::DisconnectPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// ICE server entry (STUN or TURN)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Configuration file format for call settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallConfigFile {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub media: MediaSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    /// How long a dropped connection may try to recover (in seconds, 0 = fail at once)
    #[serde(default = "default_reconnect_window_secs")]
    pub reconnect_window_secs: u64,
    /// Auto-decline an unanswered incoming call after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_timeout_secs: Option<u64>,
    /// Countdown tick (in milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,
    /// Artificial negotiation delay of the loopback transport (in milliseconds)
    #[serde(default = "default_negotiation_delay_ms")]
    pub negotiation_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSection {
    #[serde(default = "default_true")]
    pub video_enabled_on_start: bool,
    #[serde(default = "default_true")]
    pub audio_enabled_on_start: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_reconnect_window_secs() -> u64 { 10 }
fn default_tick_interval_ms() -> u64 { 1000 }
fn default_negotiation_delay_ms() -> u64 { 1000 }
fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig::stun("stun:stun.l.google.com:19302"),
        IceServerConfig::stun("stun:stun1.l.google.com:19302"),
    ]
}

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            reconnect_window_secs: default_reconnect_window_secs(),
            admission_timeout_secs: None,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            negotiation_delay_ms: default_negotiation_delay_ms(),
        }
    }
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            video_enabled_on_start: true,
            audio_enabled_on_start: true,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for CallConfigFile {
    fn default() -> Self {
        Self {
            session: SessionSection::default(),
            transport: TransportSection::default(),
            media: MediaSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl CallConfigFile {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: CallConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: CallConfigFile = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// `<config dir>/coachcall/coachcall.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("coachcall").join("coachcall.toml"))
    }

    /// Load `path` if given, otherwise the default location if it exists,
    /// otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                log::debug!("Loading configuration from {}", path.display());
                Self::load_from_file(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Write the default configuration to `path`
    pub fn init<P: AsRef<Path>>(path: P, force: bool) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        Self::default().save_to_file(path)
    }

    /// Validate the configuration, reporting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.session.tick_interval_ms == 0 {
            errors.push("Tick interval must be greater than 0".to_string());
        }

        if self.session.admission_timeout_secs == Some(0) {
            errors.push("Admission timeout must be greater than 0 when set".to_string());
        }

        if self.transport.ice_servers.is_empty() {
            errors.push("At least one ICE server must be configured".to_string());
        }

        for (index, server) in self.transport.ice_servers.iter().enumerate() {
            if server.urls.is_empty() {
                errors.push(format!("ICE server {} has no URLs", index));
            }
            for url in &server.urls {
                let is_turn = url.starts_with("turn:") || url.starts_with("turns:");
                if !url.starts_with("stun:") && !url.starts_with("stuns:") && !is_turn {
                    errors.push(format!("ICE server URL '{}' must use stun: or turn:", url));
                }
                if is_turn && (server.username.is_none() || server.credential.is_none()) {
                    errors.push(format!("TURN server '{}' requires username and credential", url));
                }
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            errors.push(format!("Unknown log level '{}'", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Convert to the runtime CallConfig format
    pub fn to_call_config(&self) -> CallConfig {
        CallConfig {
            ice_servers: self.transport.ice_servers.clone(),
            disconnect_policy: DisconnectPolicy::from_window(Duration::from_secs(
                self.session.reconnect_window_secs,
            )),
            admission_timeout: self.session.admission_timeout_secs.map(Duration::from_secs),
            tick_interval: Duration::from_millis(self.session.tick_interval_ms),
            negotiation_delay: Duration::from_millis(self.transport.negotiation_delay_ms),
            video_enabled_on_start: self.media.video_enabled_on_start,
            audio_enabled_on_start: self.media.audio_enabled_on_start,
        }
    }

    /// Generate a sample configuration file content
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| "# Failed to generate sample configuration".to_string())
    }
}

/// Runtime settings for the session connection manager
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    pub ice_servers: Vec<IceServerConfig>,
    pub disconnect_policy: DisconnectPolicy,
    pub admission_timeout: Option<Duration>,
    pub tick_interval: Duration,
    pub negotiation_delay: Duration,
    pub video_enabled_on_start: bool,
    pub audio_enabled_on_start: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        CallConfigFile::default().to_call_config()
    }
}

impl CallConfig {
    pub fn with_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = Some(timeout);
        self
    }
}
