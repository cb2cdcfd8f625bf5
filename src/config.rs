//! # Configuration Module
//!
//! Servant is configured by a single YAML document, loaded once at startup and
//! shared read-only (behind an `Arc`) by the server and every session.
//!
//! ## Example
//!
//! ```yaml
//! server:
//!   listen: ":2465"            # or "127.0.0.1:2465", "localhost:2465"
//! log: /var/log/servant.log
//! params:
//!   backup_dir: /srv/backup
//! users:
//!   ops:
//!     key: s3cret
//!     allow:
//!       - commands/sys/*
//!       - files
//! commands:
//!   sys:
//!     restart:
//!       code: "systemctl restart \"${service}\""
//!       methods: [POST]
//!       timeout_secs: 30
//! files:
//!   logs:
//!     nginx:
//!       root: /var/log/nginx
//! daemons:
//!   heartbeat:
//!     code: "exec /usr/local/bin/heartbeat"
//!     retry_delay_secs: 5
//! timers:
//!   cleanup:
//!     code: "find ${backup_dir} -mtime +7 -delete"
//!     interval_secs: 3600
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Listen address used when the configuration does not name one.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:2465";

/// Parsed servant configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    /// Optional log file; stdout is used when absent or when it cannot be opened
    pub log: Option<PathBuf>,
    /// Global parameters resolvable through `${name}` placeholders
    pub params: HashMap<String, String>,
    pub users: HashMap<String, UserConfig>,
    /// `commands.<group>.<item>`
    pub commands: HashMap<String, HashMap<String, CommandConfig>>,
    /// `files.<group>.<item>`
    pub files: HashMap<String, HashMap<String, FileConfig>>,
    pub daemons: HashMap<String, DaemonConfig>,
    pub timers: HashMap<String, TimerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

/// A caller allowed to use the server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Shared secret; when absent the user name alone authenticates
    pub key: Option<String>,
    /// Permission patterns `resource[/group[/item]]`, each segment may be `*`
    pub allow: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Shell code run with `sh -c`, placeholders resolved per request
    pub code: String,
    /// Accepted request methods
    #[serde(default = "default_command_methods")]
    pub methods: Vec<String>,
    /// Kill the command and answer 504 when it runs longer than this
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_command_methods() -> Vec<String> {
    vec!["GET".to_string(), "POST".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub writable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub code: String,
    /// Pause before the daemon is started again after it exits
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_retry_delay() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    pub code: String,
    pub interval_secs: u64,
}

/// Configuration loading failure. Always fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read
    Io { path: PathBuf, source: io::Error },
    /// The document is not valid YAML for [`Config`]
    Parse(serde_yaml::Error),
    /// `server.listen` does not resolve to a socket address
    InvalidListen { listen: String },
    /// A timer with a zero interval would spin
    ZeroInterval { timer: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "invalid config: {e}"),
            ConfigError::InvalidListen { listen } => {
                write!(f, "invalid listen address '{listen}'")
            }
            ConfigError::ZeroInterval { timer } => {
                write!(f, "timer '{timer}' has a zero interval")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl Config {
    /// Load and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if let Some((name, _)) = self.timers.iter().find(|(_, t)| t.interval_secs == 0) {
            return Err(ConfigError::ZeroInterval {
                timer: name.clone(),
            });
        }
        Ok(())
    }

    /// `server.listen` resolved to a socket address.
    ///
    /// Accepts `ip:port`, `host:port` and a bare `:port`, which listens on
    /// all interfaces.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let listen = self.server.listen.trim();
        let target = match listen.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => listen.to_string(),
        };
        target
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::InvalidListen {
                listen: self.server.listen.clone(),
            })
    }

    #[must_use]
    pub fn command(&self, group: &str, item: &str) -> Option<&CommandConfig> {
        self.commands.get(group).and_then(|g| g.get(item))
    }

    #[must_use]
    pub fn file(&self, group: &str, item: &str) -> Option<&FileConfig> {
        self.files.get(group).and_then(|g| g.get(item))
    }
}
