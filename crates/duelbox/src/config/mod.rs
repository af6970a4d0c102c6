use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::challenge::{Challenge, Difficulty, EntryPoint, TestCase};
use crate::types::ResourceLimits;

pub mod challenge;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file. It also
/// supplies the built-in challenge library used by [`Config::default`].
pub const EXAMPLE_CONFIG: &str = include_str!("../../duelbox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("entry point '{0}' is not a bare identifier")]
    InvalidEntryPoint(String),

    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("challenge '{0}' not found in configuration")]
    ChallengeNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for duelbox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the Python interpreter (uses PATH lookup of `python3` if not specified).
    #[serde(default)]
    pub python_path: Option<PathBuf>,

    /// Wall clock ceiling per submission in seconds, enforced by the parent.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_seconds: f64,

    /// Address-space ceiling for the sandboxed child in bytes.
    #[serde(default = "default_memory_limit")]
    pub memory_limit_bytes: u64,

    /// Submissions longer than this are rejected before parsing.
    #[serde(default = "default_max_code_length")]
    pub max_code_length_bytes: usize,

    /// Capture ceiling per output stream in bytes.
    #[serde(default = "default_max_output")]
    pub max_output_bytes: u64,

    /// Number of sandboxed child processes allowed to run at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_executions: usize,

    /// Maximum rating difference for two queued players to be paired.
    #[serde(default = "default_rating_tolerance")]
    pub rating_tolerance: i32,

    /// Queue entries older than this are swept and the player notified.
    #[serde(default = "default_queue_expiry")]
    pub queue_expiry_seconds: u64,

    /// Grace period before a disconnected player forfeits an active battle.
    #[serde(default = "default_disconnect_grace")]
    pub disconnect_grace_seconds: u64,

    /// How long a completed room stays queryable before it is purged.
    #[serde(default = "default_room_retention")]
    pub room_retention_seconds: u64,

    /// Challenge library keyed by challenge ID
    #[serde(default)]
    pub challenges: HashMap<String, Challenge>,
}

impl Config {
    /// Create a new config with the embedded default challenges
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no challenges
    pub fn empty() -> Self {
        Self {
            python_path: None,
            execution_timeout_seconds: default_execution_timeout(),
            memory_limit_bytes: default_memory_limit(),
            max_code_length_bytes: default_max_code_length(),
            max_output_bytes: default_max_output(),
            max_concurrent_executions: default_max_concurrent(),
            rating_tolerance: default_rating_tolerance(),
            queue_expiry_seconds: default_queue_expiry(),
            disconnect_grace_seconds: default_disconnect_grace(),
            room_retention_seconds: default_room_retention(),
            challenges: HashMap::new(),
        }
    }

    /// Get a challenge by ID
    pub fn get_challenge(&self, id: &str) -> Result<&Challenge, ConfigError> {
        self.challenges
            .get(id)
            .ok_or_else(|| ConfigError::ChallengeNotFound(id.to_string()))
    }

    /// Get the path to the Python interpreter
    pub fn python_binary(&self) -> PathBuf {
        self.python_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("python3"))
    }

    /// Base resource limits derived from the scalar options
    pub fn execution_limits(&self) -> ResourceLimits {
        ResourceLimits::none()
            .with_wall_time_limit(self.execution_timeout_seconds)
            .with_cpu_time_limit(self.execution_timeout_seconds.ceil())
            .with_memory_limit(self.memory_limit_bytes)
            .with_max_processes(1)
            .with_max_output(self.max_output_bytes)
            .with_max_open_files(16)
    }

    /// Effective limits for a challenge: base limits plus per-challenge overrides
    pub fn challenge_limits(&self, challenge: &Challenge) -> ResourceLimits {
        let base = self.execution_limits();
        match challenge.limits {
            Some(ref overrides) => base.with_overrides(overrides),
            None => base,
        }
    }

    /// Queue-entry lifetime before expiry sweeping
    pub fn queue_expiry(&self) -> Duration {
        Duration::from_secs(self.queue_expiry_seconds)
    }

    /// Reconnect window before a disconnected player forfeits
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_seconds)
    }

    /// Retention window for completed rooms
    pub fn room_retention(&self) -> Duration {
        Duration::from_secs(self.room_retention_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_execution_timeout() -> f64 {
    5.0
}

fn default_memory_limit() -> u64 {
    128 * ResourceLimits::MB
}

fn default_max_code_length() -> usize {
    50 * 1024
}

fn default_max_output() -> u64 {
    64 * ResourceLimits::KB
}

fn default_max_concurrent() -> usize {
    4
}

fn default_rating_tolerance() -> i32 {
    200
}

fn default_queue_expiry() -> u64 {
    300
}

fn default_disconnect_grace() -> u64 {
    30
}

fn default_room_retention() -> u64 {
    120
}
