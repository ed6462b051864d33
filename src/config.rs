//! Cache configuration.
//!
//! ```toml
//! policy = "LIRS"
//! capacity = 1000
//! fifo_queue_size = 100     # > 0 puts a FIFO queue in front of the policy
//! lir_set_size = 800        # LIRS only, must stay below capacity - fifo_queue_size
//! protected_mrus = 4
//! penalty_factor = 0.5
//! result_path = "results"
//! ```
//!
//! Every field has a default, so a file only needs the settings it changes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Policy kind
// ---------------------------------------------------------------------------

/// Replacement policy selected by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    #[serde(rename = "unlimited")]
    Unlimited,
    #[default]
    #[serde(rename = "LRU")]
    Lru,
    #[serde(rename = "ARC")]
    Arc,
    #[serde(rename = "LIRS")]
    Lirs,
    /// Basic cost-aware LRU.
    #[serde(rename = "BCL")]
    Bcl,
    /// Dynamic cost-aware LRU.
    #[serde(rename = "DCL")]
    Dcl,
    /// Partition-aware LRU.
    #[serde(rename = "PLRU")]
    Plru,
    #[serde(rename = "PBCL")]
    Pbcl,
    #[serde(rename = "PDCL")]
    Pdcl,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 9] = [
        PolicyKind::Unlimited,
        PolicyKind::Lru,
        PolicyKind::Arc,
        PolicyKind::Lirs,
        PolicyKind::Bcl,
        PolicyKind::Dcl,
        PolicyKind::Plru,
        PolicyKind::Pbcl,
        PolicyKind::Pdcl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlimited => "unlimited",
            Self::Lru => "LRU",
            Self::Arc => "ARC",
            Self::Lirs => "LIRS",
            Self::Bcl => "BCL",
            Self::Dcl => "DCL",
            Self::Plru => "PLRU",
            Self::Pbcl => "PBCL",
            Self::Pdcl => "PDCL",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::new(format!("unknown cache policy `{s}`")))
    }
}

// ---------------------------------------------------------------------------
// Cache config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub policy: PolicyKind,
    /// Total number of resident entries, FIFO queue included.
    pub capacity: usize,
    /// Size of the FIFO pre-admission queue; 0 disables it.
    pub fifo_queue_size: usize,
    pub lir_set_size: usize,
    /// Most recently used entries the cost policies never pick as cheap victims.
    pub protected_mrus: usize,
    /// Cost multiplier applied to invalidated partition members.
    pub penalty_factor: f64,
    /// Directory enumerated at warm start.
    pub result_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Lru,
            capacity: 1024,
            fifo_queue_size: 0,
            lir_set_size: 0,
            protected_mrus: 1,
            penalty_factor: 0.5,
            result_path: PathBuf::from("results"),
        }
    }
}

impl CacheConfig {
    pub fn new(policy: PolicyKind, capacity: usize) -> Self {
        Self {
            policy,
            capacity,
            ..Self::default()
        }
    }

    /// Capacity left for the policy once the FIFO queue is taken out.
    pub fn embedded_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.fifo_queue_size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::new("capacity must be > 0"));
        }
        if self.fifo_queue_size >= self.capacity {
            return Err(ConfigError::new(format!(
                "fifo_queue_size must be < capacity ({} >= {})",
                self.fifo_queue_size, self.capacity
            )));
        }
        let embedded = self.embedded_capacity();
        if self.policy == PolicyKind::Lirs {
            if self.lir_set_size == 0 {
                return Err(ConfigError::new("LIRS: lir_set_size must be > 0"));
            }
            if self.lir_set_size >= embedded {
                return Err(ConfigError::new(format!(
                    "LIRS: lir_set_size must be < embedded capacity ({} >= {embedded})",
                    self.lir_set_size
                )));
            }
        }
        if self.protected_mrus == 0 {
            return Err(ConfigError::new("protected_mrus must be > 0"));
        }
        if self.protected_mrus > embedded {
            return Err(ConfigError::new(format!(
                "protected_mrus must be <= embedded capacity ({} > {embedded})",
                self.protected_mrus
            )));
        }
        if !(0.0..=1.0).contains(&self.penalty_factor) {
            return Err(ConfigError::new(format!(
                "penalty_factor must be in [0.0, 1.0], got {}",
                self.penalty_factor
            )));
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)
            .map_err(|err| ConfigError::new(format!("invalid cache config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::new(format!("failed to read config file {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}
