//! Engine configuration.
//!
//! Values come from an optional TOML file and are then overlaid with
//! `RIA_*` environment variables, which take precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::RiaResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiaConfig {
    /// Scratch directory used when a caller does not name one.
    pub temp_dir: PathBuf,
    /// Longest result an entry may return (a 512-byte buffer with terminator).
    pub max_result_bytes: usize,
    /// Instruction budget for one execute.
    pub max_steps: u64,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for RiaConfig {
    fn default() -> Self {
        RiaConfig {
            temp_dir: std::env::temp_dir(),
            max_result_bytes: 511,
            max_steps: 1_000_000,
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_secs: 30,
            user_agent: format!("ria/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 5,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RiaConfig {
    /// Load from `path` if given, then apply the environment overlay.
    pub fn load(path: Option<&Path>) -> RiaResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => RiaConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> RiaResult<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> RiaResult<Self> {
        let config: RiaConfig = toml::from_str(s).context("parsing config")?;
        Ok(config)
    }

    /// Overlay values from a variable lookup (the process environment in practice).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> RiaResult<()> {
        if let Some(dir) = lookup("RIA_TEMP_DIR") {
            self.temp_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("RIA_HTTP_TIMEOUT") {
            self.http.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("RIA_HTTP_TIMEOUT is not a number: {secs}"))?;
        }
        if let Some(agent) = lookup("RIA_USER_AGENT") {
            self.http.user_agent = agent;
        }
        Ok(())
    }
}
