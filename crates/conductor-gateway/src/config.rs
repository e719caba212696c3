//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use conductor_guard::sanitize::DEFAULT_AGENT_EXECUTABLE;
use conductor_guard::ResolverConfig;

use crate::{GatewayError, DEFAULT_HOST, DEFAULT_PORT};

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Directory holding one subdirectory per project
    pub projects_root: PathBuf,

    /// Agent CLI placed at argv[0] of every agent command
    pub agent_executable: String,

    /// Admission gate configuration
    pub rate_limit: RateLimitConfig,

    /// Review arbitration configuration
    pub resolver: ResolverConfig,

    /// Safety event bus buffer size
    pub event_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            projects_root: PathBuf::from("projects"),
            agent_executable: DEFAULT_AGENT_EXECUTABLE.to_string(),
            rate_limit: RateLimitConfig::default(),
            resolver: ResolverConfig::default(),
            event_capacity: 256,
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_projects_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.projects_root = root.into();
        self
    }

    pub fn with_agent_executable(mut self, executable: impl Into<String>) -> Self {
        self.agent_executable = executable.into();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GatewayError::InvalidConfig(format!("{}:{}: {}", self.host, self.port, e)))
    }

    /// Load configuration from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            other => {
                return Err(GatewayError::InvalidConfig(format!(
                    "unsupported config format: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };

        tracing::debug!(path = %path.display(), "loaded gateway configuration");
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Per-route limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathLimits {
    pub requests_per_minute: u32,
    pub requests_per_second: u32,
}

impl PathLimits {
    pub fn new(requests_per_minute: u32, requests_per_second: u32) -> Self {
        Self {
            requests_per_minute,
            requests_per_second,
        }
    }
}

/// Admission gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_second: u32,
    pub enabled: bool,

    /// Tighter limits for expensive routes, keyed by path or path prefix
    pub path_overrides: BTreeMap<String, PathLimits>,

    /// Paths that bypass the gate entirely
    pub exempt_paths: BTreeSet<String>,

    /// Idle clients are purged once this many are tracked
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let path_overrides = [
            ("/api/chat".to_string(), PathLimits::new(10, 2)),
            ("/api/chat/command".to_string(), PathLimits::new(10, 2)),
        ]
        .into_iter()
        .collect();

        let exempt_paths = ["/health"].iter().map(|p| p.to_string()).collect();

        Self {
            requests_per_minute: 60,
            requests_per_second: 10,
            enabled: true,
            path_overrides,
            exempt_paths,
            max_tracked_clients: 10_000,
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, requests_per_minute: u32, requests_per_second: u32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self.requests_per_second = requests_per_second;
        self
    }

    pub fn with_override(mut self, path: impl Into<String>, limits: PathLimits) -> Self {
        self.path_overrides.insert(path.into(), limits);
        self
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }
}
