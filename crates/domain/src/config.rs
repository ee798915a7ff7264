//! Runtime configuration, loaded from `agentwire.toml`.
//!
//! Every field has a default so an empty (or absent) file yields a
//! working dev configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub sse: SseConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8080")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Env var holding the API bearer token. Unset or empty env var means
    /// open access (dev mode).
    #[serde(default = "d_token_env")]
    pub api_token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".into(),
            api_token_env: d_token_env(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event buffer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Per-session cap on retained events; FIFO eviction beyond this.
    #[serde(default = "d_1000")]
    pub max_size: usize,
    /// Per-event retention in milliseconds.
    #[serde(default = "d_3_600_000")]
    pub ttl_ms: u64,
    /// Interval of the background expiry sweep, milliseconds.
    #[serde(default = "d_60_000")]
    pub cleanup_interval_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl_ms: 3_600_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl BufferConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    /// Heartbeat comment interval in milliseconds; 0 disables heartbeats.
    #[serde(default = "d_15_000")]
    pub heartbeat_interval_ms: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 15_000,
        }
    }
}

impl SseConfig {
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// When true (default), subscriptions filter out `internal:` events
    /// unless they explicitly opt in.
    #[serde(default = "d_true")]
    pub default_filter_internal: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_filter_internal: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle sessions are reclaimed after this many milliseconds.
    #[serde(default = "d_1_800_000")]
    pub idle_ttl_ms: u64,
    /// Bounded queue depth per subscriber; a full queue drops the
    /// subscriber rather than blocking producers.
    #[serde(default = "d_256")]
    pub subscriber_queue_cap: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_ms: 1_800_000,
            subscriber_queue_cap: 256,
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_ttl_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.buffer.max_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "buffer.max_size".into(),
                message: "buffer must retain at least one event".into(),
            });
        }

        if self.buffer.ttl_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "buffer.ttl_ms".into(),
                message: "zero TTL expires events immediately; replay will never work".into(),
            });
        }

        if self.session.subscriber_queue_cap == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session.subscriber_queue_cap".into(),
                message: "subscriber queue capacity must be at least 1".into(),
            });
        }

        if self.sse.heartbeat_interval_ms > 0 && self.sse.heartbeat_interval_ms < 1_000 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "sse.heartbeat_interval_ms".into(),
                message: "sub-second heartbeats waste bandwidth".into(),
            });
        }

        errors
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8080() -> u16 {
    8080
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_token_env() -> String {
    "AGENTWIRE_API_TOKEN".into()
}
fn d_1000() -> usize {
    1000
}
fn d_256() -> usize {
    256
}
fn d_true() -> bool {
    true
}
fn d_15_000() -> u64 {
    15_000
}
fn d_60_000() -> u64 {
    60_000
}
fn d_3_600_000() -> u64 {
    3_600_000
}
fn d_1_800_000() -> u64 {
    1_800_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
