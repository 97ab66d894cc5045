//! Configuration types consumed, not owned, by the session client.
//!
//! The surrounding CLI/UI decides the values — a short deadline for probing
//! availability, a long one for a full research run — and hands them in.
//! Nothing here reads files or the environment; these are plain serde types
//! with per-field defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
/// Default keepalive ping interval in milliseconds.
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 30_000;
/// Default job deadline in milliseconds.
pub const DEFAULT_JOB_DEADLINE_MS: u64 = 300_000;
/// Default reconnect attempt cap.
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 1;
/// Default reconnect base delay in milliseconds.
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
/// Default reconnect delay cap in milliseconds.
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;
/// Default container runtime poll attempt cap.
pub const DEFAULT_RUNTIME_ATTEMPTS: u32 = 30;
/// Default container runtime poll interval in milliseconds.
pub const DEFAULT_RUNTIME_POLL_INTERVAL_MS: u64 = 2_000;
/// Default per-service liveness probe attempt cap.
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 15;
/// Default per-service liveness probe interval in milliseconds.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 2_000;

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
fn default_keepalive_interval_ms() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL_MS
}
fn default_job_deadline_ms() -> u64 {
    DEFAULT_JOB_DEADLINE_MS
}
fn default_reconnect_max_attempts() -> u32 {
    DEFAULT_RECONNECT_MAX_ATTEMPTS
}
fn default_reconnect_base_delay_ms() -> u64 {
    DEFAULT_RECONNECT_BASE_DELAY_MS
}
fn default_reconnect_max_delay_ms() -> u64 {
    DEFAULT_RECONNECT_MAX_DELAY_MS
}
fn default_runtime_start_command() -> Vec<String> {
    vec!["open".into(), "-a".into(), "Docker".into()]
}
fn default_runtime_attempts() -> u32 {
    DEFAULT_RUNTIME_ATTEMPTS
}
fn default_runtime_poll_interval_ms() -> u64 {
    DEFAULT_RUNTIME_POLL_INTERVAL_MS
}
fn default_probe_attempts() -> u32 {
    DEFAULT_PROBE_ATTEMPTS
}
fn default_probe_interval_ms() -> u64 {
    DEFAULT_PROBE_INTERVAL_MS
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Connection and job timing for one session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// WebSocket endpoint of the research service.
    pub url: String,
    /// Connect timeout in ms (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Keepalive ping interval in ms (default: 30000).
    ///
    /// Invariant: must be shorter than the backend's idle-disconnect
    /// threshold, or the backend drops the connection between pings.
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// Job deadline in ms (default: 300000). Reset on every progress frame,
    /// so only total silence times a job out. Callers probing availability
    /// pass a much shorter value here.
    #[serde(default = "default_job_deadline_ms")]
    pub job_deadline_ms: u64,
    /// Reconnection policy parameters.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    /// Config for `url` with all defaults.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            keepalive_interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            job_deadline_ms: DEFAULT_JOB_DEADLINE_MS,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Keepalive interval as a [`Duration`].
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Job deadline as a [`Duration`].
    #[must_use]
    pub fn job_deadline(&self) -> Duration {
        Duration::from_millis(self.job_deadline_ms)
    }
}

/// Bounded reconnection parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// Maximum reconnect attempts per loss streak (default: 1).
    #[serde(default = "default_reconnect_max_attempts")]
    pub max_attempts: u32,
    /// Base delay before the first reconnect in ms (default: 1000).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Delay cap in ms (default: 30000).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provisioning
// ─────────────────────────────────────────────────────────────────────────────

/// Dependency bootstrap configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionConfig {
    /// Command that starts the container runtime when it is down
    /// (default: `open -a Docker`, the macOS Docker Desktop launcher).
    #[serde(default = "default_runtime_start_command")]
    pub runtime_start_command: Vec<String>,
    /// Runtime liveness poll attempt cap (default: 30).
    #[serde(default = "default_runtime_attempts")]
    pub runtime_attempts: u32,
    /// Runtime liveness poll interval in ms (default: 2000).
    #[serde(default = "default_runtime_poll_interval_ms")]
    pub runtime_poll_interval_ms: u64,
    /// Dependent services, probed in declaration order.
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            runtime_start_command: default_runtime_start_command(),
            runtime_attempts: DEFAULT_RUNTIME_ATTEMPTS,
            runtime_poll_interval_ms: DEFAULT_RUNTIME_POLL_INTERVAL_MS,
            services: Vec::new(),
        }
    }
}

impl ProvisionConfig {
    /// Runtime poll interval as a [`Duration`].
    #[must_use]
    pub fn runtime_poll_interval(&self) -> Duration {
        Duration::from_millis(self.runtime_poll_interval_ms)
    }
}

/// One dependent service: how to start it, and how to tell it is alive.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Service name, matched against the orchestrator's running-service list.
    pub name: String,
    /// Command that starts this service.
    pub start_command: Vec<String>,
    /// TCP address the liveness probe connects to, e.g. `127.0.0.1:8001`.
    pub probe_addr: String,
    /// Probe attempt cap (default: 15).
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    /// Probe interval in ms (default: 2000).
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

impl ServiceSpec {
    /// Probe interval as a [`Duration`].
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
