//! # delve-client
//!
//! Resilient session client for the Delve deep-research backend.
//!
//! A [`SessionController`] owns one persistent WebSocket connection and at
//! most one in-flight research job. Around that core:
//!
//! - [`provision`]: makes sure the container runtime and dependent services
//!   are up before the first connect
//! - [`connection`]: connection lifecycle, keepalive pings, close causes
//! - [`reconnect`]: bounded, cause-specific reconnection policy
//! - [`job`]: the single-flight job state machine with deadline semantics
//! - [`controller`]: the composition root and the only caller-facing API
//!
//! The caller surface is `submit(topic, model)` returning a future that
//! resolves with the research result, plus `cancel()` and `close()`. All
//! console/UI concerns live outside this crate.

#![deny(unsafe_code)]

pub mod connection;
pub mod controller;
pub mod job;
pub mod provision;
pub mod reconnect;

pub use connection::{Connection, ConnectionEvent};
pub use controller::SessionController;
pub use delve_core::config::{ProvisionConfig, ReconnectConfig, ServiceSpec, SessionConfig};
pub use delve_core::errors::{ConnectError, JobError, ProvisionError, StartError};
pub use job::{JobState, ProgressUpdate};
pub use provision::{DockerOrchestrator, Orchestrator, Provisioner, Readiness};
pub use reconnect::{CloseCause, Decision, ReconnectPolicy};
