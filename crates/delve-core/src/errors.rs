//! Error hierarchy for the Delve client.
//!
//! Three domains, one enum each, all via `thiserror`:
//!
//! - [`ProvisionError`]: dependency bootstrap failures (fatal for session start)
//! - [`ConnectError`]: transport-level connection failures
//! - [`JobError`]: terminal outcomes of a submitted job
//!
//! Display strings carry the remediation hint inline — the caller-facing
//! layers print these verbatim, so every terminal failure names what to
//! check rather than handing back a bare cause.

use thiserror::Error;

use crate::classify::FailureCategory;

// ─────────────────────────────────────────────────────────────────────────────
// Provisioning
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from dependency provisioning. All fatal for session start.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The container runtime never became reachable.
    #[error(
        "container runtime is not available after {attempts} attempts: {reason} — start it manually and retry"
    )]
    RuntimeUnavailable {
        /// How many liveness checks were made.
        attempts: u32,
        /// What the last check reported.
        reason: String,
    },

    /// An orchestration command could not be run or exited nonzero.
    #[error("command `{command}` failed: {reason}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Why it failed.
        reason: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

/// Errors establishing or using the research service connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The configured URL is not a usable WebSocket endpoint.
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The endpoint did not accept the connection.
    #[error(
        "could not reach the research service at {url}: {reason} — check that the dependent services are running"
    )]
    Unreachable {
        /// The endpoint that refused us.
        url: String,
        /// The transport error.
        reason: String,
    },

    /// The connect attempt exceeded its deadline.
    #[error("timed out connecting to {url} after {timeout_ms}ms")]
    Timeout {
        /// The endpoint we waited on.
        url: String,
        /// How long we waited.
        timeout_ms: u64,
    },

    /// The connection is gone; the send was dropped.
    #[error("connection is closed")]
    Closed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session start
// ─────────────────────────────────────────────────────────────────────────────

/// Errors starting a session: provisioning first, then the initial connect.
#[derive(Debug, Error)]
pub enum StartError {
    /// Dependency provisioning failed; no connect was attempted.
    #[error("{0}")]
    Provision(#[from] ProvisionError),

    /// Provisioning passed but the connection could not be opened.
    #[error("{0}")]
    Connect(#[from] ConnectError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Jobs
// ─────────────────────────────────────────────────────────────────────────────

fn suffix(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" — {s}"))
        .unwrap_or_default()
}

/// Terminal failure outcomes for a submitted job.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    /// A job is already pending on this session.
    #[error("a research job is already in flight — wait for it or cancel it first")]
    AlreadyInFlight,

    /// The topic was empty or whitespace.
    #[error("topic must not be empty")]
    EmptyTopic,

    /// The deadline elapsed with no job-relevant frame.
    #[error(
        "no result for \"{topic}\" after {waited_ms}ms of silence — the backend may be stalled; raise the deadline or check the research service logs"
    )]
    TimedOut {
        /// The topic that was being researched.
        topic: String,
        /// Total time since submission.
        waited_ms: u64,
    },

    /// The backend reported a terminal failure.
    #[error("research failed: {message}{}", suffix(.suggestion))]
    Backend {
        /// The backend's failure text.
        message: String,
        /// Classified failure category.
        category: FailureCategory,
        /// Remediation hint, when the text matched a known pattern.
        suggestion: Option<String>,
    },

    /// The caller cancelled the job. Client-side only; the backend may
    /// still be working.
    #[error("research job cancelled")]
    Cancelled,

    /// The connection dropped while the job was in flight.
    #[error(
        "connection to the research service was lost: {reason} — check that the service is still running"
    )]
    ConnectionLost {
        /// The closure cause.
        reason: String,
    },

    /// The session driver is gone; no further jobs can run.
    #[error("session is closed")]
    SessionClosed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_unavailable_display() {
        let error = ProvisionError::RuntimeUnavailable {
            attempts: 30,
            reason: "docker info kept failing".into(),
        };
        assert!(error.to_string().contains("30 attempts"));
        assert!(error.to_string().contains("start it manually"));
    }

    #[test]
    fn command_failed_display() {
        let error = ProvisionError::CommandFailed {
            command: "docker compose up -d".into(),
            reason: "exited with status 1".into(),
        };
        assert!(error.to_string().contains("docker compose up -d"));
    }

    #[test]
    fn unreachable_carries_remediation() {
        let error = ConnectError::Unreachable {
            url: "ws://localhost:8001/research_ws".into(),
            reason: "connection refused".into(),
        };
        assert!(error.to_string().contains("dependent services"));
    }

    #[test]
    fn connect_timeout_display() {
        let error = ConnectError::Timeout {
            url: "ws://localhost:8001/research_ws".into(),
            timeout_ms: 10_000,
        };
        assert!(error.to_string().contains("10000ms"));
    }

    #[test]
    fn timed_out_names_topic_and_duration() {
        let error = JobError::TimedOut {
            topic: "Apple M4 Max".into(),
            waited_ms: 300_000,
        };
        let text = error.to_string();
        assert!(text.contains("Apple M4 Max"));
        assert!(text.contains("300000ms"));
        assert!(text.contains("check the research service logs"));
    }

    #[test]
    fn backend_error_with_suggestion() {
        let error = JobError::Backend {
            message: "TAVILY_API_KEY is not set".into(),
            category: FailureCategory::Credentials,
            suggestion: Some("Add the missing API key".into()),
        };
        let text = error.to_string();
        assert!(text.contains("TAVILY_API_KEY"));
        assert!(text.contains(" — Add the missing API key"));
    }

    #[test]
    fn backend_error_without_suggestion() {
        let error = JobError::Backend {
            message: "opaque failure".into(),
            category: FailureCategory::Unknown,
            suggestion: None,
        };
        assert_eq!(error.to_string(), "research failed: opaque failure");
    }

    #[test]
    fn start_error_wraps_both_domains() {
        let provision: StartError = ProvisionError::RuntimeUnavailable {
            attempts: 1,
            reason: "down".into(),
        }
        .into();
        assert!(provision.to_string().contains("container runtime"));

        let connect: StartError = ConnectError::Closed.into();
        assert!(connect.to_string().contains("closed"));
    }

    #[test]
    fn errors_are_std_errors() {
        let _: &dyn std::error::Error = &JobError::AlreadyInFlight;
        let _: &dyn std::error::Error = &ConnectError::Closed;
        let _: &dyn std::error::Error = &ProvisionError::CommandFailed {
            command: "c".into(),
            reason: "r".into(),
        };
    }
}
