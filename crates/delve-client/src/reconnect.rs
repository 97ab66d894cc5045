//! Close-cause classification and the bounded reconnection policy.
//!
//! The policy is a pure function of the closure cause and the attempt
//! counter — no I/O, no clock — so every branch is testable without a
//! connection.

use std::time::Duration;

use delve_core::backoff::backoff_delay_ms;
use delve_core::config::ReconnectConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Close causes
// ─────────────────────────────────────────────────────────────────────────────

/// Why a connection stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseCause {
    /// Closed by this client. Never reconnected.
    Local,
    /// The server sent a close frame.
    Remote {
        /// WebSocket close code (1005 when the frame carried none).
        code: u16,
        /// Close reason text.
        reason: String,
    },
    /// The transport failed without a close handshake.
    Transport {
        /// The underlying error text.
        message: String,
    },
}

impl CloseCause {
    /// Whether the closure looks like keepalive / idle-timeout loss.
    ///
    /// This is the only cause worth reconnecting over: the backend drops
    /// idle connections it stops hearing pings from, and a fresh connect
    /// restores service. Everything else is either deliberate or broken.
    #[must_use]
    pub fn is_keepalive_loss(&self) -> bool {
        let text = match self {
            Self::Local => return false,
            Self::Remote { reason, .. } => reason,
            Self::Transport { message } => message,
        };
        let lower = text.to_lowercase();
        lower.contains("keepalive")
            || lower.contains("ping timeout")
            || lower.contains("idle timeout")
    }

    /// One-line description for logs and job failure reasons.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Local => "closed locally".to_owned(),
            Self::Remote { code, reason } if reason.is_empty() => {
                format!("closed by server (code {code})")
            }
            Self::Remote { code, reason } => format!("closed by server (code {code}): {reason}"),
            Self::Transport { message } => format!("transport failed: {message}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// What to do about a closed connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Reconnect after the given delay.
    Reconnect(Duration),
    /// Give up; the session is over.
    Terminate,
}

/// Bounded, cause-specific reconnection policy.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    /// Policy with the given parameters.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    /// Decide from the closure cause alone.
    ///
    /// `attempts` is how many reconnects this session has already made
    /// since the last successful result. Once it reaches the configured
    /// cap the answer is always [`Decision::Terminate`], so retry loops
    /// are bounded by construction.
    #[must_use]
    pub fn decide(&self, cause: &CloseCause, attempts: u32) -> Decision {
        if attempts >= self.config.max_attempts {
            return Decision::Terminate;
        }
        if !cause.is_keepalive_loss() {
            return Decision::Terminate;
        }
        let delay_ms = backoff_delay_ms(
            attempts,
            self.config.base_delay_ms,
            self.config.max_delay_ms,
        );
        Decision::Reconnect(Duration::from_millis(delay_ms))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn keepalive_loss() -> CloseCause {
        CloseCause::Remote {
            code: 1011,
            reason: "keepalive ping timeout".into(),
        }
    }

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            max_attempts,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
        })
    }

    // -- cause classification --

    #[test]
    fn local_close_is_not_keepalive_loss() {
        assert!(!CloseCause::Local.is_keepalive_loss());
    }

    #[test]
    fn keepalive_reason_variants_detected() {
        for reason in ["keepalive ping timeout", "Keepalive expired", "idle timeout"] {
            let cause = CloseCause::Remote {
                code: 1011,
                reason: reason.into(),
            };
            assert!(cause.is_keepalive_loss(), "not detected: {reason}");
        }
    }

    #[test]
    fn transport_keepalive_message_detected() {
        let cause = CloseCause::Transport {
            message: "WebSocket protocol error: ping timeout".into(),
        };
        assert!(cause.is_keepalive_loss());
    }

    #[test]
    fn unrelated_remote_close_not_detected() {
        let cause = CloseCause::Remote {
            code: 1000,
            reason: "normal closure".into(),
        };
        assert!(!cause.is_keepalive_loss());
    }

    #[test]
    fn describe_includes_code_and_reason() {
        let cause = CloseCause::Remote {
            code: 1011,
            reason: "keepalive ping timeout".into(),
        };
        let text = cause.describe();
        assert!(text.contains("1011"));
        assert!(text.contains("keepalive ping timeout"));
    }

    #[test]
    fn describe_empty_reason() {
        let cause = CloseCause::Remote {
            code: 1005,
            reason: String::new(),
        };
        assert_eq!(cause.describe(), "closed by server (code 1005)");
    }

    // -- decisions --

    #[test]
    fn keepalive_loss_reconnects_with_base_delay() {
        let decision = policy(1).decide(&keepalive_loss(), 0);
        assert_eq!(decision, Decision::Reconnect(Duration::from_millis(1_000)));
    }

    #[test]
    fn local_close_terminates() {
        assert_eq!(policy(1).decide(&CloseCause::Local, 0), Decision::Terminate);
    }

    #[test]
    fn protocol_error_terminates() {
        let cause = CloseCause::Transport {
            message: "invalid frame header".into(),
        };
        assert_eq!(policy(1).decide(&cause, 0), Decision::Terminate);
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = policy(1);
        assert_eq!(
            policy.decide(&keepalive_loss(), 0),
            Decision::Reconnect(Duration::from_millis(1_000))
        );
        // after the single permitted attempt, always terminate
        assert_eq!(policy.decide(&keepalive_loss(), 1), Decision::Terminate);
        assert_eq!(policy.decide(&keepalive_loss(), 7), Decision::Terminate);
    }

    #[test]
    fn delay_backs_off_exponentially_under_higher_cap() {
        let policy = policy(4);
        assert_eq!(
            policy.decide(&keepalive_loss(), 0),
            Decision::Reconnect(Duration::from_millis(1_000))
        );
        assert_eq!(
            policy.decide(&keepalive_loss(), 1),
            Decision::Reconnect(Duration::from_millis(2_000))
        );
        assert_eq!(
            policy.decide(&keepalive_loss(), 3),
            Decision::Reconnect(Duration::from_millis(8_000))
        );
    }

    #[test]
    fn zero_cap_never_reconnects() {
        assert_eq!(policy(0).decide(&keepalive_loss(), 0), Decision::Terminate);
    }
}
