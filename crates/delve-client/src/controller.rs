//! Session controller: the composition root and the only caller-facing API.
//!
//! A [`SessionController`] wires provisioning, the connection, the
//! reconnection policy, and the job machine together behind three calls:
//! `submit`, `cancel`, `close`. Internally a single driver task owns all
//! mutable session state — the connection handle, the job machine, the one
//! optional deadline timer, and the reconnect counter — and callers reach
//! it only through a command channel. That makes the single-flight and
//! single-timer invariants structural rather than conventional.

use std::pin::Pin;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use delve_core::config::SessionConfig;
use delve_core::errors::{ConnectError, JobError, StartError};
use delve_core::ids::SessionId;
use delve_core::protocol::JobRequest;

use crate::connection::{Connection, ConnectionEvent};
use crate::job::{JobEvent, JobSession, JobState, ProgressUpdate, TimerEffect, Transition};
use crate::provision::{Provisioner, Readiness};
use crate::reconnect::{CloseCause, Decision, ReconnectPolicy};

// ─────────────────────────────────────────────────────────────────────────────
// Public handle
// ─────────────────────────────────────────────────────────────────────────────

enum SessionCommand {
    Submit {
        topic: String,
        model: Option<String>,
        reply: oneshot::Sender<Result<String, JobError>>,
    },
    Cancel,
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Handle to one research session.
///
/// Sessions are independent of each other and of any global state; any
/// number can run in the same process.
#[derive(Debug)]
pub struct SessionController {
    commands: mpsc::Sender<SessionCommand>,
    progress: watch::Receiver<Option<ProgressUpdate>>,
}

impl SessionController {
    /// Provision dependencies, connect, and start the session driver.
    ///
    /// Provisioning failures are fatal and reported before any connect is
    /// attempted; a partially ready dependency set is only a warning.
    pub async fn start(
        config: SessionConfig,
        provisioner: Provisioner,
    ) -> Result<Self, StartError> {
        match provisioner.ensure_ready().await? {
            Readiness::Ready => {}
            Readiness::PartiallyReady(unready) => {
                warn!(
                    services = ?unready,
                    "some dependent services never passed their liveness probe; connecting anyway"
                );
            }
        }
        Self::connect(config).await.map_err(StartError::from)
    }

    /// Connect without provisioning (the dependency set is already known
    /// to be up, or is managed elsewhere).
    pub async fn connect(config: SessionConfig) -> Result<Self, ConnectError> {
        let (connection, events) = Connection::open(&config).await?;
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (progress_tx, progress_rx) = watch::channel(None);

        let id = SessionId::new();
        info!(session = %id, url = %config.url, "session connected");
        let policy = ReconnectPolicy::new(config.reconnect.clone());
        let driver = Driver {
            id,
            config,
            policy,
            connection,
            events,
            commands: commands_rx,
            progress: progress_tx,
            job: JobSession::new(),
            deadline: None,
            reconnect_attempts: 0,
        };
        drop(tokio::spawn(driver.run()));

        Ok(Self {
            commands: commands_tx,
            progress: progress_rx,
        })
    }

    /// Submit a research job and suspend until its terminal outcome.
    ///
    /// At most one job may be in flight; a second submit fails with
    /// [`JobError::AlreadyInFlight`] without disturbing the pending one.
    pub async fn submit(
        &self,
        topic: impl Into<String>,
        model: Option<String>,
    ) -> Result<String, JobError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Submit {
                topic: topic.into(),
                model,
                reply: reply_tx,
            })
            .await
            .map_err(|_| JobError::SessionClosed)?;
        reply_rx.await.map_err(|_| JobError::SessionClosed)?
    }

    /// Cancel the in-flight job, if any. Client-side only — the backend is
    /// not told to stop working.
    pub async fn cancel(&self) {
        let _ = self.commands.send(SessionCommand::Cancel).await;
    }

    /// Close the session. Idempotent; resolves even if the driver already
    /// exited.
    pub async fn close(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Close { done: done_tx })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }

    /// Watch progress updates for the in-flight job.
    ///
    /// Holds `None` until the first progress frame arrives. Keepalives are
    /// never surfaced here.
    #[must_use]
    pub fn subscribe_progress(&self) -> watch::Receiver<Option<ProgressUpdate>> {
        self.progress.clone()
    }

    /// Whether the session has terminated (driver exited, by `close()` or
    /// an unrecoverable closure cause).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

struct Driver {
    id: SessionId,
    config: SessionConfig,
    policy: ReconnectPolicy,
    connection: Connection,
    events: mpsc::Receiver<ConnectionEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    progress: watch::Sender<Option<ProgressUpdate>>,
    job: JobSession,
    /// The one deadline timer. `None` means disarmed; the invariant that a
    /// session never has two armed deadlines is this field.
    deadline: Option<Pin<Box<Sleep>>>,
    reconnect_attempts: u32,
}

/// Resolve when the armed deadline fires; never resolve while disarmed.
async fn deadline_fired(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending::<()>().await,
    }
}

impl Driver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Submit { topic, model, reply }) => {
                        self.handle_submit(topic, model, reply).await;
                    }
                    Some(SessionCommand::Cancel) => self.apply(JobEvent::Cancelled),
                    Some(SessionCommand::Close { done }) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    // Every handle dropped; nobody can reach this session
                    // anymore.
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                event = self.events.recv() => match event {
                    Some(ConnectionEvent::Frame(frame)) => {
                        self.apply(JobEvent::FrameReceived(frame));
                    }
                    Some(ConnectionEvent::Closed(cause)) => {
                        if !self.handle_closed(cause).await {
                            return;
                        }
                    }
                    None => {
                        let cause = CloseCause::Transport {
                            message: "connection driver stopped".into(),
                        };
                        if !self.handle_closed(cause).await {
                            return;
                        }
                    }
                },
                () = deadline_fired(&mut self.deadline) => {
                    self.deadline = None;
                    self.apply(JobEvent::DeadlineExpired);
                }
            }
        }
    }

    async fn handle_submit(
        &mut self,
        topic: String,
        model: Option<String>,
        reply: oneshot::Sender<Result<String, JobError>>,
    ) {
        let request = JobRequest {
            topic: topic.clone(),
            model,
        };
        self.apply(JobEvent::Submitted { topic, reply });
        if self.job.state() != JobState::Submitting {
            // rejected: already in flight, or empty topic
            return;
        }
        match self.connection.send(&request).await {
            Ok(()) => {
                debug!(session = %self.id, topic = %request.topic, "job request sent");
                self.apply(JobEvent::RequestSent);
            }
            Err(error) => {
                // The connection driver will emit its own Closed event; the
                // job fails now so the caller is not left waiting on it.
                self.apply(JobEvent::ConnectionClosed {
                    reason: error.to_string(),
                });
            }
        }
    }

    /// Returns `false` when the session is over and the driver must exit.
    async fn handle_closed(&mut self, cause: CloseCause) -> bool {
        self.apply(JobEvent::ConnectionClosed {
            reason: cause.describe(),
        });
        match self.policy.decide(&cause, self.reconnect_attempts) {
            Decision::Terminate => {
                if matches!(cause, CloseCause::Local) {
                    debug!(session = %self.id, "session closed locally");
                } else {
                    warn!(session = %self.id, cause = %cause.describe(), "session terminated");
                }
                false
            }
            Decision::Reconnect(delay) => {
                self.reconnect_attempts += 1;
                info!(
                    session = %self.id,
                    attempt = self.reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting after keepalive loss"
                );
                tokio::time::sleep(delay).await;
                match Connection::open(&self.config).await {
                    Ok((connection, events)) => {
                        // replaced wholesale, never mutated in place
                        self.connection = connection;
                        self.events = events;
                        true
                    }
                    Err(error) => {
                        warn!(session = %self.id, %error, "reconnect failed; closing session");
                        false
                    }
                }
            }
        }
    }

    fn apply(&mut self, event: JobEvent) {
        let transition = self.job.apply(event);
        self.perform(transition);
    }

    fn perform(&mut self, transition: Transition) {
        match transition.timer {
            TimerEffect::Arm | TimerEffect::Reset => {
                self.deadline = Some(Box::pin(tokio::time::sleep(self.config.job_deadline())));
            }
            TimerEffect::Disarm => self.deadline = None,
            TimerEffect::Keep => {}
        }
        if let Some(update) = transition.progress {
            debug!(
                session = %self.id,
                message = %update.message,
                fraction = ?update.fraction,
                "research progress"
            );
            let _ = self.progress.send(Some(update));
        }
        if transition.completed {
            self.reconnect_attempts = 0;
        }
    }

    async fn shutdown(&mut self) {
        // refuse further commands before acknowledging the close
        self.commands.close();
        self.apply(JobEvent::Cancelled);
        self.connection.close().await;
        // Drain until the connection's single Closed event (or the channel
        // ends) so the socket teardown finishes before close() resolves.
        while let Some(event) = self.events.recv().await {
            if matches!(event, ConnectionEvent::Closed(_)) {
                break;
            }
        }
        debug!(session = %self.id, "session driver stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // Controller behavior against a live WebSocket backend is covered by
    // tests/session.rs; here only the pieces with no transport dependency.

    #[tokio::test]
    async fn submit_on_closed_session_fails() {
        let (commands_tx, commands_rx) = mpsc::channel(1);
        let (_progress_tx, progress_rx) = watch::channel(None);
        drop(commands_rx);
        let controller = SessionController {
            commands: commands_tx,
            progress: progress_rx,
        };
        let error = controller.submit("topic", None).await.unwrap_err();
        assert_matches!(error, JobError::SessionClosed);
    }

    #[tokio::test]
    async fn close_on_dead_driver_is_noop() {
        let (commands_tx, commands_rx) = mpsc::channel(1);
        let (_progress_tx, progress_rx) = watch::channel(None);
        drop(commands_rx);
        let controller = SessionController {
            commands: commands_tx,
            progress: progress_rx,
        };
        // must not hang or panic
        controller.close().await;
        controller.cancel().await;
    }

    #[tokio::test]
    async fn invalid_scheme_is_rejected_before_io() {
        let config = SessionConfig::new("http://localhost:8001/research_ws");
        let result = SessionController::connect(config).await;
        assert_matches!(result, Err(ConnectError::InvalidEndpoint { .. }));
    }
}
