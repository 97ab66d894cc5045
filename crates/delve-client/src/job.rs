//! Single-flight job state machine.
//!
//! One session holds at most one in-flight job, guarded by this machine:
//! `Idle -> Submitting -> AwaitingResult -> Idle`. All behavior flows
//! through [`JobSession::apply`], which consumes a closed set of
//! [`JobEvent`]s and returns the [`Transition`] the driver must perform —
//! so the single-flight and single-timer invariants are properties of one
//! function, not of scattered callbacks.
//!
//! The machine never touches a timer itself; it only *instructs* the driver
//! via [`TimerEffect`]. The driver holds the one optional deadline, which
//! keeps the armed-timer count at 0 or 1 by construction.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use delve_core::classify::classify_failure;
use delve_core::errors::JobError;
use delve_core::protocol::Frame;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Channel resolving a caller's pending `submit` future.
pub type JobReply = oneshot::Sender<Result<String, JobError>>;

/// Job machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// No job in flight; `submit` is accepted.
    Idle,
    /// Accepted, request not yet handed to the transport.
    Submitting,
    /// Request sent; waiting for a terminal frame.
    AwaitingResult,
}

/// Events the machine consumes.
#[derive(Debug)]
pub enum JobEvent {
    /// The caller asked to submit a job.
    Submitted {
        /// Research topic.
        topic: String,
        /// Channel to resolve the caller's future.
        reply: JobReply,
    },
    /// The encoded request was handed to the transport.
    RequestSent,
    /// An inbound frame arrived.
    FrameReceived(Frame),
    /// The armed deadline fired.
    DeadlineExpired,
    /// The caller cancelled. Client-side only.
    Cancelled,
    /// The connection is gone.
    ConnectionClosed {
        /// Human-readable closure cause.
        reason: String,
    },
}

/// What the driver must do to the deadline timer after a transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimerEffect {
    /// Arm a fresh deadline.
    Arm,
    /// Re-arm: a progress frame proved the backend alive, so only renewed
    /// silence may time the job out.
    Reset,
    /// Drop the armed deadline.
    Disarm,
    /// Leave the timer as it is.
    #[default]
    Keep,
}

/// Progress surfaced to the caller's watch channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    /// Backend status line.
    pub message: String,
    /// Fraction complete in `[0.0, 1.0]`, if reported.
    pub fraction: Option<f64>,
    /// Time since the job was submitted.
    pub elapsed: Duration,
}

/// Outcome of one transition.
#[derive(Debug, Default)]
pub struct Transition {
    /// Required timer action.
    pub timer: TimerEffect,
    /// Progress to surface, if the event carried one.
    pub progress: Option<ProgressUpdate>,
    /// A pending job just reached a successful result.
    pub completed: bool,
}

struct PendingJob {
    topic: String,
    submitted_at: Instant,
    reply: JobReply,
}

// ─────────────────────────────────────────────────────────────────────────────
// Machine
// ─────────────────────────────────────────────────────────────────────────────

/// The single-flight job machine. Owned by the session driver; callers only
/// ever see the future resolved through the reply channel.
pub struct JobSession {
    state: JobState,
    pending: Option<PendingJob>,
}

impl JobSession {
    /// A fresh machine in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: JobState::Idle,
            pending: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Consume one event and return the transition to perform.
    pub fn apply(&mut self, event: JobEvent) -> Transition {
        match event {
            JobEvent::Submitted { topic, reply } => self.on_submitted(topic, reply),
            JobEvent::RequestSent => {
                if self.state == JobState::Submitting {
                    self.state = JobState::AwaitingResult;
                }
                Transition::default()
            }
            JobEvent::FrameReceived(frame) => self.on_frame(&frame),
            JobEvent::DeadlineExpired => self.on_deadline(),
            JobEvent::Cancelled => self.reject(JobError::Cancelled),
            JobEvent::ConnectionClosed { reason } => {
                self.reject(JobError::ConnectionLost { reason })
            }
        }
    }

    fn on_submitted(&mut self, topic: String, reply: JobReply) -> Transition {
        if self.state != JobState::Idle {
            let _ = reply.send(Err(JobError::AlreadyInFlight));
            return Transition::default();
        }
        if topic.trim().is_empty() {
            let _ = reply.send(Err(JobError::EmptyTopic));
            return Transition::default();
        }
        self.pending = Some(PendingJob {
            topic,
            submitted_at: Instant::now(),
            reply,
        });
        self.state = JobState::Submitting;
        Transition {
            timer: TimerEffect::Arm,
            ..Transition::default()
        }
    }

    fn on_frame(&mut self, frame: &Frame) -> Transition {
        if self.state == JobState::Idle {
            // Late, duplicate, or unsolicited — terminal-frame idempotence
            // requires these to be discarded, never re-resolved.
            if frame.is_job_relevant() {
                debug!(kind = frame.kind(), "discarding frame with no job in flight");
            }
            return Transition::default();
        }
        match frame {
            Frame::Progress { message, step } => {
                let elapsed = self
                    .pending
                    .as_ref()
                    .map_or(Duration::ZERO, |job| job.submitted_at.elapsed());
                Transition {
                    timer: TimerEffect::Reset,
                    progress: Some(ProgressUpdate {
                        message: message.clone(),
                        fraction: *step,
                        elapsed,
                    }),
                    completed: false,
                }
            }
            Frame::Result { data } => {
                self.resolve(Ok(data.clone()));
                Transition {
                    timer: TimerEffect::Disarm,
                    progress: None,
                    completed: true,
                }
            }
            Frame::Error { data } => {
                let failure = classify_failure(data);
                self.resolve(Err(JobError::Backend {
                    message: failure.message,
                    category: failure.category,
                    suggestion: failure.suggestion,
                }));
                Transition {
                    timer: TimerEffect::Disarm,
                    ..Transition::default()
                }
            }
            // Keepalives and unknown kinds never touch the job or its
            // deadline.
            Frame::Keepalive | Frame::Unknown { .. } => Transition::default(),
        }
    }

    fn on_deadline(&mut self) -> Transition {
        if self.state == JobState::Idle {
            return Transition::default();
        }
        let (topic, waited) = self.pending.as_ref().map_or_else(
            || (String::new(), Duration::ZERO),
            |job| (job.topic.clone(), job.submitted_at.elapsed()),
        );
        self.resolve(Err(JobError::TimedOut {
            topic,
            waited_ms: waited.as_millis() as u64,
        }));
        // The timer already fired; Disarm tells the driver to forget it.
        Transition {
            timer: TimerEffect::Disarm,
            ..Transition::default()
        }
    }

    fn reject(&mut self, error: JobError) -> Transition {
        if self.state == JobState::Idle {
            return Transition::default();
        }
        self.resolve(Err(error));
        Transition {
            timer: TimerEffect::Disarm,
            ..Transition::default()
        }
    }

    /// Finalize the pending job and return to `Idle`.
    fn resolve(&mut self, outcome: Result<String, JobError>) {
        if let Some(job) = self.pending.take() {
            let _ = job.reply.send(outcome);
        }
        self.state = JobState::Idle;
    }
}

impl Default for JobSession {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
