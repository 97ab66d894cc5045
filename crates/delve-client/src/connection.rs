//! Persistent WebSocket connection to the research service.
//!
//! A [`Connection`] is a thin handle over a spawned driver task that owns
//! the socket. The driver multiplexes outbound sends, the keepalive ticker,
//! and inbound frames through one `tokio::select!` loop, and reports
//! everything that happens on an event channel. It emits exactly one
//! [`ConnectionEvent::Closed`] per connection instance, including for
//! caller-initiated closes, so the reconnection policy can always observe
//! the cause.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use delve_core::config::SessionConfig;
use delve_core::errors::ConnectError;
use delve_core::protocol::{self, Frame, JobRequest};

use crate::reconnect::CloseCause;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─────────────────────────────────────────────────────────────────────────────
// Events and handle
// ─────────────────────────────────────────────────────────────────────────────

/// Event emitted by the connection driver.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A decoded inbound frame.
    Frame(Frame),
    /// The connection stopped. Emitted exactly once per connection.
    Closed(CloseCause),
}

enum Command {
    Send(String),
    Close,
}

/// Handle to one open connection.
///
/// Exclusively owned by the session driver and replaced wholesale on
/// reconnect — never mutated in place.
pub struct Connection {
    commands: mpsc::Sender<Command>,
}

impl Connection {
    /// Open the connection and spawn its driver task.
    ///
    /// Validates the endpoint scheme, applies the configured connect
    /// timeout, and returns the handle plus the event stream.
    pub async fn open(
        config: &SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<ConnectionEvent>), ConnectError> {
        let url = Url::parse(&config.url).map_err(|error| ConnectError::InvalidEndpoint {
            url: config.url.clone(),
            reason: error.to_string(),
        })?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConnectError::InvalidEndpoint {
                url: config.url.clone(),
                reason: format!("expected ws:// or wss:// scheme, got {}://", url.scheme()),
            });
        }

        let (stream, _response) =
            tokio::time::timeout(config.connect_timeout(), connect_async(config.url.as_str()))
                .await
                .map_err(|_| ConnectError::Timeout {
                    url: config.url.clone(),
                    timeout_ms: config.connect_timeout_ms,
                })?
                .map_err(|error| ConnectError::Unreachable {
                    url: config.url.clone(),
                    reason: error.to_string(),
                })?;

        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(64);
        drop(tokio::spawn(driver(
            stream,
            commands_rx,
            events_tx,
            config.keepalive_interval(),
        )));

        Ok((Self { commands: commands_tx }, events_rx))
    }

    /// Encode and send a job request.
    pub async fn send(&self, request: &JobRequest) -> Result<(), ConnectError> {
        self.commands
            .send(Command::Send(request.encode()))
            .await
            .map_err(|_| ConnectError::Closed)
    }

    /// Close the connection. A no-op if it is already closed.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

/// Connection driver loop.
///
/// Runs until the socket closes (either side) or the handle asks it to
/// stop, then emits the single `Closed` event with the cause.
async fn driver(
    stream: WsStream,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<ConnectionEvent>,
    keepalive: Duration,
) {
    let (mut ws_tx, mut ws_rx) = stream.split();
    // interval panics on a zero period; clamp rather than propagate a
    // misconfiguration into a crash
    let mut ping = tokio::time::interval(keepalive.max(Duration::from_millis(1)));
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so pings start one
    // interval after open.
    let _ = ping.tick().await;

    let cause = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(error) = ws_tx.send(Message::Text(text.into())).await {
                        break CloseCause::Transport {
                            message: error.to_string(),
                        };
                    }
                }
                Some(Command::Close) | None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break CloseCause::Local;
                }
            },
            _ = ping.tick() => {
                if let Err(error) = ws_tx.send(Message::Ping(vec![].into())).await {
                    break CloseCause::Transport {
                        message: error.to_string(),
                    };
                }
            }
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => match protocol::decode(text.as_bytes()) {
                    Ok(frame) => {
                        if events.send(ConnectionEvent::Frame(frame)).await.is_err() {
                            // Receiver gone; nobody is listening anymore.
                            break CloseCause::Local;
                        }
                    }
                    // A malformed frame is dropped, not fatal.
                    Err(error) => warn!(%error, "dropping malformed frame"),
                },
                Some(Ok(Message::Close(close_frame))) => {
                    break match close_frame {
                        Some(frame) => CloseCause::Remote {
                            code: frame.code.into(),
                            reason: frame.reason.to_string(),
                        },
                        // 1005: the peer sent a close with no status.
                        None => CloseCause::Remote {
                            code: 1005,
                            reason: String::new(),
                        },
                    };
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                Some(Err(error)) => break CloseCause::Transport {
                    message: error.to_string(),
                },
                None => break CloseCause::Transport {
                    message: "stream ended without a close frame".into(),
                },
            },
        }
    };

    debug!(cause = %cause.describe(), "connection driver stopped");
    let _ = events.send(ConnectionEvent::Closed(cause)).await;
}
