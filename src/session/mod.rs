//! Fishing sessions.
//!
//! A session is one fishing attempt: connect, prepare, play, submit the
//! replay, and read the result. [`SessionRunner`] owns the connection
//! lifecycle and the timeout/reconnect policy; protocol decisions live in
//! [`protocol::SessionMachine`] and replay construction in [`trajectory`].

pub mod protocol;
pub mod socket;
pub mod trajectory;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Duration;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::types::{AccountContext, FailureReason, FishingRange, SessionOutcome};
use protocol::{ClientCommand, SessionMachine};

/// Upper bound on waiting for a close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Opens authenticated session connections.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn connect(&self, token: &SecretString) -> Result<Box<dyn SessionSocket>>;
}

/// One open session connection.
#[async_trait]
pub trait SessionSocket: Send {
    async fn send(&mut self, command: &ClientCommand) -> Result<()>;

    /// Next inbound text frame; `None` once the peer has closed.
    async fn next_message(&mut self) -> Option<Result<String>>;

    /// Close the connection. Must be safe to call more than once.
    async fn close(&mut self);
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// How one connection attempt ended.
enum AttemptEnd {
    Resolved(SessionOutcome),
    /// Eligible for another connection.
    Retry(String),
    /// Not worth another connection.
    Abort(FailureReason),
}

/// Drives sessions to a terminal outcome over a transport.
pub struct SessionRunner<T> {
    transport: T,
}

impl<T: SessionTransport> SessionRunner<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Run one fishing attempt for `ctx` on `range`.
    ///
    /// Each connection gets `session.timeout` to reach `gameOver`; on
    /// timeout, transport error, or closure before the game starts, a new
    /// connection is opened after `session.reconnect_delay`, up to
    /// `session.max_reconnect_attempts` times. Always returns an outcome
    /// and always closes the connection it opened.
    pub async fn run(&self, ctx: &AccountContext, range: FishingRange) -> SessionOutcome {
        let session = &ctx.settings.session;
        let is_5x = ctx.settings.fishing.is_5x;
        let max = session.max_reconnect_attempts;
        let session_id = uuid::Uuid::new_v4();

        let mut machine = SessionMachine::new();
        let mut reconnects = 0u32;

        loop {
            machine.reset();
            debug!(
                %session_id,
                attempt = reconnects + 1,
                of = max + 1,
                %range,
                "Opening session connection"
            );

            let deadline = Instant::now() + session.timeout();
            let last_error = match self
                .attempt(&ctx.token, range, is_5x, &mut machine, deadline)
                .await
            {
                AttemptEnd::Resolved(outcome) => return outcome,
                AttemptEnd::Abort(reason) => {
                    warn!(%session_id, %reason, "Session aborted");
                    return SessionOutcome::Failed { reason };
                }
                AttemptEnd::Retry(e) => e,
            };

            if reconnects >= max {
                error!(%session_id, attempts = reconnects + 1, error = %last_error, "Reconnect budget exhausted");
                return SessionOutcome::Failed {
                    reason: FailureReason::ReconnectsExhausted {
                        attempts: reconnects + 1,
                        last_error,
                    },
                };
            }

            reconnects += 1;
            info!(
                %session_id,
                error = %last_error,
                reconnect = reconnects,
                max,
                delay_ms = session.reconnect_delay_ms,
                "Reconnecting session"
            );
            sleep(session.reconnect_delay()).await;
        }
    }

    async fn attempt(
        &self,
        token: &SecretString,
        range: FishingRange,
        is_5x: bool,
        machine: &mut SessionMachine,
        deadline: Instant,
    ) -> AttemptEnd {
        let mut socket = match timeout_at(deadline, self.transport.connect(token)).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => return AttemptEnd::Retry(format!("connect failed: {e:#}")),
            Err(_) => return AttemptEnd::Retry("timed out while connecting".into()),
        };
        debug!("Session connection open");

        let exchanged = timeout_at(deadline, exchange(&mut *socket, machine, range, is_5x)).await;
        let end = match exchanged {
            Ok(end) => end,
            Err(_) => {
                warn!(state = ?machine.state(), "Session timed out, closing connection");
                AttemptEnd::Retry("session timed out".into())
            }
        };

        if timeout(CLOSE_GRACE, socket.close()).await.is_err() {
            debug!("Close handshake did not finish in time");
        }
        end
    }
}

/// Run the protocol over an open socket until it resolves or breaks.
async fn exchange(
    socket: &mut dyn SessionSocket,
    machine: &mut SessionMachine,
    range: FishingRange,
    is_5x: bool,
) -> AttemptEnd {
    let prepare = machine.on_open(range, is_5x);
    if let Err(e) = socket.send(&prepare).await {
        return AttemptEnd::Retry(format!("failed to send prepare: {e:#}"));
    }

    loop {
        let raw = match socket.next_message().await {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => return AttemptEnd::Retry(format!("transport error: {e:#}")),
            None if machine.game_started() => {
                return AttemptEnd::Abort(FailureReason::ConnectionLost)
            }
            None => return AttemptEnd::Retry("connection closed before the game started".into()),
        };

        let step = machine.on_text(&raw);
        for command in &step.commands {
            if let Err(e) = socket.send(command).await {
                return AttemptEnd::Retry(format!("send failed: {e:#}"));
            }
        }
        if let Some(outcome) = step.outcome {
            return AttemptEnd::Resolved(outcome);
        }
    }
}
