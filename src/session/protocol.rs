//! Socket protocol messages and the per-attempt protocol state machine.
//!
//! `SessionMachine` is transport-free: it consumes raw inbound text and
//! returns the commands to send plus, eventually, the outcome. The
//! runner in the parent module owns the connection and the timers.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::trajectory::{KeyFrame, ReplayPayload, INTERPOLATION_STEPS};
use crate::types::{
    deserialize_id, CaughtFish, EconomySnapshot, FailureReason, FishingRange, SessionOutcome,
};

/// Key frames captured before the replay is submitted.
pub const REQUIRED_KEY_FRAMES: usize = 10;

const REPLAY_FRAME_SIZE: u32 = 100;
const REPLAY_NOMINAL_DURATION: u32 = 200;
const REPLAY_FPS: u32 = 20;
const END_FLAG: u8 = 1;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Commands sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum ClientCommand {
    Prepare {
        range: FishingRange,
        #[serde(rename = "is5x")]
        is_5x: bool,
    },
    Start,
    End { rep: ReplayEnvelope, en: u8 },
}

/// The `rep` object of the `end` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayEnvelope {
    pub fs: u32,
    pub ns: u32,
    pub fps: u32,
    pub frs: ReplayPayload,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Messages pushed by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    InitGame,
    GameState {
        #[serde(default)]
        frame: i64,
        #[serde(default)]
        dir: i64,
    },
    GameOver {
        #[serde(default)]
        success: bool,
        #[serde(rename = "catchedFish")]
        report: CatchReport,
    },
    #[serde(other)]
    Other,
}

/// `catchedFish` payload of `gameOver`; present on success and failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchReport {
    #[serde(default)]
    pub fish_info: Option<FishInfo>,
    #[serde(default)]
    pub current_exp: u64,
    #[serde(default)]
    pub exp_to_next_level: Option<u64>,
    #[serde(default)]
    pub energy: u32,
    #[serde(default)]
    pub gold: u64,
    #[serde(default)]
    pub fish_point: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FishInfo {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub fish_name: String,
    #[serde(default)]
    pub quality: u8,
    #[serde(default)]
    pub sell_price: u64,
    #[serde(default)]
    pub exp_gain: u64,
}

impl CatchReport {
    fn snapshot(&self) -> EconomySnapshot {
        EconomySnapshot {
            remaining_energy: self.energy,
            gold: self.gold,
            fish_points: self.fish_point,
        }
    }

    /// Turn a `gameOver` into the session's terminal outcome.
    pub fn into_outcome(self, success: bool) -> SessionOutcome {
        let economy = self.snapshot();
        if !success {
            return SessionOutcome::Missed { economy };
        }
        match self.fish_info {
            Some(info) => SessionOutcome::Caught {
                fish: CaughtFish {
                    id: info.id,
                    name: info.fish_name,
                    quality: info.quality,
                    sell_price: info.sell_price,
                },
                economy,
                exp: self.current_exp,
                exp_to_next_level: self.exp_to_next_level,
                exp_gain: info.exp_gain,
            },
            None => SessionOutcome::Failed {
                reason: FailureReason::Protocol(
                    "gameOver reported success without fish details".into(),
                ),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingGameInit,
    Playing,
    AwaitingOutcome,
    Resolved,
}

/// What to do after feeding one inbound message.
#[derive(Debug, Default)]
pub struct Step {
    pub commands: Vec<ClientCommand>,
    pub outcome: Option<SessionOutcome>,
}

/// Protocol state for one connection attempt.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    key_frames: Vec<KeyFrame>,
    end_sent: bool,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            key_frames: Vec::with_capacity(REQUIRED_KEY_FRAMES),
            end_sent: false,
        }
    }

    /// Forget everything captured on a previous connection.
    pub fn reset(&mut self) {
        self.state = SessionState::Connecting;
        self.key_frames.clear();
        self.end_sent = false;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn key_frames(&self) -> &[KeyFrame] {
        &self.key_frames
    }

    /// Whether the server has initialised the game on this connection.
    pub fn game_started(&self) -> bool {
        matches!(self.state, SessionState::Playing | SessionState::AwaitingOutcome)
    }

    /// Connection is open: the first command to send.
    pub fn on_open(&mut self, range: FishingRange, is_5x: bool) -> ClientCommand {
        self.state = SessionState::AwaitingGameInit;
        ClientCommand::Prepare { range, is_5x }
    }

    /// Feed one raw text frame. Unparseable frames are logged and ignored.
    pub fn on_text(&mut self, raw: &str) -> Step {
        match serde_json::from_str::<ServerMessage>(raw) {
            Ok(msg) => self.on_message(msg),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed session message");
                debug!(raw, "Malformed message body");
                Step::default()
            }
        }
    }

    pub fn on_message(&mut self, msg: ServerMessage) -> Step {
        let mut step = Step::default();
        if self.state == SessionState::Resolved {
            debug!(?msg, "Message after resolution ignored");
            return step;
        }

        match msg {
            ServerMessage::InitGame => {
                debug!("Game initialised, starting");
                if self.state == SessionState::AwaitingGameInit {
                    self.state = SessionState::Playing;
                }
                step.commands.push(ClientCommand::Start);
            }
            ServerMessage::GameState { frame, dir } => {
                if self.state != SessionState::Playing {
                    debug!(state = ?self.state, frame, "gameState outside play ignored");
                    return step;
                }
                self.key_frames.push(KeyFrame::from_tick(frame, dir));
                debug!(
                    captured = self.key_frames.len(),
                    required = REQUIRED_KEY_FRAMES,
                    "Key frame captured"
                );
                if self.key_frames.len() >= REQUIRED_KEY_FRAMES {
                    step.commands.extend(self.submit_replay());
                }
            }
            ServerMessage::GameOver { success, report } => {
                self.state = SessionState::Resolved;
                step.outcome = Some(report.into_outcome(success));
            }
            ServerMessage::Other => debug!("Unhandled session message type"),
        }
        step
    }

    /// Build the `end` command from the captured key frames.
    ///
    /// Returns `None` if it was already produced on this connection.
    pub fn submit_replay(&mut self) -> Option<ClientCommand> {
        if self.end_sent {
            return None;
        }
        self.end_sent = true;
        self.state = SessionState::AwaitingOutcome;

        let frs = ReplayPayload::from_key_frames(&self.key_frames, INTERPOLATION_STEPS);
        debug!(key_frames = self.key_frames.len(), points = frs.len(), "Submitting replay");
        Some(ClientCommand::End {
            rep: ReplayEnvelope {
                fs: REPLAY_FRAME_SIZE,
                ns: REPLAY_NOMINAL_DURATION,
                fps: REPLAY_FPS,
                frs,
            },
            en: END_FLAG,
        })
    }
}
