use serde::Serialize;
use utoipa::ToSchema;

use crate::state::state_machine::{GamePhase, PauseKind};

/// Game phase as exposed to clients.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisiblePhase {
    /// Waiting for participants.
    Lobby,
    /// Private role briefing.
    Roles,
    /// Questioning round.
    Questioning,
    /// Voting window.
    Vote,
    /// Round result.
    Reveal,
    /// Scoreboard.
    Scoring,
    /// Final results.
    End,
    /// Gameplay suspended.
    Paused,
}

impl From<GamePhase> for VisiblePhase {
    fn from(value: GamePhase) -> Self {
        match value {
            GamePhase::Lobby => VisiblePhase::Lobby,
            GamePhase::Roles => VisiblePhase::Roles,
            GamePhase::Questioning => VisiblePhase::Questioning,
            GamePhase::Vote => VisiblePhase::Vote,
            GamePhase::Reveal => VisiblePhase::Reveal,
            GamePhase::Scoring => VisiblePhase::Scoring,
            GamePhase::End => VisiblePhase::End,
            GamePhase::Paused => VisiblePhase::Paused,
        }
    }
}

/// Why the game is paused.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    /// The host paused it.
    Manual,
    /// The host lost connection.
    HostDisconnected,
}

impl From<PauseKind> for PauseReason {
    fn from(value: PauseKind) -> Self {
        match value {
            PauseKind::Manual => PauseReason::Manual,
            PauseKind::HostDisconnected => PauseReason::HostDisconnected,
        }
    }
}
