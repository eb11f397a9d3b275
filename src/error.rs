use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::state::{GamePhase, InvalidTransition};

/// Broad classification of a [`GameError`], mirroring how clients react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or out-of-range input.
    Validation,
    /// Action not allowed in the current phase.
    PhaseGuard,
    /// A player or connection limit was hit.
    Capacity,
    /// Caller lacks the rights for the action.
    Authorization,
    /// Token or seat problems.
    Session,
    /// Action conflicts with what the caller already did.
    Conflict,
    /// Target participant is still present and cannot be removed.
    ResourceConflict,
    /// Round setup could not complete.
    Assignment,
}

/// Errors reported back to a single participant. Each one has a stable code and a
/// human-readable message; none of them mutate the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// The frame was not valid JSON.
    #[error("Could not parse message as JSON.")]
    MessageParseFailed,
    /// The frame was JSON but not a recognised message.
    #[error("Message must be JSON with a recognised 'type' field.")]
    InvalidMessage,
    /// Display name failed validation.
    #[error("Please enter a name between 1-20 characters.")]
    NameInvalid,
    /// The connection is already bound to a participant.
    #[error("This connection has already joined the game.")]
    AlreadyJoined,
    /// Round duration outside 1..=30 minutes.
    #[error("Round duration must be between 1-30 minutes.")]
    InvalidDuration,
    /// Round count outside 1..=20.
    #[error("Number of rounds must be between 1-20.")]
    InvalidRounds,
    /// Unknown location pack id.
    #[error("Selected location pack not found.")]
    InvalidPack,
    /// Vote target is unknown or is the voter.
    #[error("Invalid vote target.")]
    InvalidTarget,
    /// Confidence outside 1..=3.
    #[error("Confidence must be 1, 2 or 3.")]
    InvalidConfidence,
    /// Guessed location is not among the candidates.
    #[error("Invalid location selection.")]
    InvalidLocation,
    /// Named participant does not exist.
    #[error("Player not found in the game.")]
    PlayerNotFound,
    /// Action not allowed in the current phase.
    #[error("You can't do that right now.")]
    InvalidPhase,
    /// Joining after the lobby closed.
    #[error("This game has already started.")]
    GameAlreadyStarted,
    /// Configuration changes outside the lobby.
    #[error("Cannot change configuration after game has started.")]
    ConfigLocked,
    /// Action attempted after the game ended.
    #[error("Game has already ended.")]
    GameEnded,
    /// Roster already holds the maximum number of participants.
    #[error("Sorry, this game is full (max 10 players).")]
    GameFull,
    /// Fewer connected participants than a round needs.
    #[error("Need at least 4 players to start the game.")]
    NotEnoughPlayers,
    /// Server-wide connection cap reached.
    #[error("Server is at capacity. Please try again later.")]
    ConnectionLimit,
    /// Host-only command from a non-host.
    #[error("Only the host can perform this action.")]
    NotHost,
    /// Command from a connection with no participant behind it.
    #[error("You are not in the game.")]
    NotInGame,
    /// Location guess from someone other than the impostor.
    #[error("Only the impostor can guess the location.")]
    NotImpostor,
    /// Token does not match any participant.
    #[error("Invalid session. Please join again.")]
    InvalidToken,
    /// Token belongs to a participant gone longer than the reconnect window.
    #[error("Your session has expired. Please join again.")]
    SessionExpired,
    /// Removal of a participant who is connected or only briefly gone.
    #[error("Cannot remove a connected player. Wait for them to disconnect first.")]
    CannotRemoveConnected,
    /// Second ballot from the same participant.
    #[error("You've already submitted your vote.")]
    AlreadyVoted,
    /// Impostor already used their one action this round.
    #[error("You've already made your choice.")]
    AlreadyActed,
    /// Roles could not be dealt.
    #[error("Failed to assign roles. Please try again.")]
    RoleAssignmentFailed,
}

impl GameError {
    /// Stable machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::MessageParseFailed => "MESSAGE_PARSE_FAILED",
            GameError::InvalidMessage => "INVALID_MESSAGE",
            GameError::NameInvalid => "NAME_INVALID",
            GameError::AlreadyJoined => "ALREADY_JOINED",
            GameError::InvalidDuration => "CONFIG_INVALID_DURATION",
            GameError::InvalidRounds => "CONFIG_INVALID_ROUNDS",
            GameError::InvalidPack => "CONFIG_INVALID_PACK",
            GameError::InvalidTarget => "INVALID_TARGET",
            GameError::InvalidConfidence => "INVALID_CONFIDENCE",
            GameError::InvalidLocation => "INVALID_LOCATION",
            GameError::PlayerNotFound => "PLAYER_NOT_FOUND",
            GameError::InvalidPhase => "INVALID_PHASE",
            GameError::GameAlreadyStarted => "GAME_ALREADY_STARTED",
            GameError::ConfigLocked => "CONFIG_GAME_STARTED",
            GameError::GameEnded => "GAME_ENDED",
            GameError::GameFull => "GAME_FULL",
            GameError::NotEnoughPlayers => "NOT_ENOUGH_PLAYERS",
            GameError::ConnectionLimit => "CONNECTION_LIMIT",
            GameError::NotHost => "NOT_HOST",
            GameError::NotInGame => "NOT_IN_GAME",
            GameError::NotImpostor => "NOT_IMPOSTOR",
            GameError::InvalidToken => "INVALID_TOKEN",
            GameError::SessionExpired => "SESSION_EXPIRED",
            GameError::CannotRemoveConnected => "CANNOT_REMOVE_CONNECTED",
            GameError::AlreadyVoted => "ALREADY_VOTED",
            GameError::AlreadyActed => "ALREADY_ACTED",
            GameError::RoleAssignmentFailed => "ROLE_ASSIGNMENT_FAILED",
        }
    }

    /// Category the error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            GameError::MessageParseFailed
            | GameError::InvalidMessage
            | GameError::NameInvalid
            | GameError::InvalidDuration
            | GameError::InvalidRounds
            | GameError::InvalidPack
            | GameError::InvalidTarget
            | GameError::InvalidConfidence
            | GameError::InvalidLocation
            | GameError::PlayerNotFound => ErrorCategory::Validation,
            GameError::InvalidPhase
            | GameError::GameAlreadyStarted
            | GameError::ConfigLocked
            | GameError::GameEnded => ErrorCategory::PhaseGuard,
            GameError::GameFull | GameError::NotEnoughPlayers | GameError::ConnectionLimit => {
                ErrorCategory::Capacity
            }
            GameError::NotHost | GameError::NotInGame | GameError::NotImpostor => {
                ErrorCategory::Authorization
            }
            GameError::InvalidToken
            | GameError::SessionExpired
            | GameError::AlreadyJoined => ErrorCategory::Session,
            GameError::CannotRemoveConnected => ErrorCategory::ResourceConflict,
            GameError::AlreadyVoted | GameError::AlreadyActed => ErrorCategory::Conflict,
            GameError::RoleAssignmentFailed => ErrorCategory::Assignment,
        }
    }
}

impl From<InvalidTransition> for GameError {
    fn from(err: InvalidTransition) -> Self {
        if err.from == GamePhase::End {
            GameError::GameEnded
        } else {
            GameError::InvalidPhase
        }
    }
}

/// Errors raised by the service layer outside the game rules.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The game coordinator task is gone.
    #[error("game coordinator unavailable")]
    CoordinatorUnavailable,
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::CoordinatorUnavailable => AppError::ServiceUnavailable(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
