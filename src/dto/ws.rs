use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{dto::view::StateView, error::GameError};

/// Messages accepted from participant WebSocket clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Take a seat under `name`.
    Join {
        /// Requested display name.
        name: String,
    },
    /// Reclaim a seat with a previously issued token.
    Reconnect {
        /// Session token from `joined`.
        token: String,
    },
    /// Liveness signal, sent every few seconds.
    Heartbeat,
    /// Accuse someone.
    Vote {
        /// Accused participant.
        target: String,
        /// Wager from 1 to 3; range-checked when the ballot is cast.
        confidence: i64,
    },
    /// Impostor-only: name the location instead of voting.
    SpyGuess {
        /// Location name.
        location: String,
    },
    /// End questioning early.
    CallVote,
    /// Host-only command.
    Admin(AdminCommand),
    /// Anything else.
    #[serde(other)]
    Unknown,
}

/// Host commands, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AdminCommand {
    /// Deal the first round.
    StartGame,
    /// Drop a long-disconnected participant from the lobby.
    RemovePlayer {
        /// Participant to remove.
        #[serde(alias = "playerName")]
        name: String,
    },
    /// Change one setting.
    Configure {
        /// Setting to change.
        field: ConfigField,
        /// New value.
        #[schema(value_type = Object)]
        value: serde_json::Value,
    },
    /// Suspend gameplay.
    Pause,
    /// Continue after a pause.
    Resume,
    /// Jump to the final results.
    EndGame,
    /// Hand the question to the next participant.
    AdvanceTurn,
    /// Play again with the same roster.
    NewSession,
    /// Anything else.
    #[serde(other)]
    Unknown,
}

/// Settings the host may change from the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ConfigField {
    /// Questioning length in minutes.
    #[serde(alias = "round_duration_minutes")]
    RoundDurationMinutes,
    /// Rounds per game.
    #[serde(alias = "num_rounds")]
    NumRounds,
    /// Location pack id.
    #[serde(alias = "location_pack")]
    LocationPack,
}

impl ClientMessage {
    /// Parse a text frame, distinguishing broken JSON from unrecognised messages.
    pub fn parse(text: &str) -> Result<Self, GameError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|_| GameError::MessageParseFailed)?;
        match serde_json::from_value(value) {
            Ok(ClientMessage::Unknown) | Ok(ClientMessage::Admin(AdminCommand::Unknown)) => {
                Err(GameError::InvalidMessage)
            }
            Ok(message) => Ok(message),
            Err(_) => Err(GameError::InvalidMessage),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Reconnect { .. } => "reconnect",
            ClientMessage::Heartbeat => "heartbeat",
            ClientMessage::Vote { .. } => "vote",
            ClientMessage::SpyGuess { .. } => "spyGuess",
            ClientMessage::CallVote => "callVote",
            ClientMessage::Admin(_) => "admin",
            ClientMessage::Unknown => "unknown",
        }
    }
}

/// Messages pushed to participant clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// First frame on every connection.
    Welcome(WelcomeMessage),
    /// Seat granted through `join`.
    Joined(SessionGrant),
    /// Seat reclaimed through `reconnect`.
    Restored(SessionGrant),
    /// Fresh state snapshot.
    State(Box<StateView>),
    /// A request was rejected.
    Error(ErrorMessage),
}

impl ServerMessage {
    /// Serialise into a text frame payload.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<&GameError> for ServerMessage {
    fn from(err: &GameError) -> Self {
        ServerMessage::Error(ErrorMessage {
            code: err.code().to_owned(),
            message: err.to_string(),
        })
    }
}

/// Payload of `welcome`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMessage {
    /// Identifier of this connection.
    pub connection_id: Uuid,
    /// Version of the server build.
    pub server_version: String,
}

impl WelcomeMessage {
    /// Welcome for `connection_id`, stamped with the crate version.
    pub fn new(connection_id: Uuid) -> Self {
        Self {
            connection_id,
            server_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// Payload of `joined` and `restored`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    /// Seat name.
    pub name: String,
    /// Token to reconnect with.
    pub token: String,
    /// Whether the seat hosts the game.
    pub is_host: bool,
}

/// Payload of `error`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorMessage {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable text.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_participant_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"join","name":"Ann"}"#).unwrap(),
            ClientMessage::Join { name: "Ann".into() }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"heartbeat","ts":12}"#).unwrap(),
            ClientMessage::Heartbeat
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"vote","target":"Bob","confidence":3}"#).unwrap(),
            ClientMessage::Vote {
                target: "Bob".into(),
                confidence: 3
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"vote","target":"Bob","confidence":256}"#).unwrap(),
            ClientMessage::Vote {
                target: "Bob".into(),
                confidence: 256
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"spyGuess","location":"Beach"}"#).unwrap(),
            ClientMessage::SpyGuess {
                location: "Beach".into()
            }
        );
    }

    #[test]
    fn parses_admin_commands() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"admin","action":"startGame"}"#).unwrap(),
            ClientMessage::Admin(AdminCommand::StartGame)
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"admin","action":"removePlayer","playerName":"Bob"}"#)
                .unwrap(),
            ClientMessage::Admin(AdminCommand::RemovePlayer { name: "Bob".into() })
        );
        assert_eq!(
            ClientMessage::parse(
                r#"{"type":"admin","action":"configure","field":"num_rounds","value":3}"#
            )
            .unwrap(),
            ClientMessage::Admin(AdminCommand::Configure {
                field: ConfigField::NumRounds,
                value: serde_json::json!(3),
            })
        );
    }

    #[test]
    fn distinguishes_parse_failures_from_unknown_messages() {
        assert_eq!(
            ClientMessage::parse("{nope").unwrap_err(),
            GameError::MessageParseFailed
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"dance"}"#).unwrap_err(),
            GameError::InvalidMessage
        );
        assert_eq!(
            ClientMessage::parse(r#"{"name":"Ann"}"#).unwrap_err(),
            GameError::InvalidMessage
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"vote","target":"Bob","confidence":"high"}"#)
                .unwrap_err(),
            GameError::InvalidMessage
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"admin","action":"explode"}"#).unwrap_err(),
            GameError::InvalidMessage
        );
    }

    #[test]
    fn server_messages_carry_their_type() {
        let json = ServerMessage::from(&GameError::NotHost).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "NOT_HOST");

        let grant = ServerMessage::Joined(SessionGrant {
            name: "Ann".into(),
            token: "abc".into(),
            is_host: true,
        });
        let value: serde_json::Value = serde_json::from_str(&grant.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "joined");
        assert_eq!(value["isHost"], true);
    }
}
