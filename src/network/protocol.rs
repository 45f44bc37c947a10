//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON objects tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::core::address::PlayerAddress;
use crate::core::match_id::MatchId;
use crate::game::referee::{MatchError, MoveOutcome};
use crate::game::state::MatchView;
use crate::settlement::Attestation;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a wallet address.
    Auth(AuthRequest),

    /// Open a new match as player A.
    CreateMatch,

    /// Join an open match as player B.
    JoinMatch {
        /// Match to join.
        match_id: MatchId,
    },

    /// Place a mark.
    Move {
        /// Target match.
        match_id: MatchId,
        /// Cell index, row-major 0-8.
        cell: usize,
    },

    /// Fetch (and watch) a match.
    GetMatch {
        /// Match to fetch.
        match_id: MatchId,
    },

    /// Ask for the attestation of a completed match again.
    RetrySettlement {
        /// Completed match.
        match_id: MatchId,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Wallet address the client plays as (any hex case).
    pub address: String,
    /// JWT whose `sub` is the same address. Required when the server has
    /// authentication configured.
    #[serde(default)]
    pub token: Option<String>,
    /// Client version for compatibility check.
    #[serde(default)]
    pub client_version: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Current state of a watched match.
    MatchUpdate(MatchView),

    /// An accepted move and what it did.
    MoveResult(MoveOutcome),

    /// Settlement attestation for a completed match.
    Attestation(Attestation),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time (unix millis).
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Bound address if successful.
    pub address: Option<PlayerAddress>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
    /// Chain id attestations are bound to.
    pub chain_id: u64,
    /// Address the settlement contract should trust.
    pub referee: PlayerAddress,
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error payload.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<&MatchError> for ServerError {
    fn from(err: &MatchError) -> Self {
        Self::new(ErrorCode::from(err), err.to_string())
    }
}

/// Error codes. Stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Address could not be parsed.
    InvalidAddress,
    /// Malformed message.
    InvalidInput,
    /// Match not found.
    NotFound,
    /// Match already has two players.
    AlreadyFull,
    /// Tried to join own match.
    SelfPlay,
    /// Match not in play.
    GameNotActive,
    /// Not the mover's turn.
    NotYourTurn,
    /// Cell already taken.
    CellTaken,
    /// Cell index out of range.
    InvalidIndex,
    /// No match id could be allocated.
    RegistryFull,
    /// Match has no winner yet.
    NotCompleted,
    /// Winner decided, attestation not yet signed.
    SettlementPending,
    /// Connection limit reached.
    ServerOverloaded,
}

impl From<&MatchError> for ErrorCode {
    fn from(err: &MatchError) -> Self {
        match err {
            MatchError::NotFound => ErrorCode::NotFound,
            MatchError::AlreadyFull => ErrorCode::AlreadyFull,
            MatchError::SelfPlay => ErrorCode::SelfPlay,
            MatchError::GameNotActive => ErrorCode::GameNotActive,
            MatchError::NotYourTurn => ErrorCode::NotYourTurn,
            MatchError::CellTaken(_) => ErrorCode::CellTaken,
            MatchError::InvalidIndex(_) => ErrorCode::InvalidIndex,
            MatchError::RegistryFull => ErrorCode::RegistryFull,
            MatchError::NotCompleted => ErrorCode::NotCompleted,
            MatchError::Settlement(_) => ErrorCode::SettlementPending,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::SigningError;

    #[test]
    fn test_parse_move() {
        let msg = ClientMessage::from_json(r#"{"type":"move","match_id":"482913","cell":4}"#).unwrap();
        match msg {
            ClientMessage::Move { match_id, cell } => {
                assert_eq!(match_id.value(), 482_913);
                assert_eq!(cell, 4);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_auth_without_token() {
        let json = r#"{"type":"auth","address":"0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"}"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::Auth(req) => {
                assert!(req.token.is_none());
                assert!(req.client_version.is_empty());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_unit_variant() {
        let msg = ClientMessage::from_json(r#"{"type":"create_match"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CreateMatch));
    }

    #[test]
    fn test_malformed_match_id_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"get_match","match_id":"12"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"move","match_id":"482913","cell":-1}"#).is_err());
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            MatchError::NotFound,
            MatchError::AlreadyFull,
            MatchError::SelfPlay,
            MatchError::GameNotActive,
            MatchError::NotYourTurn,
            MatchError::CellTaken(0),
            MatchError::InvalidIndex(9),
            MatchError::RegistryFull,
            MatchError::NotCompleted,
            MatchError::Settlement(SigningError::Unavailable("x".into())),
        ];
        let codes: Vec<ErrorCode> = errors.iter().map(ErrorCode::from).collect();
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_error_serialization() {
        let msg = ServerMessage::Error(ServerError::from(&MatchError::CellTaken(3)));
        let json = msg.to_json().unwrap();

        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"code\":\"cell_taken\""));
        assert!(json.contains("Cell 3 is already taken"));
    }

    #[test]
    fn test_server_message_roundtrip() {
        let msg = ServerMessage::Pong { timestamp: 5, server_time: 10 };
        let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert!(matches!(parsed, ServerMessage::Pong { timestamp: 5, server_time: 10 }));
    }
}
