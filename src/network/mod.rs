//! Network Layer
//!
//! WebSocket server that lets wallet clients play matches.
//! All match rules run through `game/`; this layer only authenticates,
//! routes requests and fans out updates.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{authenticate, validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{
    AuthRequest, AuthResult, ClientMessage, ErrorCode, ServerError, ServerMessage,
};
pub use server::{RefereeServer, RefereeServerError, ServerConfig};
