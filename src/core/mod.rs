//! Core value types.
//!
//! Wallet addresses and match ids. Both parse from and render to the exact
//! text form used on the wire and in attestations.

pub mod address;
pub mod match_id;

// Re-export core types
pub use address::{AddressError, PlayerAddress, ADDRESS_LEN};
pub use match_id::{MatchId, MatchIdError, MATCH_ID_MAX, MATCH_ID_MIN};
