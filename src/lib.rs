//! # Wager Referee
//!
//! Off-chain referee for two-player Tic-Tac-Toe wagers. It owns match state,
//! enforces move legality, replays drawn boards until someone wins, and signs
//! an attestation of the winner that a settlement contract can verify.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WAGER REFEREE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config.rs        - Environment parsing                      │
//! │                                                              │
//! │  core/            - Value types                              │
//! │  ├── address.rs   - 20-byte wallet address                   │
//! │  └── match_id.rs  - 6-digit match identifier                 │
//! │                                                              │
//! │  game/            - Match rules                              │
//! │  ├── board.rs     - Cells, marks, win detection              │
//! │  ├── state.rs     - Match record and public view             │
//! │  ├── registry.rs  - Concurrent match store                   │
//! │  └── referee.rs   - Create/join/move state machine           │
//! │                                                              │
//! │  settlement/      - Winner attestations                      │
//! │  ├── encoding.rs  - Packed payload, keccak, EIP-191          │
//! │  └── signer.rs    - secp256k1 signer and verification        │
//! │                                                              │
//! │  network/         - WebSocket request layer                  │
//! │  ├── server.rs    - Connection handling and fan-out          │
//! │  ├── protocol.rs  - Message types                            │
//! │  └── auth.rs      - Wallet-bound JWT auth                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Settlement
//!
//! A won match is never reopened. If signing fails the match stays
//! `COMPLETED` with no attestation and signing can be retried without
//! re-running win detection. The first stored attestation is final.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;
pub mod settlement;

// Re-export commonly used types
pub use core::address::PlayerAddress;
pub use core::match_id::MatchId;
pub use game::referee::{MatchError, MoveOutcome, MoveResult, Referee, RefereeConfig, ReplayStarter};
pub use game::registry::MatchRegistry;
pub use game::state::{MatchStatus, MatchView};
pub use settlement::{Attestation, AttestationSigner, EcdsaSigner};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
