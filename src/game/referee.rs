//! Match State Machine
//!
//! The referee validates every request against the current match, applies
//! moves, detects wins and draws, and requests an attestation once per won
//! match. All reads and writes go through the injected `MatchRegistry`.
//!
//! ```text
//!   create ──► WAITING ──join──► PLAYING ──winning move──► COMPLETED
//!                                  │  ▲
//!                                  └──┘ move / draw-reset
//! ```

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{env_lookup, parse_var, ConfigError};
use crate::core::address::PlayerAddress;
use crate::core::match_id::MatchId;
use crate::game::board::{Seat, CELL_COUNT};
use crate::game::registry::MatchRegistry;
use crate::game::state::{MatchStatus, MatchView};
use crate::settlement::{Attestation, AttestationSigner, SigningError};

/// Chain id used when none is configured (local dev chain).
pub const DEFAULT_CHAIN_ID: u64 = 31337;

/// Chain id variable.
pub const CHAIN_ID_ENV: &str = "REFEREE_CHAIN_ID";

/// Replay starter variable.
pub const REPLAY_STARTER_ENV: &str = "REFEREE_REPLAY_STARTER";

/// Who opens the board after a draw-reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStarter {
    /// Leave `turn` as it was: the player who filled the last cell opens.
    #[default]
    SameTurn,
    /// Hand the opening move to the other player.
    Alternate,
}

impl FromStr for ReplayStarter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "same" | "same_turn" => Ok(Self::SameTurn),
            "alternate" => Ok(Self::Alternate),
            other => Err(format!("unknown replay starter: {}", other)),
        }
    }
}

/// Referee configuration.
#[derive(Debug, Clone)]
pub struct RefereeConfig {
    /// Chain id bound into every attestation.
    pub chain_id: u64,
    /// Draw-replay starter policy.
    pub replay_starter: ReplayStarter,
}

impl Default for RefereeConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            replay_starter: ReplayStarter::SameTurn,
        }
    }
}

impl RefereeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let chain_id = match parse_var::<u64, _>(&lookup, CHAIN_ID_ENV)? {
            Some(0) => return Err(ConfigError::invalid(CHAIN_ID_ENV, "0", "chain id must be non-zero")),
            Some(id) => id,
            None => defaults.chain_id,
        };

        Ok(Self {
            chain_id,
            replay_starter: parse_var(&lookup, REPLAY_STARTER_ENV)?
                .unwrap_or(defaults.replay_starter),
        })
    }
}

/// Rejected requests. None of these mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// No match with that id.
    #[error("Match not found")]
    NotFound,

    /// Seat B already taken.
    #[error("Match already has two players")]
    AlreadyFull,

    /// Joiner is the creator.
    #[error("Cannot join your own match")]
    SelfPlay,

    /// Match is not accepting moves.
    #[error("Match is not in play")]
    GameNotActive,

    /// Mover does not hold the turn.
    #[error("Not your turn")]
    NotYourTurn,

    /// Target cell already holds a mark.
    #[error("Cell {0} is already taken")]
    CellTaken(usize),

    /// Target cell out of range.
    #[error("Cell index {0} out of range (0-8)")]
    InvalidIndex(usize),

    /// No free match id could be drawn.
    #[error("No match ids available")]
    RegistryFull,

    /// No winner yet, nothing to settle.
    #[error("Match has not completed")]
    NotCompleted,

    /// Signing failed; the win stands and settlement can be retried.
    #[error("Settlement signing failed: {0}")]
    Settlement(#[from] SigningError),
}

/// Settlement state after a winning move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Settlement {
    /// Attestation signed and stored.
    Attested {
        /// The stored attestation.
        attestation: Attestation,
    },
    /// Winner decided, attestation not yet available. Retry via
    /// `Referee::retry_settlement`.
    Pending {
        /// Why signing failed.
        reason: String,
    },
}

/// What an accepted move did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveResult {
    /// Play continues with the other player.
    Continued,
    /// Board filled without a line; board reset for a new round.
    Drawn {
        /// The round now being played.
        round: u32,
    },
    /// The mover completed a line.
    Won {
        /// Winning account.
        winner: PlayerAddress,
        /// Attestation outcome.
        settlement: Settlement,
    },
}

/// Result of `apply_move`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveOutcome {
    /// Match after the move (and after signing, on a win).
    pub view: MatchView,
    /// What happened.
    pub result: MoveResult,
}

impl MoveOutcome {
    /// True when a win is awaiting its attestation.
    pub fn settlement_pending(&self) -> bool {
        matches!(
            self.result,
            MoveResult::Won { settlement: Settlement::Pending { .. }, .. }
        )
    }
}

/// Board change decided under the match lock.
enum Transition {
    Continued,
    Drawn(u32),
    Won(PlayerAddress),
}

/// Next settlement step, decided under the match lock.
enum SettleStep {
    Stored(Attestation),
    Sign(PlayerAddress),
}

/// The match authority.
pub struct Referee {
    config: RefereeConfig,
    registry: Arc<MatchRegistry>,
    signer: Arc<dyn AttestationSigner>,
}

impl Referee {
    /// Create a referee over an existing registry and signer.
    pub fn new(
        config: RefereeConfig,
        registry: Arc<MatchRegistry>,
        signer: Arc<dyn AttestationSigner>,
    ) -> Self {
        Self { config, registry, signer }
    }

    /// Referee configuration.
    pub fn config(&self) -> &RefereeConfig {
        &self.config
    }

    /// Address attestations are signed with.
    pub fn signer_address(&self) -> PlayerAddress {
        self.signer.address()
    }

    /// Underlying registry.
    pub fn registry(&self) -> &Arc<MatchRegistry> {
        &self.registry
    }

    /// Open a match for `player_a`.
    pub async fn create_match(&self, player_a: PlayerAddress) -> Result<MatchView, MatchError> {
        let created = self.registry.create(player_a).await?;
        info!("Match {} created by {}", created.id, player_a.short());
        Ok(created.view())
    }

    /// Seat `player_b` in match `id`.
    pub async fn join_match(
        &self,
        id: &MatchId,
        player_b: PlayerAddress,
    ) -> Result<MatchView, MatchError> {
        let joined = self.registry.join(id, player_b).await?;
        info!("Match {} joined by {}", id, player_b.short());
        Ok(joined.view())
    }

    /// Current state of match `id`.
    pub async fn get_match(&self, id: &MatchId) -> Result<MatchView, MatchError> {
        self.registry
            .get(id)
            .await
            .map(|m| m.view())
            .ok_or(MatchError::NotFound)
    }

    /// Place `mover`'s mark on `cell`.
    pub async fn apply_move(
        &self,
        id: &MatchId,
        mover: PlayerAddress,
        cell: usize,
    ) -> Result<MoveOutcome, MatchError> {
        let replay_starter = self.config.replay_starter;

        let (transition, view) = self
            .registry
            .update(id, |m| {
                if m.status != MatchStatus::Playing {
                    return Err(MatchError::GameNotActive);
                }
                if m.seat_of(&mover) != Some(m.turn) {
                    return Err(MatchError::NotYourTurn);
                }
                if cell >= CELL_COUNT {
                    return Err(MatchError::InvalidIndex(cell));
                }

                let seat = m.turn;
                if !m.board.place(cell, seat.mark()) {
                    return Err(MatchError::CellTaken(cell));
                }
                m.moves += 1;
                m.touch();

                let transition = if let Some(mark) = m.board.winner() {
                    m.status = MatchStatus::Completed;
                    m.winner = Some(mark.seat());
                    Transition::Won(mover)
                } else if m.board.is_full() {
                    m.board.clear();
                    m.round += 1;
                    if replay_starter == ReplayStarter::Alternate {
                        m.turn = seat.other();
                    }
                    Transition::Drawn(m.round)
                } else {
                    m.turn = seat.other();
                    Transition::Continued
                };

                Ok((transition, m.view()))
            })
            .await?;

        let result = match transition {
            Transition::Continued => {
                return Ok(MoveOutcome { view, result: MoveResult::Continued });
            }
            Transition::Drawn(round) => {
                info!("Match {} drawn, starting round {}", id, round);
                return Ok(MoveOutcome { view, result: MoveResult::Drawn { round } });
            }
            Transition::Won(winner) => {
                info!("Match {} won by {}", id, winner.short());
                let settlement = match self.settle(id).await {
                    Ok(attestation) => Settlement::Attested { attestation },
                    Err(MatchError::Settlement(e)) => Settlement::Pending { reason: e.to_string() },
                    Err(e) => return Err(e),
                };
                MoveResult::Won { winner, settlement }
            }
        };

        let view = self.get_match(id).await?;
        Ok(MoveOutcome { view, result })
    }

    /// Sign (or return the stored) attestation for a completed match,
    /// without re-running win detection.
    pub async fn retry_settlement(&self, id: &MatchId) -> Result<Attestation, MatchError> {
        self.settle(id).await
    }

    /// Attestation for `id`: the stored one, or a fresh signature stored
    /// exactly once.
    async fn settle(&self, id: &MatchId) -> Result<Attestation, MatchError> {
        let step = self
            .registry
            .update(id, |m| match (&m.attestation, m.winner_address()) {
                (Some(existing), _) => Ok(SettleStep::Stored(existing.clone())),
                (None, Some(winner)) => Ok(SettleStep::Sign(winner)),
                (None, None) => Err(MatchError::NotCompleted),
            })
            .await?;

        let winner = match step {
            SettleStep::Sign(winner) => winner,
            SettleStep::Stored(existing) => return Ok(existing),
        };

        // Signing runs outside the match lock; the match is already
        // consistently Completed.
        let signed = match self.signer.sign(self.config.chain_id, id, &winner) {
            Ok(signed) => signed,
            Err(e) => {
                warn!("Settlement pending for match {}: {}", id, e);
                return Err(e.into());
            }
        };

        self.registry
            .update(id, |m| {
                // A concurrent settle may have won the race; keep the first.
                let stored = m.attestation.get_or_insert(signed).clone();
                m.touch();
                Ok(stored)
            })
            .await
    }
}
