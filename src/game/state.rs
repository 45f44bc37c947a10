//! Match State Definitions
//!
//! The `Match` entity and the serializable view handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::address::PlayerAddress;
use crate::core::match_id::MatchId;
use crate::game::board::{Board, Seat, CELL_COUNT};
use crate::settlement::Attestation;

/// Match lifecycle. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// Created, waiting for an opponent.
    Waiting,
    /// Both seats filled, moves accepted.
    Playing,
    /// A winning line was made.
    Completed,
}

/// A single wagered game between two accounts.
#[derive(Clone, Debug)]
pub struct Match {
    /// Match identifier.
    pub id: MatchId,
    /// Creator (seat A, mark X).
    pub player_a: PlayerAddress,
    /// Joiner (seat B, mark O).
    pub player_b: Option<PlayerAddress>,
    /// Current board.
    pub board: Board,
    /// Seat allowed to move next.
    pub turn: Seat,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Winning seat, once decided.
    pub winner: Option<Seat>,
    /// Settlement attestation, once signed.
    pub attestation: Option<Attestation>,
    /// Draw-replay round, starting at 1.
    pub round: u32,
    /// Accepted moves across all rounds.
    pub moves: u32,
    /// When the match was created.
    pub created_at: DateTime<Utc>,
    /// Last accepted mutation.
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// A fresh match in `Waiting`.
    pub fn new(id: MatchId, player_a: PlayerAddress) -> Self {
        let now = Utc::now();
        Self {
            id,
            player_a,
            player_b: None,
            board: Board::new(),
            turn: Seat::A,
            status: MatchStatus::Waiting,
            winner: None,
            attestation: None,
            round: 1,
            moves: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Address sitting in `seat`, if occupied.
    pub fn address_of(&self, seat: Seat) -> Option<PlayerAddress> {
        match seat {
            Seat::A => Some(self.player_a),
            Seat::B => self.player_b,
        }
    }

    /// Seat occupied by `address`, if it plays in this match.
    pub fn seat_of(&self, address: &PlayerAddress) -> Option<Seat> {
        if *address == self.player_a {
            Some(Seat::A)
        } else if self.player_b.as_ref() == Some(address) {
            Some(Seat::B)
        } else {
            None
        }
    }

    /// Address of the winner, once decided.
    pub fn winner_address(&self) -> Option<PlayerAddress> {
        self.winner.and_then(|seat| self.address_of(seat))
    }

    /// Completed with a winner but no attestation stored yet.
    pub fn settlement_pending(&self) -> bool {
        self.status == MatchStatus::Completed && self.attestation.is_none()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Snapshot for callers.
    pub fn view(&self) -> MatchView {
        MatchView {
            match_id: self.id,
            player_a: self.player_a,
            player_b: self.player_b,
            board: self.board.to_bytes(),
            turn: self.address_of(self.turn),
            status: self.status,
            winner: self.winner_address(),
            attestation: self.attestation.clone(),
            settlement_pending: self.settlement_pending(),
            round: self.round,
            moves: self.moves,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Serializable match snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchView {
    /// Match identifier.
    pub match_id: MatchId,
    /// Creator.
    pub player_a: PlayerAddress,
    /// Joiner, once joined.
    pub player_b: Option<PlayerAddress>,
    /// Board cells: 0 empty, 1 X (player A), 2 O (player B).
    pub board: [u8; CELL_COUNT],
    /// Address to move next (absent only while seat B is open and it is B's turn).
    pub turn: Option<PlayerAddress>,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Winner address.
    pub winner: Option<PlayerAddress>,
    /// Settlement attestation.
    pub attestation: Option<Attestation>,
    /// Winner decided but attestation not yet signed.
    pub settlement_pending: bool,
    /// Draw-replay round.
    pub round: u32,
    /// Accepted moves.
    pub moves: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> PlayerAddress {
        PlayerAddress::new([b; 20])
    }

    #[test]
    fn test_new_match_defaults() {
        let id = MatchId::new(123_456).unwrap();
        let m = Match::new(id, addr(1));

        assert_eq!(m.status, MatchStatus::Waiting);
        assert_eq!(m.turn, Seat::A);
        assert!(m.board.is_empty());
        assert!(m.player_b.is_none());
        assert_eq!(m.round, 1);
    }

    #[test]
    fn test_seat_lookup() {
        let mut m = Match::new(MatchId::new(100_000).unwrap(), addr(1));
        assert_eq!(m.seat_of(&addr(1)), Some(Seat::A));
        assert_eq!(m.seat_of(&addr(2)), None);

        m.player_b = Some(addr(2));
        assert_eq!(m.seat_of(&addr(2)), Some(Seat::B));
        assert_eq!(m.address_of(Seat::B), Some(addr(2)));
    }

    #[test]
    fn test_view_serializes_status_uppercase() {
        let m = Match::new(MatchId::new(100_001).unwrap(), addr(1));
        let json = serde_json::to_string(&m.view()).unwrap();

        assert!(json.contains("\"status\":\"WAITING\""));
        assert!(json.contains("\"match_id\":\"100001\""));
        assert!(json.contains("\"board\":[0,0,0,0,0,0,0,0,0]"));
    }

    #[test]
    fn test_settlement_pending_flag() {
        let mut m = Match::new(MatchId::new(100_002).unwrap(), addr(1));
        m.player_b = Some(addr(2));
        m.status = MatchStatus::Completed;
        m.winner = Some(Seat::B);

        assert!(m.settlement_pending());
        assert_eq!(m.winner_address(), Some(addr(2)));
        assert!(m.view().settlement_pending);
    }
}
