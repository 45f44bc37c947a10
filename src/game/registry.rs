//! Match Registry
//!
//! In-memory store of live matches. Every mutation goes through here so each
//! match has exactly one serialization point: its own `Mutex`. The map lock
//! is held only for lookup and insert, so work on different matches never
//! contends.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::core::address::PlayerAddress;
use crate::core::match_id::MatchId;
use crate::game::referee::MatchError;
use crate::game::state::{Match, MatchStatus};

/// Id draws attempted before `create` gives up.
pub const MAX_ID_DRAWS: usize = 64;

/// Keyed store of matches.
pub struct MatchRegistry {
    /// Live matches.
    matches: RwLock<BTreeMap<MatchId, Arc<Mutex<Match>>>>,
    /// Id source.
    rng: Mutex<StdRng>,
}

impl MatchRegistry {
    /// Create an empty registry seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty registry with a fixed id sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            matches: RwLock::new(BTreeMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Allocate a fresh match in `Waiting` owned by `player_a`.
    ///
    /// Fails with `RegistryFull` when `MAX_ID_DRAWS` draws all hit live ids.
    pub async fn create(&self, player_a: PlayerAddress) -> Result<Match, MatchError> {
        let mut matches = self.matches.write().await;
        let mut rng = self.rng.lock().await;

        let id = (0..MAX_ID_DRAWS)
            .map(|_| MatchId::random(&mut *rng))
            .find(|candidate| {
                let taken = matches.contains_key(candidate);
                if taken {
                    debug!("Match id {} already live, redrawing", candidate);
                }
                !taken
            });

        let Some(id) = id else {
            warn!("No free match id after {} draws ({} live)", MAX_ID_DRAWS, matches.len());
            return Err(MatchError::RegistryFull);
        };

        let entry = Match::new(id, player_a);
        matches.insert(id, Arc::new(Mutex::new(entry.clone())));
        Ok(entry)
    }

    /// Snapshot of a match.
    pub async fn get(&self, id: &MatchId) -> Option<Match> {
        let slot = self.slot(id).await?;
        let guard = slot.lock().await;
        Some(guard.clone())
    }

    /// Seat `player_b` and start play.
    pub async fn join(&self, id: &MatchId, player_b: PlayerAddress) -> Result<Match, MatchError> {
        self.update(id, |m| {
            if m.player_b.is_some() {
                return Err(MatchError::AlreadyFull);
            }
            if m.player_a == player_b {
                return Err(MatchError::SelfPlay);
            }

            m.player_b = Some(player_b);
            m.status = MatchStatus::Playing;
            m.touch();
            Ok(m.clone())
        })
        .await
    }

    /// Run `f` against the match under its lock.
    ///
    /// `f` must leave the match untouched when it returns an error.
    pub async fn update<T, F>(&self, id: &MatchId, f: F) -> Result<T, MatchError>
    where
        F: FnOnce(&mut Match) -> Result<T, MatchError>,
    {
        let slot = self.slot(id).await.ok_or(MatchError::NotFound)?;
        let mut guard = slot.lock().await;
        f(&mut guard)
    }

    /// Number of live matches.
    pub async fn len(&self) -> usize {
        self.matches.read().await.len()
    }

    /// True when no matches are live.
    pub async fn is_empty(&self) -> bool {
        self.matches.read().await.is_empty()
    }

    async fn slot(&self, id: &MatchId) -> Option<Arc<Mutex<Match>>> {
        let matches = self.matches.read().await;
        matches.get(id).cloned()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Seat;

    fn addr(b: u8) -> PlayerAddress {
        PlayerAddress::new([b; 20])
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = MatchRegistry::with_seed(1);
        let created = registry.create(addr(1)).await.unwrap();

        let fetched = registry.get(&created.id).await.unwrap();
        assert_eq!(fetched.player_a, addr(1));
        assert_eq!(fetched.status, MatchStatus::Waiting);
        assert_eq!(fetched.turn, Seat::A);
        assert!(fetched.board.is_empty());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_ids_unique() {
        let registry = MatchRegistry::with_seed(2);
        let mut seen = std::collections::BTreeSet::new();
        for i in 0..500u32 {
            let m = registry.create(addr((i % 200) as u8)).await.unwrap();
            assert!(seen.insert(m.id));
        }
        assert_eq!(registry.len().await, 500);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let registry = MatchRegistry::with_seed(3);
        let id = MatchId::new(123_456).unwrap();
        assert!(registry.get(&id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_join_transitions_to_playing() {
        let registry = MatchRegistry::with_seed(4);
        let m = registry.create(addr(1)).await.unwrap();

        let joined = registry.join(&m.id, addr(2)).await.unwrap();
        assert_eq!(joined.player_b, Some(addr(2)));
        assert_eq!(joined.status, MatchStatus::Playing);
    }

    #[tokio::test]
    async fn test_join_errors() {
        let registry = MatchRegistry::with_seed(5);
        let m = registry.create(addr(1)).await.unwrap();

        let missing = if m.id.value() == 100_000 { 100_001 } else { 100_000 };
        let missing = MatchId::new(missing).unwrap();
        assert!(matches!(registry.join(&missing, addr(2)).await, Err(MatchError::NotFound)));
        assert!(matches!(registry.join(&m.id, addr(1)).await, Err(MatchError::SelfPlay)));

        registry.join(&m.id, addr(2)).await.unwrap();
        assert!(matches!(registry.join(&m.id, addr(3)).await, Err(MatchError::AlreadyFull)));

        // Failed joins left the match alone
        let after = registry.get(&m.id).await.unwrap();
        assert_eq!(after.player_b, Some(addr(2)));
    }

    #[tokio::test]
    async fn test_create_gives_up_when_draws_exhausted() {
        let registry = MatchRegistry::with_seed(7);

        // Occupy every id the seeded rng will offer next
        let mut shadow = StdRng::seed_from_u64(7);
        {
            let mut matches = registry.matches.write().await;
            for _ in 0..MAX_ID_DRAWS {
                let id = MatchId::random(&mut shadow);
                matches.insert(id, Arc::new(Mutex::new(Match::new(id, addr(9)))));
            }
        }
        let live = registry.len().await;

        assert!(matches!(registry.create(addr(1)).await, Err(MatchError::RegistryFull)));
        assert_eq!(registry.len().await, live);

        // The registry stays usable: locks were released and the next draws are fresh
        let any = *registry.matches.read().await.keys().next().unwrap();
        assert!(registry.get(&any).await.is_some());
        let created = registry.create(addr(1)).await.unwrap();
        assert_eq!(created.player_a, addr(1));
    }

    #[tokio::test]
    async fn test_independent_registries() {
        let a = MatchRegistry::with_seed(9);
        let b = MatchRegistry::with_seed(9);

        let m = a.create(addr(1)).await.unwrap();
        assert!(b.get(&m.id).await.is_none());
        assert_eq!(a.len().await, 1);
        assert_eq!(b.len().await, 0);
    }
}
