//! Queue storage interface and the in-memory implementation
//!
//! The store is the only shared mutable resource in the service: ingress writes
//! to it and the matching engine reads snapshots from it and commits matches
//! against it. Implementations provide their own concurrency control.

use crate::error::{MatchmakingError, Result};
use crate::types::{JoinRequest, PlayerId, WaitingPlayer};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Trait for queue storage operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add a player to the queue, replacing any existing entry with the same id
    async fn enqueue(&self, request: JoinRequest) -> Result<WaitingPlayer>;

    /// Remove a player from the queue. Returns false if the player was not queued.
    async fn dequeue(&self, player_id: &str) -> Result<bool>;

    /// Up to `limit` waiting players, ascending by rating
    async fn peek(&self, limit: usize) -> Result<Vec<WaitingPlayer>>;

    /// Remove every player of a formed group, all or nothing
    async fn commit_match(&self, players: &[WaitingPlayer]) -> Result<()>;

    /// Number of players currently waiting
    async fn queue_size(&self) -> Result<usize>;
}

/// Reject requests that could never be matched sensibly
pub fn validate_join_request(request: &JoinRequest) -> std::result::Result<(), MatchmakingError> {
    if request.player_id.trim().is_empty() {
        return Err(MatchmakingError::InvalidJoinRequest {
            reason: "missing player_id".to_string(),
        });
    }

    if !request.mmr.is_finite() || request.mmr <= 0.0 {
        return Err(MatchmakingError::InvalidJoinRequest {
            reason: "invalid mmr".to_string(),
        });
    }

    Ok(())
}

/// Ordering key for the rating index: rating first, then id
#[derive(Debug, Clone)]
struct RatingKey {
    rating: f64,
    id: PlayerId,
}

impl RatingKey {
    fn of(player: &WaitingPlayer) -> Self {
        Self {
            rating: player.rating,
            id: player.id.clone(),
        }
    }
}

impl PartialEq for RatingKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RatingKey {}

impl PartialOrd for RatingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RatingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rating
            .total_cmp(&other.rating)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    players: HashMap<PlayerId, WaitingPlayer>,
    by_rating: BTreeSet<RatingKey>,
}

impl QueueState {
    fn insert(&mut self, player: WaitingPlayer) {
        if let Some(previous) = self.players.remove(&player.id) {
            self.by_rating.remove(&RatingKey::of(&previous));
        }
        self.by_rating.insert(RatingKey::of(&player));
        self.players.insert(player.id.clone(), player);
    }

    fn remove(&mut self, player_id: &str) -> Option<WaitingPlayer> {
        let removed = self.players.remove(player_id)?;
        self.by_rating.remove(&RatingKey::of(&removed));
        Some(removed)
    }

    /// True if the exact entry captured in a snapshot is still queued
    fn holds(&self, player: &WaitingPlayer) -> bool {
        self.players
            .get(&player.id)
            .is_some_and(|queued| queued.joined_at == player.joined_at)
    }
}

/// In-memory queue store with a rating-ordered index
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    state: RwLock<QueueState>,
}

impl InMemoryQueueStore {
    /// Create an empty in-memory queue store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, QueueState>> {
        self.state.read().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire queue read lock".to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, QueueState>> {
        self.state.write().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire queue write lock".to_string(),
            }
            .into()
        })
    }

    /// Whether the given player is currently queued
    pub fn contains(&self, player_id: &str) -> Result<bool> {
        Ok(self.read()?.players.contains_key(player_id))
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, request: JoinRequest) -> Result<WaitingPlayer> {
        validate_join_request(&request)?;

        let player = WaitingPlayer {
            id: request.player_id,
            rating: request.mmr,
            joined_at: current_timestamp(),
        };

        self.write()?.insert(player.clone());
        Ok(player)
    }

    async fn dequeue(&self, player_id: &str) -> Result<bool> {
        Ok(self.write()?.remove(player_id).is_some())
    }

    async fn peek(&self, limit: usize) -> Result<Vec<WaitingPlayer>> {
        let state = self.read()?;

        let snapshot = state
            .by_rating
            .iter()
            .take(limit)
            .filter_map(|key| state.players.get(&key.id).cloned())
            .collect();

        Ok(snapshot)
    }

    async fn commit_match(&self, players: &[WaitingPlayer]) -> Result<()> {
        let mut seen = HashSet::with_capacity(players.len());
        if let Some(duplicate) = players.iter().find(|p| !seen.insert(p.id.as_str())) {
            return Err(MatchmakingError::InternalError {
                message: format!("Group lists player '{}' twice", duplicate.id),
            }
            .into());
        }

        let mut state = self.write()?;

        // Validate the whole group before touching anything
        let missing: Vec<String> = players
            .iter()
            .filter(|p| !state.holds(p))
            .map(|p| p.id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(MatchmakingError::StaleGroup {
                missing: missing.len(),
                player_ids: missing,
            }
            .into());
        }

        for player in players {
            state.remove(&player.id);
        }

        Ok(())
    }

    async fn queue_size(&self) -> Result<usize> {
        Ok(self.read()?.players.len())
    }
}
