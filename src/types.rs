//! Common types used throughout the matchmaking service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players
pub type PlayerId = String;

/// Unique identifier for formed matches
pub type MatchId = Uuid;

/// A player sitting in the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingPlayer {
    #[serde(rename = "player_id")]
    pub id: PlayerId,
    #[serde(rename = "mmr")]
    pub rating: f64,
    pub joined_at: DateTime<Utc>,
}

/// Request to join the matchmaking queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub player_id: PlayerId,
    pub mmr: f64,
}

/// Request to leave the matchmaking queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub player_id: PlayerId,
}

/// A committed group of players
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: MatchId,
    pub players: Vec<WaitingPlayer>,
    pub formed_at: DateTime<Utc>,
}

impl Match {
    /// Ids of every player in the match, in admission order
    pub fn player_ids(&self) -> Vec<&str> {
        self.players.iter().map(|p| p.id.as_str()).collect()
    }
}

/// Events fanned out to notification subscribers
///
/// Serialized as `{"type": "match_found", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MatchEvent {
    MatchFound(Match),
}

impl MatchEvent {
    /// Event type tag as it appears on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            MatchEvent::MatchFound(_) => "match_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::current_timestamp;

    #[test]
    fn test_match_event_wire_shape() {
        let event = MatchEvent::MatchFound(Match {
            match_id: Uuid::new_v4(),
            players: vec![WaitingPlayer {
                id: "p1".to_string(),
                rating: 1500.0,
                joined_at: current_timestamp(),
            }],
            formed_at: current_timestamp(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "match_found");
        assert_eq!(value["payload"]["players"][0]["player_id"], "p1");
        assert_eq!(value["payload"]["players"][0]["mmr"], 1500.0);
        assert_eq!(event.event_type(), "match_found");
    }

    #[test]
    fn test_join_request_parsing() {
        let request: JoinRequest =
            serde_json::from_str(r#"{"player_id":"alice","mmr":1234.5}"#).unwrap();
        assert_eq!(request.player_id, "alice");
        assert_eq!(request.mmr, 1234.5);
    }
}
