//! Greedy grouping with widening tolerance bands
//!
//! Walks a rating-ordered snapshot left to right. Each unused player seeds a
//! group; candidates to its right are admitted while their rating sits within
//! the current band of the seed's rating, and the band widens geometrically
//! after every scan until the group is full or the widenings run out.

use crate::types::WaitingPlayer;
use crate::utils::ratings_within_tolerance;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// What happens to players recruited by a seed whose group never fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationPolicy {
    /// Recruits are held in a per-seed scope and released if the group fails
    #[default]
    Provisional,
    /// Recruits stay used for the rest of the pass even if the group fails
    Sticky,
}

impl fmt::Display for ReservationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationPolicy::Provisional => write!(f, "provisional"),
            ReservationPolicy::Sticky => write!(f, "sticky"),
        }
    }
}

impl FromStr for ReservationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "provisional" => Ok(ReservationPolicy::Provisional),
            "sticky" => Ok(ReservationPolicy::Sticky),
            other => Err(format!("unknown reservation policy: {}", other)),
        }
    }
}

/// Parameters of the grouping algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingConfig {
    /// Players per group
    pub group_size: usize,
    /// Tolerance used on the first scan
    pub initial_band: f64,
    /// Factor applied to the band after each scan
    pub band_growth: f64,
    /// Number of scans per seed
    pub max_widenings: u32,
    pub reservation_policy: ReservationPolicy,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            group_size: 10,
            initial_band: 50.0,
            band_growth: 1.5,
            max_widenings: 5,
            reservation_policy: ReservationPolicy::Provisional,
        }
    }
}

/// A complete group, ready to be committed
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    members: Vec<WaitingPlayer>,
    band: f64,
}

impl Group {
    /// The player the group was built around
    pub fn seed(&self) -> &WaitingPlayer {
        &self.members[0]
    }

    /// Members in admission order, seed first
    pub fn members(&self) -> &[WaitingPlayer] {
        &self.members
    }

    pub fn into_members(self) -> Vec<WaitingPlayer> {
        self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Band in force when the last member was admitted
    pub fn band(&self) -> f64 {
        self.band
    }

    /// Largest rating distance between the seed and any member
    pub fn rating_spread(&self) -> f64 {
        let seed = self.seed().rating;
        self.members
            .iter()
            .map(|p| (p.rating - seed).abs())
            .fold(0.0, f64::max)
    }
}

/// Lazily yields complete groups from a rating-ordered snapshot
///
/// The pass-wide used-set lives inside the iterator, so groups yielded by one
/// grouper never share a player. Callers can stop early (for example when a
/// commit fails) without any further work being done.
pub struct GreedyGrouper<'a> {
    players: &'a [WaitingPlayer],
    config: GroupingConfig,
    used: HashSet<&'a str>,
    next_seed: usize,
}

impl<'a> GreedyGrouper<'a> {
    /// `players` must be sorted ascending by rating. A `group_size` of zero
    /// forms no groups.
    pub fn new(players: &'a [WaitingPlayer], config: GroupingConfig) -> Self {
        Self {
            players,
            config,
            used: HashSet::with_capacity(players.len()),
            next_seed: 0,
        }
    }

    /// Number of players placed into groups so far
    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    fn try_seed(&mut self, seed_index: usize) -> Option<Group> {
        let players = self.players;
        let seed = &players[seed_index];
        let group_size = self.config.group_size;
        let sticky = self.config.reservation_policy == ReservationPolicy::Sticky;

        let mut members: Vec<&'a WaitingPlayer> = Vec::with_capacity(group_size);
        let mut reserved: HashSet<&'a str> = HashSet::with_capacity(group_size);
        members.push(seed);
        reserved.insert(seed.id.as_str());

        let mut band = self.config.initial_band;
        let mut admitted_band = band;

        for _ in 0..self.config.max_widenings {
            if members.len() >= group_size {
                break;
            }

            for candidate in &players[seed_index + 1..] {
                if members.len() >= group_size {
                    break;
                }

                let id = candidate.id.as_str();
                if self.used.contains(id) || reserved.contains(id) {
                    continue;
                }

                if ratings_within_tolerance(candidate.rating, seed.rating, band) {
                    members.push(candidate);
                    reserved.insert(id);
                    if sticky {
                        self.used.insert(id);
                    }
                    admitted_band = band;
                }
            }

            band *= self.config.band_growth;
        }

        if members.len() < group_size {
            trace!(
                "Seed '{}' ({:.1}) abandoned with {}/{} players",
                seed.id,
                seed.rating,
                members.len(),
                group_size
            );
            return None;
        }

        self.used.extend(reserved);
        Some(Group {
            members: members.into_iter().cloned().collect(),
            band: admitted_band,
        })
    }
}

impl Iterator for GreedyGrouper<'_> {
    type Item = Group;

    fn next(&mut self) -> Option<Group> {
        if self.config.group_size == 0 {
            return None;
        }

        while self.next_seed < self.players.len() {
            let seed_index = self.next_seed;
            self.next_seed += 1;

            if self.used.contains(self.players[seed_index].id.as_str()) {
                continue;
            }

            if let Some(group) = self.try_seed(seed_index) {
                return Some(group);
            }
        }

        None
    }
}

/// Run a whole pass and collect every group it forms
pub fn form_groups(players: &[WaitingPlayer], config: &GroupingConfig) -> Vec<Group> {
    GreedyGrouper::new(players, config.clone()).collect()
}
