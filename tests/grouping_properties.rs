//! Property tests for greedy grouping

use lineup::matching::{form_groups, GroupingConfig, ReservationPolicy};
use lineup::types::WaitingPlayer;
use lineup::utils::{current_timestamp, ratings_within_tolerance};
use proptest::prelude::*;
use std::collections::HashSet;

fn snapshot(mut ratings: Vec<f64>) -> Vec<WaitingPlayer> {
    ratings.sort_by(|a, b| a.total_cmp(b));
    let joined_at = current_timestamp();
    ratings
        .into_iter()
        .enumerate()
        .map(|(i, rating)| WaitingPlayer {
            id: format!("p{:03}", i),
            rating,
            joined_at,
        })
        .collect()
}

fn widest_band(config: &GroupingConfig) -> f64 {
    let mut band = config.initial_band;
    for _ in 1..config.max_widenings {
        band *= config.band_growth;
    }
    band
}

fn grouping_config() -> impl Strategy<Value = GroupingConfig> {
    (
        2usize..6,
        1.0f64..80.0,
        1.0f64..2.0,
        1u32..5,
        prop_oneof![
            Just(ReservationPolicy::Provisional),
            Just(ReservationPolicy::Sticky)
        ],
    )
        .prop_map(
            |(group_size, initial_band, band_growth, max_widenings, reservation_policy)| {
                GroupingConfig {
                    group_size,
                    initial_band,
                    band_growth,
                    max_widenings,
                    reservation_policy,
                }
            },
        )
}

proptest! {
    #[test]
    fn groups_are_full_disjoint_and_within_band(
        ratings in prop::collection::vec(800.0f64..1600.0, 0..60),
        config in grouping_config(),
    ) {
        let players = snapshot(ratings);
        let groups = form_groups(&players, &config);
        let widest = widest_band(&config);

        let mut seen = HashSet::new();
        for group in &groups {
            prop_assert_eq!(group.len(), config.group_size);
            prop_assert!(group.band() <= widest + 1e-9);

            let seed = group.seed();
            for member in group.members() {
                prop_assert!(seen.insert(member.id.clone()), "{} grouped twice", member.id);
                prop_assert!(member.rating >= seed.rating);
                prop_assert!(ratings_within_tolerance(member.rating, seed.rating, group.band()));
            }
        }
    }

    #[test]
    fn grouping_is_deterministic(
        ratings in prop::collection::vec(800.0f64..1600.0, 0..60),
        config in grouping_config(),
    ) {
        let players = snapshot(ratings);
        prop_assert_eq!(form_groups(&players, &config), form_groups(&players, &config));
    }

    #[test]
    fn provisional_leftovers_cannot_form_a_group(
        ratings in prop::collection::vec(800.0f64..1600.0, 0..60),
        config in grouping_config(),
    ) {
        let config = GroupingConfig {
            reservation_policy: ReservationPolicy::Provisional,
            ..config
        };
        let players = snapshot(ratings);
        let groups = form_groups(&players, &config);
        let widest = widest_band(&config);

        let used: HashSet<&str> = groups
            .iter()
            .flat_map(|g| g.members().iter().map(|p| p.id.as_str()))
            .collect();

        // A leftover seed never has enough unused players to its right within reach
        for (index, seed) in players.iter().enumerate() {
            if used.contains(seed.id.as_str()) {
                continue;
            }
            let reachable = players[index + 1..]
                .iter()
                .filter(|p| !used.contains(p.id.as_str()))
                .filter(|p| ratings_within_tolerance(p.rating, seed.rating, widest))
                .count();
            prop_assert!(reachable + 1 < config.group_size);
        }
    }
}
