//! Performance benchmarks for grouping and matching passes

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lineup::matching::{form_groups, GroupingConfig, MatchingEngine, ReservationPolicy};
use lineup::metrics::MetricsCollector;
use lineup::notify::RecordingPublisher;
use lineup::queue::{InMemoryQueueStore, QueueStore};
use lineup::types::{JoinRequest, WaitingPlayer};
use lineup::utils::current_timestamp;
use std::sync::Arc;

// Spread ratings over roughly 600 points so some seeds need to widen
fn sorted_snapshot(count: usize) -> Vec<WaitingPlayer> {
    let joined_at = current_timestamp();
    let mut players: Vec<WaitingPlayer> = (0..count)
        .map(|i| WaitingPlayer {
            id: format!("player_{}", i),
            rating: 1200.0 + ((i * 37) % 600) as f64,
            joined_at,
        })
        .collect();
    players.sort_by(|a, b| a.rating.total_cmp(&b.rating));
    players
}

fn bench_form_groups(c: &mut Criterion) {
    let players = sorted_snapshot(50);
    let provisional = GroupingConfig::default();
    let sticky = GroupingConfig {
        reservation_policy: ReservationPolicy::Sticky,
        ..GroupingConfig::default()
    };

    c.bench_function("form_groups_50_provisional", |b| {
        b.iter(|| black_box(form_groups(black_box(&players), &provisional)))
    });

    c.bench_function("form_groups_50_sticky", |b| {
        b.iter(|| black_box(form_groups(black_box(&players), &sticky)))
    });
}

fn bench_matching_pass(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("matching_pass_50_players", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = Arc::new(InMemoryQueueStore::new());
                for i in 0..50 {
                    let request = JoinRequest {
                        player_id: format!("player_{}", i),
                        mmr: 1400.0 + (i % 25) as f64 * 4.0,
                    };
                    let _ = store.enqueue(request).await;
                }

                let engine = MatchingEngine::new(
                    store,
                    Arc::new(RecordingPublisher::new()),
                    GroupingConfig::default(),
                    50,
                    Arc::new(MetricsCollector::new().unwrap()),
                );

                black_box(engine.run_pass().await)
            })
        })
    });
}

criterion_group!(benches, bench_form_groups, bench_matching_pass);
criterion_main!(benches);
