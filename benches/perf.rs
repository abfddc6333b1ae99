use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use lineup_cohesion::aggregate::{AggregateBuilder, StoreAggregateBuilder};
use lineup_cohesion::config::{EngineConfig, ScoringConfig};
use lineup_cohesion::memory_store::InMemorySnapStore;
use lineup_cohesion::pair_graph;
use lineup_cohesion::roster;
use lineup_cohesion::scorer::score_lineup;
use lineup_cohesion::service::CohesionService;
use lineup_cohesion::system_state::{Side, SystemState};

const ROSTER_SIZE: usize = 60;

fn seeded_store() -> (Arc<InMemorySnapStore>, SystemState) {
    let store = Arc::new(InMemorySnapStore::new());
    let state = SystemState {
        id: SystemState::derive_id("GB", Side::Offense, "lafleur", None, None),
        team: "GB".to_string(),
        side: Side::Offense,
        coach_id: "lafleur".to_string(),
        coach_name: Some("Matt LaFleur".to_string()),
        role: Some("OffPlayCaller".to_string()),
        window_start: None,
        window_end: None,
        start_game_id: None,
        end_game_id: None,
        total_snaps: 5000,
    };
    store.add_state(state.clone());

    let roles = ["QB", "RB", "WR", "TE", "OL"];
    let snaps: Vec<u64> = (0..ROSTER_SIZE).map(|i| 5000 - 80 * i as u64).collect();
    for i in 0..ROSTER_SIZE {
        let id = format!("P{i:03}");
        store.set_player_roles(&state.id, &id, &[(roles[i % roles.len()], snaps[i])]);
        store.set_bio(&id, &format!("Player {i}"), Some(roles[i % roles.len()]));
    }
    for i in 0..ROSTER_SIZE {
        for j in (i + 1)..ROSTER_SIZE {
            if (i + j) % 7 == 0 {
                continue;
            }
            let co = snaps[i].min(snaps[j]) / 2;
            store.set_co_snaps(&state.id, &format!("P{i:03}"), &format!("P{j:03}"), co);
        }
    }
    store.add_role_pair_weight(Side::Offense, "QB", "WR", 1.5);
    (store, state)
}

fn lineup() -> Vec<String> {
    (0..11).map(|i| format!("P{i:03}")).collect()
}

fn bench_pair_graph_build(c: &mut Criterion) {
    let (store, state) = seeded_store();
    let config = ScoringConfig::default();
    let players = roster::build(store.as_ref(), &state, config.ius).unwrap();
    c.bench_function("pair_graph_build", |b| {
        b.iter(|| {
            let graph =
                pair_graph::build(store.as_ref(), black_box(&state), &players, 1.0).unwrap();
            black_box(graph.len());
        })
    });
}

fn bench_aggregate_build(c: &mut Criterion) {
    let (store, state) = seeded_store();
    let builder = StoreAggregateBuilder::new(store, ScoringConfig::default());
    c.bench_function("aggregate_build", |b| {
        b.iter(|| {
            let aggregate = builder.build(black_box(&state)).unwrap();
            black_box(aggregate.roster().len());
        })
    });
}

fn bench_score_lineup(c: &mut Criterion) {
    let (store, state) = seeded_store();
    let config = ScoringConfig::default();
    let aggregate = StoreAggregateBuilder::new(store, config.clone())
        .build(&state)
        .unwrap();
    let windows = vec![state.clone()];
    let lineup = lineup();
    c.bench_function("score_lineup", |b| {
        b.iter(|| {
            let result = score_lineup(
                black_box(&state),
                &windows,
                &aggregate,
                black_box(&lineup),
                &config,
            );
            black_box(result.cohesion);
        })
    });
}

fn bench_cached_service_score(c: &mut Criterion) {
    let (store, state) = seeded_store();
    let service = CohesionService::new(store, EngineConfig::default());
    let lineup = lineup();
    service.score("GB", Side::Offense, &state.id, &lineup).unwrap();
    c.bench_function("cached_service_score", |b| {
        b.iter(|| {
            let result = service
                .score("GB", Side::Offense, black_box(&state.id), &lineup)
                .unwrap();
            black_box(result.cohesion);
        })
    });
}

criterion_group!(
    perf,
    bench_pair_graph_build,
    bench_aggregate_build,
    bench_score_lineup,
    bench_cached_service_score
);
criterion_main!(perf);
