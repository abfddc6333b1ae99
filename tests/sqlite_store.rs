use std::fmt::Write as _;
use std::sync::Arc;

use lineup_cohesion::config::EngineConfig;
use lineup_cohesion::service::CohesionService;
use lineup_cohesion::sqlite_store::SqliteSnapStore;
use lineup_cohesion::store::SnapStore;
use lineup_cohesion::system_state::{Side, SystemState};

const STATE_ID: &str = "kc-off-reid-2023";

fn roster_ids() -> Vec<String> {
    (1..=11).map(|i| format!("00-00{i:05}")).collect()
}

fn fixture_sql() -> String {
    let mut sql = String::from(
        r#"
        INSERT INTO games (game_id, season, week, game_date, home_team, away_team) VALUES
            ('2023_01_DET_KC', 2023, 1, '2023-09-07', 'KC', 'DET'),
            ('2023_02_KC_JAX', 2023, 2, '2023-09-17', 'JAX', 'KC'),
            ('2024_01_BAL_KC', 2024, 1, '2024-09-05', 'KC', 'BAL');
        INSERT INTO system_states (system_state_id, team, side, coach_id, coach_name, role,
                                   window_start, window_end, total_snaps) VALUES
            ('kc-off-reid-2023', 'KC', 'offense', 'reid', 'Andy Reid', 'OffPlayCaller',
             '2023-02-01', NULL, 1100),
            ('kc-def-spags-2019', 'KC', 'defense', 'spagnuolo', 'Steve Spagnuolo', 'DefPlayCaller',
             '2019-02-01T00:00:00', NULL, 1000);
        INSERT INTO coach_roles (coach_id, coach_name, team, role, start_date, end_date) VALUES
            ('reid', 'Andy Reid', 'KC', 'OffPlayCaller', '2013-01-07', NULL),
            ('spagnuolo', 'Steve Spagnuolo', 'KC', 'DC', '2019-01-24', NULL);
        INSERT INTO role_pair_weights (side, role_a, role_b, weight) VALUES
            ('offense', 'QB', 'WR', 1.5);
        "#,
    );
    let ids = roster_ids();
    for (i, id) in ids.iter().enumerate() {
        let snaps = 1000 - 40 * i as u64;
        let role = if i == 0 { "QB" } else { "WR" };
        let _ = writeln!(
            sql,
            "INSERT INTO players VALUES ('{id}', 'Player {i}', '{role}');
             INSERT INTO player_snaps_in_state VALUES ('{STATE_ID}', '{id}', {snaps});
             INSERT INTO player_role_counts_in_state VALUES ('{STATE_ID}', '{id}', '{role}', {snaps});"
        );
    }
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            // Leave the last player's pairs unrecorded.
            if j == ids.len() - 1 {
                continue;
            }
            let co = 1000 - 40 * j as u64 - 5;
            let _ = writeln!(
                sql,
                "INSERT INTO co_snaps VALUES ('{STATE_ID}', '{}', '{}', {co});",
                ids[i], ids[j]
            );
        }
    }
    sql
}

fn seeded_store() -> Arc<SqliteSnapStore> {
    let store = SqliteSnapStore::open_in_memory().expect("open in-memory db");
    store.execute_batch(&fixture_sql()).expect("load fixture");
    Arc::new(store)
}

#[test]
fn store_reads_meta_and_windows() {
    let store = seeded_store();
    assert_eq!(store.seasons().unwrap(), vec![2023, 2024]);
    assert_eq!(
        store.teams(Some(2023)).unwrap(),
        vec!["DET".to_string(), "JAX".to_string(), "KC".to_string()]
    );
    assert_eq!(store.teams(None).unwrap().len(), 4);

    let states = store.system_states("KC", Side::Defense).unwrap();
    assert_eq!(states.len(), 1);
    let defense: &SystemState = &states[0];
    assert_eq!(defense.window_start.map(|d| d.to_string()).as_deref(), Some("2019-02-01"));
    assert!(defense.is_open_ended());

    let seen = store.career_states_seen(&roster_ids()).unwrap();
    assert_eq!(seen.len(), 11);
    assert!(seen.values().all(|n| *n == 1));

    let weights = store.role_pair_weights(Side::Offense).unwrap();
    assert_eq!(weights.len(), 1);
    assert!(store.role_pair_weights(Side::Defense).unwrap().is_empty());
}

#[test]
fn service_scores_from_sqlite() {
    let store = seeded_store();
    let service = CohesionService::new(store, EngineConfig::default());

    let labels = service.system_states("KC", Side::Offense).unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].label, "Andy Reid (OffPlayCaller) — from 2023-02-01");

    let roster = service.roster("KC", Side::Offense, STATE_ID).unwrap();
    assert_eq!(roster.len(), 11);
    assert_eq!(roster[0].name, "Player 0");
    assert_eq!(roster[0].position_group.as_deref(), Some("QB"));

    let result = service
        .score("KC", Side::Offense, STATE_ID, &roster_ids())
        .unwrap();
    assert_eq!(result.pair_edges.len(), 45);
    assert_eq!(result.lsu, 1.0);
    assert!(result.lic > 0.0 && result.lic < 1.0);
    assert!(result.warnings.iter().any(|w| w.starts_with("10 of 55")));

    let summary = service.summary("KC", Side::Offense, STATE_ID).unwrap();
    assert_eq!(summary.team_snaps, 1100);
    assert_eq!(summary.distinct_players, 11);

    let coaches = service.active_coaches("KC", None).unwrap();
    assert_eq!(coaches.offense_playcaller.unwrap().coach_id, "reid");
    assert_eq!(coaches.defense_playcaller.unwrap().coach_id, "spagnuolo");
}
