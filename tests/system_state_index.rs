use std::sync::Arc;

use chrono::NaiveDate;

use lineup_cohesion::coaches::{DEFENSIVE_COORDINATOR, OFF_PLAYCALLER, OFFENSIVE_COORDINATOR};
use lineup_cohesion::config::EngineConfig;
use lineup_cohesion::error::CohesionError;
use lineup_cohesion::memory_store::InMemorySnapStore;
use lineup_cohesion::service::CohesionService;
use lineup_cohesion::store::CoachRole;
use lineup_cohesion::system_state::{Side, SystemState, SystemStateIndex};

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
}

fn window(team: &str, side: Side, coach: &str, start: &str, end: Option<&str>) -> SystemState {
    let (start, end) = (Some(date(start)), end.map(date));
    SystemState {
        id: SystemState::derive_id(team, side, coach, start, end),
        team: team.to_string(),
        side,
        coach_id: coach.to_string(),
        coach_name: None,
        role: None,
        window_start: start,
        window_end: end,
        start_game_id: None,
        end_game_id: None,
        total_snaps: 500,
    }
}

fn coach(id: &str, role: &str, start: &str, end: Option<&str>) -> CoachRole {
    CoachRole {
        coach_id: id.to_string(),
        coach_name: format!("Coach {id}"),
        team: "SF".to_string(),
        role: role.to_string(),
        start_date: date(start),
        end_date: end.map(date),
        start_game_id: None,
        end_game_id: None,
    }
}

#[test]
fn windows_are_ordered_and_scoped_to_team_and_side() {
    let store = Arc::new(InMemorySnapStore::new());
    let late = window("SF", Side::Offense, "b", "2021-02-01", None);
    let early = window("SF", Side::Offense, "a", "2017-02-01", Some("2021-01-31"));
    store.add_state(late.clone());
    store.add_state(early.clone());
    store.add_state(window("SF", Side::Defense, "d", "2019-02-01", None));
    store.add_state(window("LAR", Side::Offense, "m", "2017-02-01", None));

    let index = SystemStateIndex::new(store);
    let windows = index.windows_for("SF", Side::Offense).unwrap();
    let ids: Vec<&str> = windows.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec![early.id.as_str(), late.id.as_str()]);
    assert!(index.integrity_issues("SF", Side::Offense).unwrap().is_empty());
}

#[test]
fn hand_written_ids_are_flagged_but_still_resolve() {
    let store = Arc::new(InMemorySnapStore::new());
    let mut legacy = window("SF", Side::Offense, "a", "2017-02-01", None);
    legacy.id = "sf-off-a-2017".to_string();
    store.add_state(legacy.clone());
    let index = SystemStateIndex::new(store);

    let issues = index.integrity_issues("SF", Side::Offense).unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].contains("sf-off-a-2017"));
    assert!(issues[0].contains("derived key"));
    assert_eq!(
        index.resolve("SF", Side::Offense, "sf-off-a-2017").unwrap(),
        legacy
    );
}

#[test]
fn active_window_policies() {
    let store = Arc::new(InMemorySnapStore::new());
    let closed = window("SF", Side::Offense, "a", "2017-02-01", Some("2021-03-31"));
    let current = window("SF", Side::Offense, "b", "2021-02-01", None);
    store.add_state(closed.clone());
    store.add_state(current.clone());
    let index = SystemStateIndex::new(store);

    let open = index.active_for("SF", Side::Offense, None).unwrap();
    assert_eq!(open.map(|s| s.id), Some(current.id.clone()));

    let mid = index
        .active_for("SF", Side::Offense, Some(date("2019-10-01")))
        .unwrap();
    assert_eq!(mid.map(|s| s.id), Some(closed.id.clone()));

    // Overlap: the later start wins.
    let overlap = index
        .active_for("SF", Side::Offense, Some(date("2021-03-01")))
        .unwrap();
    assert_eq!(overlap.map(|s| s.id), Some(current.id.clone()));

    let before = index
        .active_for("SF", Side::Offense, Some(date("2010-01-01")))
        .unwrap();
    assert!(before.is_none());

    let issues = index.integrity_issues("SF", Side::Offense).unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].contains("overlapping"));
}

#[test]
fn two_open_windows_prefer_later_start() {
    let store = Arc::new(InMemorySnapStore::new());
    let older = window("SF", Side::Defense, "a", "2019-02-01", None);
    let newer = window("SF", Side::Defense, "b", "2023-02-01", None);
    store.add_state(older);
    store.add_state(newer.clone());
    let index = SystemStateIndex::new(store);

    let active = index.active_for("SF", Side::Defense, None).unwrap();
    assert_eq!(active.map(|s| s.id), Some(newer.id));
    let issues = index.integrity_issues("SF", Side::Defense).unwrap();
    assert!(issues.iter().any(|i| i.contains("open-ended")));
}

#[test]
fn resolve_errors() {
    let store = Arc::new(InMemorySnapStore::new());
    let state = window("SF", Side::Offense, "a", "2017-02-01", None);
    store.add_state(state.clone());
    let index = SystemStateIndex::new(store);

    assert_eq!(index.resolve("SF", Side::Offense, &state.id).unwrap(), state);
    assert!(matches!(
        index.resolve("SF", Side::Defense, &state.id),
        Err(CohesionError::NotFound { .. })
    ));
    assert!(matches!(
        index.resolve("  ", Side::Offense, &state.id),
        Err(CohesionError::Validation(_))
    ));
}

#[test]
fn window_list_is_cached_until_invalidated() {
    let store = Arc::new(InMemorySnapStore::new());
    store.add_state(window("SF", Side::Offense, "a", "2017-02-01", Some("2020-12-31")));
    let index = SystemStateIndex::new(store.clone());
    assert_eq!(index.windows_for("SF", Side::Offense).unwrap().len(), 1);

    store.add_state(window("SF", Side::Offense, "b", "2021-02-01", None));
    assert_eq!(index.windows_for("SF", Side::Offense).unwrap().len(), 1);

    index.invalidate_all();
    assert_eq!(index.windows_for("SF", Side::Offense).unwrap().len(), 2);
}

#[test]
fn active_coaches_fall_back_to_coordinators() {
    let store = Arc::new(InMemorySnapStore::new());
    store.add_coach_role(coach("shanahan", OFF_PLAYCALLER, "2017-02-06", None));
    store.add_coach_role(coach("mcdaniel", OFFENSIVE_COORDINATOR, "2021-01-20", Some("2022-01-31")));
    store.add_coach_role(coach("ryans", DEFENSIVE_COORDINATOR, "2021-01-20", Some("2023-01-31")));
    store.add_coach_role(coach("wilks", DEFENSIVE_COORDINATOR, "2023-02-01", None));
    let service = CohesionService::new(store, EngineConfig::default());

    let active = service
        .active_coaches("SF", Some(date("2021-10-10")))
        .unwrap();
    assert_eq!(active.offense_playcaller.unwrap().coach_id, "shanahan");
    assert_eq!(active.oc.unwrap().coach_id, "mcdaniel");
    // No defensive play caller on record: the coordinator calls it.
    assert_eq!(active.defense_playcaller.unwrap().coach_id, "ryans");

    let later = service
        .active_coaches("SF", Some(date("2023-10-10")))
        .unwrap();
    assert!(later.oc.is_none());
    assert_eq!(later.dc.unwrap().coach_id, "wilks");

    assert!(matches!(
        service.active_coaches(" ", None),
        Err(CohesionError::Validation(_))
    ));
}
