//! Request handlers. Engine calls are synchronous and may block on a
//! context build, so each one runs on tokio's blocking pool.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::NaiveDate;

use super::dto::{
    CoachesQuery, HealthResponse, InvalidateQuery, InvalidateResponse, ScoreRequest,
    SeasonsResponse, SideQuery, StateQuery, TeamsQuery, TeamsResponse,
};
use super::{ApiError, ApiResult, AppState};
use crate::coaches::CoachesActive;
use crate::error::CohesionResult;
use crate::scorer::ScoreResult;
use crate::service::{CohesionService, RosterPlayer, SystemStateLabel, SystemStateSummary};
use crate::system_state::Side;

async fn run_blocking<T, F>(state: &AppState, call: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&CohesionService) -> CohesionResult<T> + Send + 'static,
{
    let service = state.service().clone();
    let joined = tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|err| ApiError::Worker(err.to_string()))?;
    Ok(joined?)
}

fn parse_side(raw: &str) -> ApiResult<Side> {
    Ok(raw.parse::<Side>()?)
}

fn parse_date(raw: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|d| !d.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("date must be YYYY-MM-DD (got {raw:?})"))),
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "NFL lineup cohesion API".to_string(),
    })
}

#[tracing::instrument(skip(state))]
pub async fn seasons(State(state): State<AppState>) -> ApiResult<Json<SeasonsResponse>> {
    let seasons = run_blocking(&state, |svc| svc.seasons()).await?;
    Ok(Json(SeasonsResponse { seasons }))
}

#[tracing::instrument(skip(state))]
pub async fn teams(
    State(state): State<AppState>,
    Query(query): Query<TeamsQuery>,
) -> ApiResult<Json<TeamsResponse>> {
    let season = query.season;
    let teams = run_blocking(&state, move |svc| svc.teams(season)).await?;
    Ok(Json(TeamsResponse { season, teams }))
}

#[tracing::instrument(skip(state))]
pub async fn system_states(
    State(state): State<AppState>,
    Query(query): Query<SideQuery>,
) -> ApiResult<Json<Vec<SystemStateLabel>>> {
    let side = parse_side(&query.side)?;
    let labels = run_blocking(&state, move |svc| svc.system_states(&query.team, side)).await?;
    Ok(Json(labels))
}

#[tracing::instrument(skip(state))]
pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<StateQuery>,
) -> ApiResult<Json<SystemStateSummary>> {
    let side = parse_side(&query.side)?;
    let summary = run_blocking(&state, move |svc| {
        svc.summary(&query.team, side, &query.system_state_id)
    })
    .await?;
    Ok(Json(summary))
}

#[tracing::instrument(skip(state))]
pub async fn roster(
    State(state): State<AppState>,
    Query(query): Query<StateQuery>,
) -> ApiResult<Json<Vec<RosterPlayer>>> {
    let side = parse_side(&query.side)?;
    let players = run_blocking(&state, move |svc| {
        svc.roster(&query.team, side, &query.system_state_id)
    })
    .await?;
    Ok(Json(players))
}

#[tracing::instrument(skip(state))]
pub async fn score_lineup(
    State(state): State<AppState>,
    Json(request): Json<ScoreRequest>,
) -> ApiResult<Json<ScoreResult>> {
    let side = parse_side(&request.side)?;
    let result = run_blocking(&state, move |svc| {
        svc.score(&request.team, side, &request.system_state_id, &request.lineup)
    })
    .await?;
    Ok(Json(result))
}

#[tracing::instrument(skip(state))]
pub async fn active_coaches(
    State(state): State<AppState>,
    Query(query): Query<CoachesQuery>,
) -> ApiResult<Json<CoachesActive>> {
    let date = parse_date(query.date.as_deref())?;
    let coaches = run_blocking(&state, move |svc| svc.active_coaches(&query.team, date)).await?;
    Ok(Json(coaches))
}

#[tracing::instrument(skip(state))]
pub async fn invalidate(
    State(state): State<AppState>,
    Query(query): Query<InvalidateQuery>,
) -> ApiResult<Json<InvalidateResponse>> {
    let invalidated = run_blocking(&state, move |svc| {
        Ok(match query.system_state_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => usize::from(svc.invalidate(id)),
            _ => svc.invalidate_all(),
        })
    })
    .await?;
    Ok(Json(InvalidateResponse { invalidated }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;

    use super::*;
    use crate::config::EngineConfig;
    use crate::memory_store::InMemorySnapStore;
    use crate::system_state::SystemState;

    fn app_state() -> (AppState, String) {
        let store = Arc::new(InMemorySnapStore::new());
        store.add_game(2023, "KC", "DET");
        store.add_game(2024, "KC", "BAL");
        let id = SystemState::derive_id("KC", Side::Offense, "reid", None, None);
        store.add_state(SystemState {
            id: id.clone(),
            team: "KC".to_string(),
            side: Side::Offense,
            coach_id: "reid".to_string(),
            coach_name: Some("Andy Reid".to_string()),
            role: Some("OffPlayCaller".to_string()),
            window_start: None,
            window_end: None,
            start_game_id: None,
            end_game_id: None,
            total_snaps: 100,
        });
        store.set_player_roles(&id, "P1", &[("QB", 100)]);
        store.set_player_roles(&id, "P2", &[("WR", 80)]);
        store.set_co_snaps(&id, "P1", "P2", 80);
        let service = CohesionService::new(store, EngineConfig::default());
        (AppState::new(Arc::new(service)), id)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn seasons_and_teams_come_from_store() {
        let (state, _) = app_state();
        let Json(seasons) = seasons(State(state.clone())).await.unwrap();
        assert_eq!(seasons.seasons, vec![2023, 2024]);
        let Json(teams) = teams(State(state), Query(TeamsQuery { season: Some(2024) }))
            .await
            .unwrap();
        assert_eq!(teams.teams, vec!["BAL".to_string(), "KC".to_string()]);
    }

    #[tokio::test]
    async fn roster_sorted_by_snaps() {
        let (state, id) = app_state();
        let query = StateQuery {
            team: "KC".to_string(),
            side: "offense".to_string(),
            system_state_id: id,
        };
        let Json(players) = roster(State(state), Query(query)).await.unwrap();
        let ids: Vec<&str> = players.iter().map(|p| p.gsis_id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2"]);
    }

    #[tokio::test]
    async fn unknown_state_is_404_on_roster_and_400_on_score() {
        let (state, _) = app_state();
        let query = StateQuery {
            team: "KC".to_string(),
            side: "offense".to_string(),
            system_state_id: "missing".to_string(),
        };
        let err = roster(State(state.clone()), Query(query)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let request = ScoreRequest {
            team: "KC".to_string(),
            side: "offense".to_string(),
            system_state_id: "missing".to_string(),
            lineup: (1..=11).map(|i| format!("P{i}")).collect(),
        };
        let err = score_lineup(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bad_side_and_short_lineup_are_400() {
        let (state, id) = app_state();
        let request = ScoreRequest {
            team: "KC".to_string(),
            side: "special_teams".to_string(),
            system_state_id: id.clone(),
            lineup: (1..=11).map(|i| format!("P{i}")).collect(),
        };
        let err = score_lineup(State(state.clone()), Json(request)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let request = ScoreRequest {
            team: "KC".to_string(),
            side: "offense".to_string(),
            system_state_id: id,
            lineup: vec!["P1".to_string(), "P2".to_string()],
        };
        let err = score_lineup(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn invalidate_one_and_all() {
        let (state, id) = app_state();
        let query = StateQuery {
            team: "KC".to_string(),
            side: "offense".to_string(),
            system_state_id: id.clone(),
        };
        summary(State(state.clone()), Query(query)).await.unwrap();

        let Json(resp) = invalidate(
            State(state.clone()),
            Query(InvalidateQuery {
                system_state_id: Some(id.clone()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.invalidated, 1);

        let Json(resp) = invalidate(State(state), Query(InvalidateQuery::default()))
            .await
            .unwrap();
        assert_eq!(resp.invalidated, 0);
    }

    #[test]
    fn date_parsing() {
        assert_eq!(parse_date(None).unwrap(), None);
        assert_eq!(parse_date(Some("  ")).unwrap(), None);
        assert!(parse_date(Some("2024-09-08")).unwrap().is_some());
        assert!(parse_date(Some("09/08/2024")).is_err());
    }
}
