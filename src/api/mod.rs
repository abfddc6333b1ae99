//! JSON-over-HTTP surface for the cohesion engine.
//!
//! ## Endpoints
//! - `GET /` health check
//! - `GET /meta/seasons`
//! - `GET /teams?season=`
//! - `GET /system_state?team=&side=`
//! - `GET /system_state/summary?team=&side=&system_state_id=`
//! - `GET /roster?team=&side=&system_state_id=`
//! - `POST /score/lineup`
//! - `GET /coaches/active?team=&date=`
//! - `POST /admin/invalidate[?system_state_id=]`

pub mod dto;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::service::CohesionService;

pub use error::{ApiError, ApiResult};

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    service: Arc<CohesionService>,
}

impl AppState {
    pub fn new(service: Arc<CohesionService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<CohesionService> {
        &self.service
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/meta/seasons", get(handlers::seasons))
        .route("/teams", get(handlers::teams))
        .route("/system_state", get(handlers::system_states))
        .route("/system_state/summary", get(handlers::summary))
        .route("/roster", get(handlers::roster))
        .route("/score/lineup", post(handlers::score_lineup))
        .route("/coaches/active", get(handlers::active_coaches))
        .route("/admin/invalidate", post(handlers::invalidate))
        .with_state(state)
}
