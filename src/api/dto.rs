//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonsResponse {
    pub seasons: Vec<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamsQuery {
    pub season: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamsResponse {
    pub season: Option<i32>,
    pub teams: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SideQuery {
    pub team: String,
    pub side: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateQuery {
    pub team: String,
    pub side: String,
    pub system_state_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub team: String,
    pub side: String,
    pub system_state_id: String,
    pub lineup: Vec<String>,
}

/// `date` is `YYYY-MM-DD`; absent means today (UTC).
#[derive(Debug, Clone, Deserialize)]
pub struct CoachesQuery {
    pub team: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateQuery {
    pub system_state_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub invalidated: usize,
}
