//! Read-only access to the pre-aggregated snap tables.
//!
//! The engine never writes here; an external batch job owns the data and
//! signals reloads through cache invalidation.

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::system_state::{Side, SystemState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapRecord {
    pub gsis_id: String,
    pub snaps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCountRecord {
    pub gsis_id: String,
    pub role: String,
    pub snaps: u64,
}

/// Joint participation count for one unordered pair. `a`/`b` order is not
/// guaranteed by every store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoSnapRecord {
    pub a: String,
    pub b: String,
    pub co_snaps: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerBio {
    pub display_name: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RolePairWeightRecord {
    pub role_a: String,
    pub role_b: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachRole {
    pub coach_id: String,
    pub coach_name: String,
    pub team: String,
    pub role: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub start_game_id: Option<String>,
    pub end_game_id: Option<String>,
}

impl CoachRole {
    pub fn active_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.is_none_or(|end| date <= end)
    }
}

pub trait SnapStore: Send + Sync {
    fn seasons(&self) -> Result<Vec<i32>>;

    fn teams(&self, season: Option<i32>) -> Result<Vec<String>>;

    /// All coaching windows recorded for a team and side, in no particular order.
    fn system_states(&self, team: &str, side: Side) -> Result<Vec<SystemState>>;

    fn player_snaps(&self, state: &SystemState) -> Result<Vec<PlayerSnapRecord>>;

    fn role_counts(&self, state: &SystemState) -> Result<Vec<RoleCountRecord>>;

    /// Distinct system states each player has appeared in, over the whole career.
    fn career_states_seen(&self, gsis_ids: &[String]) -> Result<HashMap<String, u32>>;

    fn co_snaps(&self, state: &SystemState) -> Result<Vec<CoSnapRecord>>;

    fn player_bios(&self, gsis_ids: &[String]) -> Result<HashMap<String, PlayerBio>>;

    fn role_pair_weights(&self, side: Side) -> Result<Vec<RolePairWeightRecord>>;

    fn coach_roles(&self, team: &str) -> Result<Vec<CoachRole>>;
}
