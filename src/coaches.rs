use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CohesionError, CohesionResult};
use crate::store::{CoachRole, SnapStore};

pub const OFF_PLAYCALLER: &str = "OffPlayCaller";
pub const DEF_PLAYCALLER: &str = "DefPlayCaller";
pub const OFFENSIVE_COORDINATOR: &str = "OC";
pub const DEFENSIVE_COORDINATOR: &str = "DC";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachesActive {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offense_playcaller: Option<CoachRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defense_playcaller: Option<CoachRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oc: Option<CoachRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dc: Option<CoachRole>,
}

/// Coaches holding each staff role for `team` on `date`. A team without an
/// explicit play caller falls back to its coordinator on that side.
pub fn active_coaches(store: &dyn SnapStore, team: &str, date: NaiveDate) -> CohesionResult<CoachesActive> {
    let team = team.trim();
    if team.is_empty() {
        return Err(CohesionError::validation("team must not be empty"));
    }
    let roles = store
        .coach_roles(team)
        .map_err(|err| CohesionError::upstream(&err))?;
    Ok(pick_active(&roles, team, date))
}

fn pick_active(roles: &[CoachRole], team: &str, date: NaiveDate) -> CoachesActive {
    let latest = |role: &str| {
        roles
            .iter()
            .filter(|r| r.team == team && r.role == role && r.active_on(date))
            .max_by(|a, b| {
                a.start_date
                    .cmp(&b.start_date)
                    .then_with(|| b.coach_id.cmp(&a.coach_id))
            })
            .cloned()
    };
    let oc = latest(OFFENSIVE_COORDINATOR);
    let dc = latest(DEFENSIVE_COORDINATOR);
    CoachesActive {
        offense_playcaller: latest(OFF_PLAYCALLER).or_else(|| oc.clone()),
        defense_playcaller: latest(DEF_PLAYCALLER).or_else(|| dc.clone()),
        oc,
        dc,
    }
}
