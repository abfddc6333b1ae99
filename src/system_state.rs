use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CohesionError, CohesionResult};
use crate::store::SnapStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Offense,
    Defense,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Offense => "offense",
            Side::Defense => "defense",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = CohesionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "offense" => Ok(Side::Offense),
            "defense" => Ok(Side::Defense),
            other => Err(CohesionError::validation(format!(
                "side must be offense or defense (got {other:?})"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    #[serde(rename = "system_state_id")]
    pub id: String,
    pub team: String,
    pub side: Side,
    pub coach_id: String,
    pub coach_name: Option<String>,
    pub role: Option<String>,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub start_game_id: Option<String>,
    pub end_game_id: Option<String>,
    pub total_snaps: u64,
}

impl SystemState {
    /// Stable key for a (team, side, coach, window) tuple.
    pub fn derive_id(
        team: &str,
        side: Side,
        coach_id: &str,
        window_start: Option<NaiveDate>,
        window_end: Option<NaiveDate>,
    ) -> String {
        let fmt_date = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        let payload = [
            team.to_string(),
            side.as_str().to_string(),
            coach_id.to_string(),
            fmt_date(window_start),
            fmt_date(window_end),
        ]
        .join("|");
        format!("{:x}", Sha256::digest(payload.as_bytes()))
    }

    pub fn is_open_ended(&self) -> bool {
        self.window_end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.window_start.is_none_or(|start| start <= date)
            && self.window_end.is_none_or(|end| date <= end)
    }

    pub fn label(&self) -> String {
        let name = self
            .coach_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.coach_id);
        let role = self.role.as_deref().unwrap_or("Play Caller");
        match (self.window_start, self.window_end) {
            (Some(start), Some(end)) => format!("{name} ({role}) — {start} to {end}"),
            (Some(start), None) => format!("{name} ({role}) — from {start}"),
            _ => format!("{name} ({role})"),
        }
    }
}

#[derive(Debug, Default)]
struct SideWindows {
    states: Arc<Vec<SystemState>>,
    issues: Vec<String>,
}

/// Resolves coaching windows for (team, side) and caches them until invalidated.
pub struct SystemStateIndex {
    store: Arc<dyn SnapStore>,
    windows: RwLock<HashMap<(String, Side), Arc<SideWindows>>>,
}

impl SystemStateIndex {
    pub fn new(store: Arc<dyn SnapStore>) -> Self {
        Self {
            store,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Windows ordered by start date (undated first), ties broken by id.
    pub fn windows_for(&self, team: &str, side: Side) -> CohesionResult<Arc<Vec<SystemState>>> {
        Ok(self.side_windows(team, side)?.states.clone())
    }

    pub fn resolve(&self, team: &str, side: Side, system_state_id: &str) -> CohesionResult<SystemState> {
        self.side_windows(team, side)?
            .states
            .iter()
            .find(|s| s.id == system_state_id)
            .cloned()
            .ok_or_else(|| CohesionError::not_found("system state", system_state_id))
    }

    /// With no date, the open-ended window is the active one. Overlaps prefer
    /// the later `window_start`.
    pub fn active_for(
        &self,
        team: &str,
        side: Side,
        date: Option<NaiveDate>,
    ) -> CohesionResult<Option<SystemState>> {
        let windows = self.side_windows(team, side)?;
        let active = windows
            .states
            .iter()
            .filter(|s| match date {
                Some(date) => s.contains(date),
                None => s.is_open_ended(),
            })
            .max_by(|a, b| {
                a.window_start
                    .cmp(&b.window_start)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned();
        Ok(active)
    }

    pub fn integrity_issues(&self, team: &str, side: Side) -> CohesionResult<Vec<String>> {
        Ok(self.side_windows(team, side)?.issues.clone())
    }

    pub fn invalidate_all(&self) {
        match self.windows.write() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn side_windows(&self, team: &str, side: Side) -> CohesionResult<Arc<SideWindows>> {
        let team = team.trim();
        if team.is_empty() {
            return Err(CohesionError::validation("team must not be empty"));
        }
        let key = (team.to_string(), side);
        if let Some(hit) = self.read_cached(&key) {
            return Ok(hit);
        }

        let mut states = self
            .store
            .system_states(team, side)
            .map_err(|err| CohesionError::upstream(&err))?;
        states.retain(|s| s.team == team && s.side == side);
        states.sort_by(|a, b| {
            a.window_start
                .cmp(&b.window_start)
                .then_with(|| a.id.cmp(&b.id))
        });
        let mut issues = find_key_mismatches(&states);
        issues.extend(find_integrity_issues(&states));
        for issue in &issues {
            tracing::warn!(team, side = %side, "{issue}");
        }

        let loaded = Arc::new(SideWindows {
            states: Arc::new(states),
            issues,
        });
        let mut guard = match self.windows.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.entry(key).or_insert(loaded).clone())
    }

    fn read_cached(&self, key: &(String, Side)) -> Option<Arc<SideWindows>> {
        let guard = match self.windows.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(key).cloned()
    }
}

/// Stored ids are kept as-is; a row whose id is not the key derived from its
/// own fields is reported so a drifting loader shows up in the logs.
fn find_key_mismatches(states: &[SystemState]) -> Vec<String> {
    states
        .iter()
        .filter_map(|s| {
            let derived = SystemState::derive_id(&s.team, s.side, &s.coach_id, s.window_start, s.window_end);
            (derived != s.id).then(|| {
                format!("system state {} does not match its derived key {derived}", s.id)
            })
        })
        .collect()
}

fn find_integrity_issues(sorted: &[SystemState]) -> Vec<String> {
    let mut issues = Vec::new();
    let open: Vec<&SystemState> = sorted.iter().filter(|s| s.is_open_ended()).collect();
    if open.len() > 1 {
        issues.push(format!(
            "{} open-ended windows (expected at most one): {}",
            open.len(),
            open.iter().map(|s| s.id.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
    for pair in sorted.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let Some(next_start) = next.window_start else {
            continue;
        };
        let overlaps = match prev.window_end {
            Some(prev_end) => prev_end >= next_start,
            None => true,
        };
        if overlaps {
            issues.push(format!(
                "overlapping windows {} and {}; later start {} wins",
                prev.id, next.id, next_start
            ));
        }
    }
    issues
}
