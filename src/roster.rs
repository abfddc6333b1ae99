use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::config::IusParams;
use crate::error::{CohesionError, CohesionResult};
use crate::store::SnapStore;
use crate::system_state::{Side, SystemState};

pub const UNASSIGNED_ROLE: &str = "UNASSIGNED";

static OFFENSE_GROUPS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("QB", "QB"),
        ("RB", "RB"),
        ("FB", "RB"),
        ("HB", "RB"),
        ("TB", "RB"),
        ("WR", "WR"),
        ("TE", "TE"),
        ("OL", "OL"),
        ("LT", "OL"),
        ("RT", "OL"),
        ("LG", "OL"),
        ("RG", "OL"),
        ("C", "OL"),
        ("G", "OL"),
        ("OT", "OL"),
    ])
});

static DEFENSE_GROUPS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("DL", "DL"),
        ("DT", "DL"),
        ("NT", "DL"),
        ("DE", "DL"),
        ("EDGE", "DL"),
        ("LB", "LB"),
        ("ILB", "LB"),
        ("OLB", "LB"),
        ("MLB", "LB"),
        ("CB", "CB"),
        ("DB", "CB"),
        ("S", "S"),
        ("SS", "S"),
        ("FS", "S"),
    ])
});

/// Position groups unknown to the side's table pass through upper-cased.
pub fn position_group(position: Option<&str>, side: Side) -> Option<String> {
    let position = position.map(str::trim).filter(|p| !p.is_empty())?;
    let upper = position.to_ascii_uppercase();
    let table = match side {
        Side::Offense => &*OFFENSE_GROUPS,
        Side::Defense => &*DEFENSE_GROUPS,
    };
    Some(
        table
            .get(upper.as_str())
            .map(|g| g.to_string())
            .unwrap_or(upper),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUsage {
    pub gsis_id: String,
    pub name: String,
    pub position: Option<String>,
    pub position_group: Option<String>,
    pub snaps_in_state: u64,
    pub roles_breakdown: BTreeMap<String, u64>,
    pub n_system_states_seen: u32,
    pub dominant_role: Option<String>,
    pub ius: f64,
}

/// Individual understanding: grows with the player's share of the context's
/// snaps and with career exposure to distinct systems. Clamped at 0 only;
/// heavily tenured players may exceed 1.
pub fn individual_understanding(
    snaps_in_state: u64,
    total_snaps: u64,
    n_system_states_seen: u32,
    params: IusParams,
) -> f64 {
    if total_snaps == 0 || snaps_in_state == 0 {
        return 0.0;
    }
    let share = snaps_in_state as f64 / total_snaps as f64;
    let exposure = (n_system_states_seen.max(1) as f64).ln();
    let ius = share.powf(params.share_exponent) * (1.0 + params.exposure_gain * exposure);
    if ius.is_finite() { ius.max(0.0) } else { 0.0 }
}

pub fn build(
    store: &dyn SnapStore,
    state: &SystemState,
    params: IusParams,
) -> CohesionResult<HashMap<String, PlayerUsage>> {
    let snaps = store
        .player_snaps(state)
        .map_err(|err| CohesionError::upstream(&err))?;
    let role_rows = store
        .role_counts(state)
        .map_err(|err| CohesionError::upstream(&err))?;

    let mut snaps_by_player: HashMap<String, u64> = HashMap::with_capacity(snaps.len());
    for row in snaps {
        *snaps_by_player.entry(row.gsis_id).or_insert(0) += row.snaps;
    }
    let mut roles_by_player: HashMap<String, BTreeMap<String, u64>> = HashMap::new();
    for row in role_rows {
        if row.snaps == 0 {
            continue;
        }
        *roles_by_player
            .entry(row.gsis_id.clone())
            .or_default()
            .entry(row.role)
            .or_insert(0) += row.snaps;
        snaps_by_player.entry(row.gsis_id).or_insert(0);
    }

    let mut ids: Vec<String> = snaps_by_player.keys().cloned().collect();
    ids.sort_unstable();
    let seen = store
        .career_states_seen(&ids)
        .map_err(|err| CohesionError::upstream(&err))?;
    let bios = store
        .player_bios(&ids)
        .map_err(|err| CohesionError::upstream(&err))?;

    let mut roster = HashMap::with_capacity(ids.len());
    for gsis_id in ids {
        let recorded = snaps_by_player.get(&gsis_id).copied().unwrap_or(0);
        let mut roles = roles_by_player.remove(&gsis_id).unwrap_or_default();
        let snaps_in_state = reconcile_roles(&gsis_id, recorded, &mut roles);
        if snaps_in_state == 0 {
            continue;
        }

        let bio = bios.get(&gsis_id).cloned().unwrap_or_default();
        let position_group = position_group(bio.position.as_deref(), state.side);
        let dominant_role = roles
            .iter()
            .filter(|(role, _)| role.as_str() != UNASSIGNED_ROLE)
            // Max by count, ties broken toward the alphabetically first role.
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(role, _)| role.clone())
            .or_else(|| position_group.clone());
        // The current context counts even if the career table lags behind.
        let n_seen = seen.get(&gsis_id).copied().unwrap_or(0).max(1);

        let usage = PlayerUsage {
            name: bio.display_name.unwrap_or_else(|| gsis_id.clone()),
            position: bio.position,
            position_group,
            snaps_in_state,
            roles_breakdown: roles,
            n_system_states_seen: n_seen,
            dominant_role,
            ius: individual_understanding(snaps_in_state, state.total_snaps, n_seen, params),
            gsis_id: gsis_id.clone(),
        };
        roster.insert(gsis_id, usage);
    }
    Ok(roster)
}

/// Enforces `sum(roles) == snaps`: a shortfall lands in the UNASSIGNED
/// bucket, a surplus raises the snap count to the role sum.
fn reconcile_roles(gsis_id: &str, recorded: u64, roles: &mut BTreeMap<String, u64>) -> u64 {
    let role_sum: u64 = roles.values().sum();
    if role_sum < recorded {
        if !roles.is_empty() {
            tracing::debug!(
                gsis_id,
                recorded,
                role_sum,
                "role counts short of snaps; filling {UNASSIGNED_ROLE}"
            );
        }
        *roles.entry(UNASSIGNED_ROLE.to_string()).or_insert(0) += recorded - role_sum;
        recorded
    } else {
        if role_sum > recorded {
            tracing::warn!(gsis_id, recorded, role_sum, "role counts exceed snaps; using role sum");
        }
        role_sum
    }
}
