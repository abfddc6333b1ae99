use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregate::ContextAggregate;
use crate::config::{LsuParams, ScoringConfig};
use crate::context_cache::ContextCache;
use crate::error::{CohesionError, CohesionResult, DataGapWarning};
use crate::pair_graph::PairEdge;
use crate::system_state::{Side, SystemState, SystemStateIndex};

pub const LINEUP_SIZE: usize = 11;
pub const LINEUP_PAIRS: usize = LINEUP_SIZE * (LINEUP_SIZE - 1) / 2;

const DEFAULT_PAIR_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub gsis_id: String,
    pub snaps_in_state: u64,
    pub ius: f64,
    pub roles: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    #[serde(rename = "LSU")]
    pub lsu: f64,
    #[serde(rename = "LIU")]
    pub liu: f64,
    #[serde(rename = "LIC")]
    pub lic: f64,
    pub cohesion: f64,
    pub warnings: Vec<String>,
    pub per_player: Vec<PlayerScore>,
    pub pair_edges: Vec<PairEdge>,
    pub playcaller_label: Option<String>,
}

/// Rejects anything but exactly 11 distinct, non-blank ids. Returns the
/// trimmed ids in their original order.
pub fn validate_lineup(lineup: &[String]) -> CohesionResult<Vec<String>> {
    if lineup.len() != LINEUP_SIZE {
        return Err(CohesionError::validation(format!(
            "lineup must contain exactly {LINEUP_SIZE} players (got {})",
            lineup.len()
        )));
    }
    let ids: Vec<String> = lineup.iter().map(|id| id.trim().to_string()).collect();
    if ids.iter().any(String::is_empty) {
        return Err(CohesionError::validation("lineup contains a blank gsis_id"));
    }
    let mut seen = HashSet::with_capacity(LINEUP_SIZE);
    let dupes: Vec<&str> = ids
        .iter()
        .filter(|id| !seen.insert(id.as_str()))
        .map(String::as_str)
        .collect();
    if !dupes.is_empty() {
        return Err(CohesionError::validation(format!(
            "lineup must contain {LINEUP_SIZE} unique players (duplicated: {})",
            dupes.join(", ")
        )));
    }
    Ok(ids)
}

/// System understanding of a context: its snap volume relative to the
/// busiest window the team has had on this side, shaped by the curve exponent.
pub fn system_understanding(state: &SystemState, windows: &[SystemState], params: LsuParams) -> f64 {
    let peak = windows
        .iter()
        .map(|w| w.total_snaps)
        .chain(std::iter::once(state.total_snaps))
        .max()
        .unwrap_or(0);
    if peak == 0 {
        return 0.0;
    }
    let ratio = state.total_snaps as f64 / peak as f64;
    ratio.powf(params.curve_exponent).clamp(0.0, 1.0)
}

/// Scores a validated lineup against a built aggregate. Pure: the same
/// inputs always give the same result.
pub fn score_lineup(
    state: &SystemState,
    windows: &[SystemState],
    aggregate: &ContextAggregate,
    lineup: &[String],
    config: &ScoringConfig,
) -> ScoreResult {
    let mut warnings: Vec<DataGapWarning> = Vec::new();

    let mut per_player = Vec::with_capacity(lineup.len());
    for gsis_id in lineup {
        match aggregate.player(gsis_id) {
            Some(usage) => per_player.push(PlayerScore {
                gsis_id: gsis_id.clone(),
                snaps_in_state: usage.snaps_in_state,
                ius: usage.ius,
                roles: usage.roles_breakdown.clone(),
            }),
            None => {
                warnings.push(DataGapWarning::MissingPlayerUsage {
                    gsis_id: gsis_id.clone(),
                });
                per_player.push(PlayerScore {
                    gsis_id: gsis_id.clone(),
                    snaps_in_state: 0,
                    ius: 0.0,
                    roles: BTreeMap::new(),
                });
            }
        }
    }
    let liu = mean(per_player.iter().map(|p| p.ius));

    let mut pair_edges = Vec::new();
    let mut missing = 0usize;
    let mut pairs = 0usize;
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (i, a) in lineup.iter().enumerate() {
        for b in &lineup[i + 1..] {
            pairs += 1;
            let w = pair_weight(aggregate, a, b);
            weight_total += w;
            match aggregate.graph().edge(a, b) {
                Some(edge) => {
                    weighted_sum += w * edge.jaccard;
                    pair_edges.push(edge.clone());
                }
                None => missing += 1,
            }
        }
    }
    let lic = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    };
    if missing >= config.sparse_pair_threshold {
        warnings.push(DataGapWarning::SparsePairs {
            missing,
            total: pairs,
        });
    }

    let lsu = system_understanding(state, windows, config.lsu);
    let cohesion = config.blend.blend(lsu, liu, lic);

    ScoreResult {
        lsu,
        liu,
        lic,
        cohesion,
        warnings: warnings.iter().map(ToString::to_string).collect(),
        per_player,
        pair_edges,
        playcaller_label: Some(state.label()),
    }
}

fn pair_weight(aggregate: &ContextAggregate, a: &str, b: &str) -> f64 {
    let role = |id: &str| aggregate.player(id).and_then(|u| u.dominant_role.as_deref());
    match (role(a), role(b)) {
        (Some(ra), Some(rb)) => aggregate
            .role_weights()
            .get(ra, rb)
            .unwrap_or(DEFAULT_PAIR_WEIGHT),
        _ => DEFAULT_PAIR_WEIGHT,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Request-facing scorer: validates, resolves the context and fetches the
/// cached aggregate before running the bounded 11-player computation.
pub struct CohesionScorer {
    index: Arc<SystemStateIndex>,
    cache: Arc<ContextCache>,
    config: ScoringConfig,
}

impl CohesionScorer {
    pub fn new(index: Arc<SystemStateIndex>, cache: Arc<ContextCache>, config: ScoringConfig) -> Self {
        Self {
            index,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(
        &self,
        team: &str,
        side: Side,
        system_state_id: &str,
        lineup: &[String],
    ) -> CohesionResult<ScoreResult> {
        let lineup = validate_lineup(lineup)?;
        let state = match self.index.resolve(team, side, system_state_id) {
            Ok(state) => state,
            Err(CohesionError::NotFound { id, .. }) => {
                return Err(CohesionError::validation(format!(
                    "unknown system state {id} for {} {side}",
                    team.trim()
                )));
            }
            Err(err) => return Err(err),
        };
        let windows = self.index.windows_for(team, side)?;
        let aggregate = self.cache.get_or_build(&state)?;
        Ok(score_lineup(&state, &windows, &aggregate, &lineup, &self.config))
    }
}
