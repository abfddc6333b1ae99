//! Facade wiring the store, system-state index, context cache and scorer
//! together. Everything here is synchronous; the HTTP layer runs it on the
//! blocking pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateBuilder, ContextAggregate, StoreAggregateBuilder};
use crate::coaches::{self, CoachesActive};
use crate::config::EngineConfig;
use crate::context_cache::{CacheStats, ContextCache};
use crate::error::{CohesionError, CohesionResult};
use crate::pair_graph::PairEdge;
use crate::scorer::{CohesionScorer, ScoreResult};
use crate::store::SnapStore;
use crate::system_state::{Side, SystemState, SystemStateIndex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStateLabel {
    #[serde(flatten)]
    pub state: SystemState,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterPlayer {
    pub gsis_id: String,
    pub name: String,
    pub position: Option<String>,
    pub position_group: Option<String>,
    pub snaps_in_state: u64,
    pub ius: f64,
    pub roles_breakdown: BTreeMap<String, u64>,
    pub n_system_states_seen: u32,
    /// Teammate with the highest pairwise Jaccard in this window.
    pub closest_partner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStateSummary {
    pub system_state_id: String,
    pub team_snaps: u64,
    pub distinct_players: usize,
    pub top_pairs: Vec<PairEdge>,
    pub position_mix: BTreeMap<String, u64>,
}

pub struct CohesionService {
    store: Arc<dyn SnapStore>,
    index: Arc<SystemStateIndex>,
    cache: Arc<ContextCache>,
    scorer: CohesionScorer,
}

impl CohesionService {
    pub fn new(store: Arc<dyn SnapStore>, config: EngineConfig) -> Self {
        let builder = Arc::new(StoreAggregateBuilder::new(store.clone(), config.scoring.clone()));
        Self::with_builder(store, builder, config)
    }

    /// Same as `new` but with a caller-supplied aggregate builder.
    pub fn with_builder(
        store: Arc<dyn SnapStore>,
        builder: Arc<dyn AggregateBuilder>,
        config: EngineConfig,
    ) -> Self {
        let index = Arc::new(SystemStateIndex::new(store.clone()));
        let cache = Arc::new(ContextCache::new(builder, config.cache.build_timeout));
        let scorer = CohesionScorer::new(index.clone(), cache.clone(), config.scoring);
        Self {
            store,
            index,
            cache,
            scorer,
        }
    }

    pub fn seasons(&self) -> CohesionResult<Vec<i32>> {
        self.store
            .seasons()
            .map_err(|err| CohesionError::upstream(&err))
    }

    pub fn teams(&self, season: Option<i32>) -> CohesionResult<Vec<String>> {
        self.store
            .teams(season)
            .map_err(|err| CohesionError::upstream(&err))
    }

    pub fn system_states(&self, team: &str, side: Side) -> CohesionResult<Vec<SystemStateLabel>> {
        let windows = self.index.windows_for(team, side)?;
        Ok(windows
            .iter()
            .map(|state| SystemStateLabel {
                label: state.label(),
                state: state.clone(),
            })
            .collect())
    }

    pub fn active_system_state(
        &self,
        team: &str,
        side: Side,
        date: Option<NaiveDate>,
    ) -> CohesionResult<Option<SystemState>> {
        self.index.active_for(team, side, date)
    }

    pub fn integrity_issues(&self, team: &str, side: Side) -> CohesionResult<Vec<String>> {
        self.index.integrity_issues(team, side)
    }

    /// Heaviest players first; ties by name, then id.
    pub fn roster(&self, team: &str, side: Side, system_state_id: &str) -> CohesionResult<Vec<RosterPlayer>> {
        let aggregate = self.aggregate(team, side, system_state_id)?;
        let graph = aggregate.graph();
        let mut players: Vec<RosterPlayer> = aggregate
            .roster()
            .values()
            .map(|u| RosterPlayer {
                gsis_id: u.gsis_id.clone(),
                name: u.name.clone(),
                position: u.position.clone(),
                position_group: u.position_group.clone(),
                snaps_in_state: u.snaps_in_state,
                ius: u.ius,
                roles_breakdown: u.roles_breakdown.clone(),
                n_system_states_seen: u.n_system_states_seen,
                closest_partner: graph.neighbors(&u.gsis_id).first().map(|(id, _)| id.clone()),
            })
            .collect();
        players.sort_by(|a, b| {
            b.snaps_in_state
                .cmp(&a.snaps_in_state)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.gsis_id.cmp(&b.gsis_id))
        });
        Ok(players)
    }

    pub fn summary(&self, team: &str, side: Side, system_state_id: &str) -> CohesionResult<SystemStateSummary> {
        let aggregate = self.aggregate(team, side, system_state_id)?;
        Ok(SystemStateSummary {
            system_state_id: aggregate.system_state_id().to_string(),
            team_snaps: aggregate.total_snaps(),
            distinct_players: aggregate.roster().len(),
            top_pairs: aggregate
                .graph()
                .top_pairs(self.scorer.config().top_pairs_limit),
            position_mix: aggregate.position_mix(),
        })
    }

    pub fn score(
        &self,
        team: &str,
        side: Side,
        system_state_id: &str,
        lineup: &[String],
    ) -> CohesionResult<ScoreResult> {
        self.scorer.score(team, side, system_state_id, lineup)
    }

    /// `date` defaults to today (UTC).
    pub fn active_coaches(&self, team: &str, date: Option<NaiveDate>) -> CohesionResult<CoachesActive> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        coaches::active_coaches(self.store.as_ref(), team, date)
    }

    /// Drops one cached context. Returns true if anything was evicted.
    pub fn invalidate(&self, system_state_id: &str) -> bool {
        self.cache.invalidate(system_state_id)
    }

    /// Drops every cached context and the window index. Returns the number
    /// of contexts evicted.
    pub fn invalidate_all(&self) -> usize {
        self.index.invalidate_all();
        self.cache.invalidate_all()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn aggregate(&self, team: &str, side: Side, system_state_id: &str) -> CohesionResult<Arc<ContextAggregate>> {
        let state = self.index.resolve(team, side, system_state_id)?;
        self.cache.get_or_build(&state)
    }
}
