use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::error::{CohesionError, CohesionResult};
use crate::pair_graph::{self, PairGraph};
use crate::roster::{self, PlayerUsage};
use crate::store::{RolePairWeightRecord, SnapStore};
use crate::system_state::{Side, SystemState};

/// Role-pair importance used to weight lineup pairs in LIC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RolePairWeights {
    weights: HashMap<(String, String), f64>,
}

impl RolePairWeights {
    pub fn from_records(records: impl IntoIterator<Item = RolePairWeightRecord>) -> Self {
        let mut weights = HashMap::new();
        for rec in records {
            if !rec.weight.is_finite() || rec.weight < 0.0 {
                tracing::warn!(
                    role_a = %rec.role_a,
                    role_b = %rec.role_b,
                    weight = rec.weight,
                    "ignoring invalid role pair weight"
                );
                continue;
            }
            weights.insert((rec.role_a, rec.role_b), rec.weight);
        }
        Self { weights }
    }

    /// Either order matches; an exact (a, b) entry wins over (b, a).
    pub fn get(&self, role_a: &str, role_b: &str) -> Option<f64> {
        let lookup = |x: &str, y: &str| self.weights.get(&(x.to_string(), y.to_string())).copied();
        lookup(role_a, role_b).or_else(|| lookup(role_b, role_a))
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Everything the scorer needs for one system state. Built in full, then
/// shared read-only.
#[derive(Debug, Clone)]
pub struct ContextAggregate {
    system_state_id: String,
    side: Side,
    total_snaps: u64,
    roster: HashMap<String, PlayerUsage>,
    graph: PairGraph,
    role_weights: RolePairWeights,
    built_at: DateTime<Utc>,
}

impl ContextAggregate {
    pub fn assemble(
        state: &SystemState,
        roster: HashMap<String, PlayerUsage>,
        graph: PairGraph,
        role_weights: RolePairWeights,
    ) -> Self {
        Self {
            system_state_id: state.id.clone(),
            side: state.side,
            total_snaps: state.total_snaps,
            roster,
            graph,
            role_weights,
            built_at: Utc::now(),
        }
    }

    pub fn system_state_id(&self) -> &str {
        &self.system_state_id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn total_snaps(&self) -> u64 {
        self.total_snaps
    }

    pub fn roster(&self) -> &HashMap<String, PlayerUsage> {
        &self.roster
    }

    pub fn player(&self, gsis_id: &str) -> Option<&PlayerUsage> {
        self.roster.get(gsis_id)
    }

    pub fn graph(&self) -> &PairGraph {
        &self.graph
    }

    pub fn role_weights(&self) -> &RolePairWeights {
        &self.role_weights
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Snaps per role across the whole roster.
    pub fn position_mix(&self) -> BTreeMap<String, u64> {
        let mut mix = BTreeMap::new();
        for usage in self.roster.values() {
            for (role, snaps) in &usage.roles_breakdown {
                *mix.entry(role.clone()).or_insert(0) += snaps;
            }
        }
        mix
    }
}

pub trait AggregateBuilder: Send + Sync {
    fn build(&self, state: &SystemState) -> CohesionResult<ContextAggregate>;
}

pub struct StoreAggregateBuilder {
    store: Arc<dyn SnapStore>,
    scoring: ScoringConfig,
}

impl StoreAggregateBuilder {
    pub fn new(store: Arc<dyn SnapStore>, scoring: ScoringConfig) -> Self {
        Self { store, scoring }
    }
}

impl AggregateBuilder for StoreAggregateBuilder {
    fn build(&self, state: &SystemState) -> CohesionResult<ContextAggregate> {
        let started = Instant::now();
        let roster = roster::build(self.store.as_ref(), state, self.scoring.ius)?;
        let graph = pair_graph::build(
            self.store.as_ref(),
            state,
            &roster,
            self.scoring.edge_weight_scale,
        )?;
        let weights = self
            .store
            .role_pair_weights(state.side)
            .map_err(|err| CohesionError::upstream(&err))?;
        let aggregate =
            ContextAggregate::assemble(state, roster, graph, RolePairWeights::from_records(weights));
        tracing::info!(
            system_state_id = %state.id,
            team = %state.team,
            side = %state.side,
            players = aggregate.roster().len(),
            edges = aggregate.graph().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built context aggregate"
        );
        Ok(aggregate)
    }
}
