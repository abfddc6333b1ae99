//! Sparse co-occurrence graph over the players of one system state.
//!
//! Only pairs with a positive joint snap count become edges; an absent edge
//! means "no score", not "zero".

use std::cmp::Ordering;
use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CohesionError, CohesionResult};
use crate::roster::PlayerUsage;
use crate::store::SnapStore;
use crate::system_state::SystemState;

/// Canonical unordered pair: `a < b` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    a: String,
    b: String,
}

impl PairKey {
    pub fn new(x: &str, y: &str) -> Self {
        if x <= y {
            Self {
                a: x.to_string(),
                b: y.to_string(),
            }
        } else {
            Self {
                a: y.to_string(),
                b: x.to_string(),
            }
        }
    }

    pub fn a(&self) -> &str {
        &self.a
    }

    pub fn b(&self) -> &str {
        &self.b
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairEdge {
    pub a: String,
    pub b: String,
    pub co_snaps: u64,
    pub n_a: u64,
    pub n_b: u64,
    pub jaccard: f64,
    pub weight: f64,
}

pub fn jaccard(co_snaps: u64, n_a: u64, n_b: u64) -> f64 {
    let union = (n_a + n_b).saturating_sub(co_snaps);
    if union == 0 {
        return 0.0;
    }
    (co_snaps as f64 / union as f64).clamp(0.0, 1.0)
}

/// Volume transform used for edge weights: monotonic in `co_snaps`, unbounded.
pub fn edge_weight(co_snaps: u64, scale: f64) -> f64 {
    scale.max(0.0) * (co_snaps as f64).ln_1p()
}

#[derive(Debug, Clone, Default)]
pub struct PairGraph {
    edges: HashMap<PairKey, PairEdge>,
    // gsis_id -> neighbours sorted by jaccard desc, then id.
    adjacency: HashMap<String, Vec<(String, f64)>>,
}

impl PairGraph {
    pub fn from_edges(edges: impl IntoIterator<Item = PairEdge>) -> Self {
        let mut map = HashMap::new();
        let mut adjacency: HashMap<String, Vec<(String, f64)>> = HashMap::new();
        for edge in edges {
            adjacency
                .entry(edge.a.clone())
                .or_default()
                .push((edge.b.clone(), edge.jaccard));
            adjacency
                .entry(edge.b.clone())
                .or_default()
                .push((edge.a.clone(), edge.jaccard));
            map.insert(PairKey::new(&edge.a, &edge.b), edge);
        }
        for neighbours in adjacency.values_mut() {
            neighbours.sort_by(|x, y| {
                y.1.partial_cmp(&x.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| x.0.cmp(&y.0))
            });
        }
        Self {
            edges: map,
            adjacency,
        }
    }

    /// Looks up a pair in either order.
    pub fn edge(&self, x: &str, y: &str) -> Option<&PairEdge> {
        self.edges.get(&PairKey::new(x, y))
    }

    pub fn neighbors(&self, gsis_id: &str) -> &[(String, f64)] {
        self.adjacency
            .get(gsis_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Highest co-snap edges first; ties by pair key so output is stable.
    pub fn top_pairs(&self, limit: usize) -> Vec<PairEdge> {
        let mut ranked: Vec<(&PairKey, &PairEdge)> = self.edges.iter().collect();
        ranked.sort_by(|x, y| y.1.co_snaps.cmp(&x.1.co_snaps).then_with(|| x.0.cmp(y.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(_, edge)| edge.clone())
            .collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = &PairEdge> {
        self.edges.values()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

pub fn build(
    store: &dyn SnapStore,
    state: &SystemState,
    roster: &HashMap<String, PlayerUsage>,
    weight_scale: f64,
) -> CohesionResult<PairGraph> {
    let rows = store
        .co_snaps(state)
        .map_err(|err| CohesionError::upstream(&err))?;
    let mut co_by_pair: HashMap<PairKey, u64> = HashMap::with_capacity(rows.len());
    for row in rows {
        if row.a == row.b || row.co_snaps == 0 {
            continue;
        }
        *co_by_pair.entry(PairKey::new(&row.a, &row.b)).or_insert(0) += row.co_snaps;
    }

    let mut ids: Vec<&str> = roster.keys().map(String::as_str).collect();
    ids.sort_unstable();

    let edges: Vec<PairEdge> = (0..ids.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let ids = &ids;
            let co_by_pair = &co_by_pair;
            ((i + 1)..ids.len()).filter_map(move |j| {
                let (a, b) = (ids[i], ids[j]);
                let co = *co_by_pair.get(&PairKey::new(a, b))?;
                let n_a = roster.get(a)?.snaps_in_state;
                let n_b = roster.get(b)?.snaps_in_state;
                Some(make_edge(a, b, co, n_a, n_b, weight_scale))
            })
        })
        .collect();

    Ok(PairGraph::from_edges(edges))
}

fn make_edge(a: &str, b: &str, co_snaps: u64, n_a: u64, n_b: u64, weight_scale: f64) -> PairEdge {
    let cap = n_a.min(n_b);
    let co = if co_snaps > cap {
        tracing::warn!(a, b, co_snaps, cap, "co_snaps exceeds min(n_a, n_b); clamping");
        cap
    } else {
        co_snaps
    };
    PairEdge {
        a: a.to_string(),
        b: b.to_string(),
        co_snaps: co,
        n_a,
        n_b,
        jaccard: jaccard(co, n_a, n_b),
        weight: edge_weight(co, weight_scale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_canonical() {
        let k1 = PairKey::new("P9", "P1");
        let k2 = PairKey::new("P1", "P9");
        assert_eq!(k1, k2);
        assert_eq!(k1.a(), "P1");
        assert_eq!(k1.b(), "P9");
    }

    #[test]
    fn jaccard_bounds_and_symmetry() {
        for (co, n_a, n_b) in [(0, 10, 10), (10, 10, 10), (5, 10, 40), (3, 3, 900), (0, 0, 0)] {
            let j = jaccard(co, n_a, n_b);
            assert!((0.0..=1.0).contains(&j));
            assert_eq!(j, jaccard(co, n_b, n_a));
        }
        assert_eq!(jaccard(10, 10, 10), 1.0);
        assert_eq!(jaccard(0, 0, 0), 0.0);
        assert!((jaccard(5, 10, 40) - 5.0 / 45.0).abs() < 1e-12);
    }

    #[test]
    fn edge_weight_is_monotonic() {
        assert_eq!(edge_weight(0, 1.0), 0.0);
        assert!(edge_weight(100, 1.0) > edge_weight(10, 1.0));
        assert!(edge_weight(100, 1.0) > 1.0);
    }

    #[test]
    fn make_edge_clamps_excess_co_snaps() {
        let e = make_edge("A", "B", 80, 50, 60, 1.0);
        assert_eq!(e.co_snaps, 50);
        assert!(e.jaccard <= 1.0);
    }

    #[test]
    fn graph_lookup_neighbors_and_top_pairs() {
        let graph = PairGraph::from_edges(vec![
            make_edge("A", "B", 10, 20, 20, 1.0),
            make_edge("A", "C", 15, 20, 20, 1.0),
            make_edge("B", "C", 10, 20, 20, 1.0),
        ]);
        assert_eq!(graph.len(), 3);
        assert!(graph.edge("B", "A").is_some());
        assert!(graph.edge("A", "D").is_none());
        assert_eq!(graph.neighbors("A")[0].0, "C");
        assert!(graph.neighbors("Z").is_empty());
        let top = graph.top_pairs(2);
        assert_eq!((top[0].a.as_str(), top[0].b.as_str()), ("A", "C"));
        assert_eq!((top[1].a.as_str(), top[1].b.as_str()), ("A", "B"));
    }
}
