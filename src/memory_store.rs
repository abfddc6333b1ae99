//! In-memory `SnapStore` for tests, benches and offline experiments.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::{Result, anyhow};

use crate::pair_graph::PairKey;
use crate::store::{
    CoSnapRecord, CoachRole, PlayerBio, PlayerSnapRecord, RoleCountRecord, RolePairWeightRecord,
    SnapStore,
};
use crate::system_state::{Side, SystemState};

#[derive(Debug, Default)]
struct Tables {
    games: Vec<(i32, String, String)>,
    states: Vec<SystemState>,
    // state id -> gsis -> role -> snaps
    roles: HashMap<String, HashMap<String, HashMap<String, u64>>>,
    // state id -> gsis -> snaps (when set explicitly instead of via roles)
    snaps: HashMap<String, HashMap<String, u64>>,
    co_snaps: HashMap<String, HashMap<PairKey, u64>>,
    bios: HashMap<String, PlayerBio>,
    pair_weights: HashMap<Side, Vec<RolePairWeightRecord>>,
    coaches: Vec<CoachRole>,
}

#[derive(Debug, Default)]
pub struct InMemorySnapStore {
    tables: RwLock<Tables>,
}

impl InMemorySnapStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_game(&self, season: i32, home: &str, away: &str) {
        self.write(|t| t.games.push((season, home.to_string(), away.to_string())));
    }

    /// Replaces any state with the same id.
    pub fn add_state(&self, state: SystemState) {
        self.write(|t| {
            t.states.retain(|s| s.id != state.id);
            t.states.push(state);
        });
    }

    /// Records a player's role counts; snaps default to the role sum.
    pub fn set_player_roles(&self, state_id: &str, gsis_id: &str, roles: &[(&str, u64)]) {
        self.write(|t| {
            let by_role = roles
                .iter()
                .map(|(role, snaps)| (role.to_string(), *snaps))
                .collect::<HashMap<_, _>>();
            t.roles
                .entry(state_id.to_string())
                .or_default()
                .insert(gsis_id.to_string(), by_role);
        });
    }

    /// Overrides the per-player snap total independently of role counts.
    pub fn set_player_snaps(&self, state_id: &str, gsis_id: &str, snaps: u64) {
        self.write(|t| {
            t.snaps
                .entry(state_id.to_string())
                .or_default()
                .insert(gsis_id.to_string(), snaps);
        });
    }

    pub fn set_co_snaps(&self, state_id: &str, a: &str, b: &str, co_snaps: u64) {
        self.write(|t| {
            t.co_snaps
                .entry(state_id.to_string())
                .or_default()
                .insert(PairKey::new(a, b), co_snaps);
        });
    }

    pub fn set_bio(&self, gsis_id: &str, display_name: &str, position: Option<&str>) {
        self.write(|t| {
            t.bios.insert(
                gsis_id.to_string(),
                PlayerBio {
                    display_name: Some(display_name.to_string()),
                    position: position.map(str::to_string),
                },
            );
        });
    }

    pub fn add_role_pair_weight(&self, side: Side, role_a: &str, role_b: &str, weight: f64) {
        self.write(|t| {
            t.pair_weights.entry(side).or_default().push(RolePairWeightRecord {
                role_a: role_a.to_string(),
                role_b: role_b.to_string(),
                weight,
            });
        });
    }

    pub fn add_coach_role(&self, role: CoachRole) {
        self.write(|t| t.coaches.push(role));
    }

    fn write(&self, apply: impl FnOnce(&mut Tables)) {
        let mut guard = match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
    }

    fn read<T>(&self, query: impl FnOnce(&Tables) -> T) -> Result<T> {
        let guard = self
            .tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(query(&guard))
    }
}

impl SnapStore for InMemorySnapStore {
    fn seasons(&self) -> Result<Vec<i32>> {
        self.read(|t| {
            t.games
                .iter()
                .map(|(season, _, _)| *season)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
    }

    fn teams(&self, season: Option<i32>) -> Result<Vec<String>> {
        self.read(|t| {
            t.games
                .iter()
                .filter(|(s, _, _)| season.is_none_or(|want| *s == want))
                .flat_map(|(_, home, away)| [home.clone(), away.clone()])
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
    }

    fn system_states(&self, team: &str, side: Side) -> Result<Vec<SystemState>> {
        self.read(|t| {
            t.states
                .iter()
                .filter(|s| s.team == team && s.side == side)
                .cloned()
                .collect()
        })
    }

    fn player_snaps(&self, state: &SystemState) -> Result<Vec<PlayerSnapRecord>> {
        self.read(|t| {
            let mut totals: HashMap<String, u64> = t
                .roles
                .get(&state.id)
                .map(|players| {
                    players
                        .iter()
                        .map(|(id, roles)| (id.clone(), roles.values().sum::<u64>()))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(explicit) = t.snaps.get(&state.id) {
                totals.extend(explicit.iter().map(|(id, snaps)| (id.clone(), *snaps)));
            }
            totals
                .into_iter()
                .map(|(gsis_id, snaps)| PlayerSnapRecord { gsis_id, snaps })
                .collect()
        })
    }

    fn role_counts(&self, state: &SystemState) -> Result<Vec<RoleCountRecord>> {
        self.read(|t| {
            let Some(players) = t.roles.get(&state.id) else {
                return Vec::new();
            };
            players
                .iter()
                .flat_map(|(id, roles)| {
                    roles.iter().map(move |(role, snaps)| RoleCountRecord {
                        gsis_id: id.clone(),
                        role: role.clone(),
                        snaps: *snaps,
                    })
                })
                .collect()
        })
    }

    fn career_states_seen(&self, gsis_ids: &[String]) -> Result<HashMap<String, u32>> {
        self.read(|t| {
            let mut seen: HashMap<String, BTreeSet<&str>> = HashMap::new();
            let appearances = t
                .roles
                .iter()
                .flat_map(|(state, players)| {
                    players
                        .iter()
                        .filter(|(_, roles)| roles.values().any(|n| *n > 0))
                        .map(move |(id, _)| (state, id))
                })
                .chain(t.snaps.iter().flat_map(|(state, players)| {
                    players
                        .iter()
                        .filter(|(_, n)| **n > 0)
                        .map(move |(id, _)| (state, id))
                }));
            for (state, id) in appearances {
                if gsis_ids.contains(id) {
                    seen.entry(id.clone()).or_default().insert(state.as_str());
                }
            }
            seen.into_iter()
                .map(|(id, states)| (id, states.len() as u32))
                .collect()
        })
    }

    fn co_snaps(&self, state: &SystemState) -> Result<Vec<CoSnapRecord>> {
        self.read(|t| {
            t.co_snaps
                .get(&state.id)
                .map(|pairs| {
                    pairs
                        .iter()
                        .map(|(key, co)| CoSnapRecord {
                            a: key.a().to_string(),
                            b: key.b().to_string(),
                            co_snaps: *co,
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    fn player_bios(&self, gsis_ids: &[String]) -> Result<HashMap<String, PlayerBio>> {
        self.read(|t| {
            gsis_ids
                .iter()
                .filter_map(|id| t.bios.get(id).map(|bio| (id.clone(), bio.clone())))
                .collect()
        })
    }

    fn role_pair_weights(&self, side: Side) -> Result<Vec<RolePairWeightRecord>> {
        self.read(|t| t.pair_weights.get(&side).cloned().unwrap_or_default())
    }

    fn coach_roles(&self, team: &str) -> Result<Vec<CoachRole>> {
        self.read(|t| t.coaches.iter().filter(|c| c.team == team).cloned().collect())
    }
}
