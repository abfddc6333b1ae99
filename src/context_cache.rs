//! Per-context aggregate cache with single-flight builds.
//!
//! A key is either `Ready` (published, immutable) or `Building` (one
//! in-flight build that every concurrent caller waits on). Builds run on
//! their own thread, so a caller that gives up never cancels the work for
//! the others. Failures are handed to the waiters of that attempt and are
//! never stored.
//!
//! A `Building` slot is only ever replaced by the thread that owns it, so a
//! key never has two builds running. Invalidating an in-flight key marks its
//! flight superseded: its result is not published, and callers arriving
//! after the invalidation wait for it to drain before starting one fresh
//! build.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::aggregate::{AggregateBuilder, ContextAggregate};
use crate::error::{CohesionError, CohesionResult};
use crate::system_state::SystemState;

type BuildOutcome = CohesionResult<Arc<ContextAggregate>>;

#[derive(Clone)]
enum Slot {
    Ready(Arc<ContextAggregate>),
    Building(Arc<Flight>),
}

struct Flight {
    outcome: Mutex<Option<BuildOutcome>>,
    done: Condvar,
    superseded: AtomicBool,
}

impl Flight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
            superseded: AtomicBool::new(false),
        }
    }

    // Read and written with the slots lock held.
    fn supersede(&self) {
        self.superseded.store(true, Ordering::SeqCst);
    }

    fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::SeqCst)
    }

    fn finish(&self, outcome: BuildOutcome) {
        *lock(&self.outcome) = Some(outcome);
        self.done.notify_all();
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
    builds_started: AtomicU64,
    build_failures: AtomicU64,
    timeouts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    pub builds_started: u64,
    pub build_failures: u64,
    pub timeouts: u64,
}

pub struct ContextCache {
    builder: Arc<dyn AggregateBuilder>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    counters: Arc<Counters>,
    build_timeout: Duration,
}

impl ContextCache {
    pub fn new(builder: Arc<dyn AggregateBuilder>, build_timeout: Duration) -> Self {
        Self {
            builder,
            slots: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
            build_timeout,
        }
    }

    /// Returns the published aggregate, joining or starting the key's build.
    /// Each caller waits at most `build_timeout` from its own arrival; a
    /// caller that times out leaves the build running and publishing.
    pub fn get_or_build(&self, state: &SystemState) -> BuildOutcome {
        let arrived = Instant::now();
        let deadline = arrived + self.build_timeout;
        loop {
            let (flight, joined) = {
                let mut slots = lock(&self.slots);
                match slots.get(&state.id).cloned() {
                    Some(Slot::Ready(aggregate)) => {
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(system_state_id = %state.id, "context cache hit");
                        return Ok(aggregate);
                    }
                    Some(Slot::Building(flight)) if !flight.is_superseded() => {
                        self.counters.joins.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(system_state_id = %state.id, "joining in-flight build");
                        (flight, true)
                    }
                    Some(Slot::Building(flight)) => {
                        tracing::debug!(
                            system_state_id = %state.id,
                            "waiting for superseded build to drain"
                        );
                        (flight, false)
                    }
                    None => {
                        self.counters.misses.fetch_add(1, Ordering::Relaxed);
                        let flight = Arc::new(Flight::new());
                        slots.insert(state.id.clone(), Slot::Building(flight.clone()));
                        if let Err(err) = self.spawn_build(state.clone(), flight.clone()) {
                            slots.remove(&state.id);
                            return Err(err);
                        }
                        (flight, true)
                    }
                }
            };

            match wait_until(&flight, deadline) {
                Some(outcome) if joined => return outcome,
                // The drained build removed its slot; look again.
                Some(_) => continue,
                None => {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(system_state_id = %state.id, "timed out waiting for context build");
                    return Err(CohesionError::BuildTimeout {
                        system_state_id: state.id.clone(),
                        waited_ms: arrived.elapsed().as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Returns true if the key was cached or building. A published
    /// aggregate is dropped; an in-flight build is marked superseded.
    pub fn invalidate(&self, system_state_id: &str) -> bool {
        let mut slots = lock(&self.slots);
        let hit = match slots.get(system_state_id).cloned() {
            Some(Slot::Ready(_)) => {
                slots.remove(system_state_id);
                true
            }
            Some(Slot::Building(flight)) => {
                flight.supersede();
                true
            }
            None => false,
        };
        if hit {
            tracing::info!(system_state_id, "context invalidated");
        }
        hit
    }

    pub fn invalidate_all(&self) -> usize {
        let mut slots = lock(&self.slots);
        let n = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready(_) => false,
            Slot::Building(flight) => {
                flight.supersede();
                true
            }
        });
        tracing::info!(evicted = n, "all contexts invalidated");
        n
    }

    pub fn is_ready(&self, system_state_id: &str) -> bool {
        matches!(lock(&self.slots).get(system_state_id), Some(Slot::Ready(_)))
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            joins: c.joins.load(Ordering::Relaxed),
            builds_started: c.builds_started.load(Ordering::Relaxed),
            build_failures: c.build_failures.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
        }
    }

    fn spawn_build(&self, state: SystemState, flight: Arc<Flight>) -> CohesionResult<()> {
        let builder = self.builder.clone();
        let slots = self.slots.clone();
        let counters = self.counters.clone();
        let name = format!("ctx-build-{}", state.id.chars().take(12).collect::<String>());
        counters.builds_started.fetch_add(1, Ordering::Relaxed);

        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| builder.build(&state)))
                    .unwrap_or_else(|_| {
                        Err(CohesionError::Internal(format!(
                            "aggregate build for {} panicked",
                            state.id
                        )))
                    })
                    .map(Arc::new);

                {
                    let mut slots = lock(&slots);
                    match &outcome {
                        Ok(aggregate) if !flight.is_superseded() => {
                            slots.insert(state.id.clone(), Slot::Ready(aggregate.clone()));
                        }
                        _ => {
                            if flight.is_superseded() {
                                tracing::debug!(
                                    system_state_id = %state.id,
                                    "build superseded by invalidation; result not published"
                                );
                            }
                            slots.remove(&state.id);
                        }
                    }
                }

                if let Err(err) = &outcome {
                    counters.build_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(system_state_id = %state.id, error = %err, "context build failed");
                }
                flight.finish(outcome);
            })
            .map(|_| ())
            .map_err(|err| CohesionError::Internal(format!("spawn build thread: {err}")))
    }
}

/// Blocks until the flight finishes or `deadline` passes.
fn wait_until(flight: &Flight, deadline: Instant) -> Option<BuildOutcome> {
    let guard = lock(&flight.outcome);
    let timeout = deadline.saturating_duration_since(Instant::now());
    let (guard, _) = match flight
        .done
        .wait_timeout_while(guard, timeout, |outcome| outcome.is_none())
    {
        Ok(pair) => pair,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.clone()
}

// Critical sections here never panic, so a poisoned lock still holds
// consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
