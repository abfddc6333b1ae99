pub mod aggregate;
pub mod api;
pub mod coaches;
pub mod config;
pub mod context_cache;
pub mod error;
pub mod memory_store;
pub mod pair_graph;
pub mod roster;
pub mod scorer;
pub mod service;
pub mod sqlite_store;
pub mod store;
pub mod system_state;
