use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use lineup_cohesion::config::EngineConfig;
use lineup_cohesion::service::CohesionService;
use lineup_cohesion::sqlite_store::{self, SqliteSnapStore};
use lineup_cohesion::system_state::Side;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let db_path = parse_db_path_arg()
        .or_else(sqlite_store::default_db_path)
        .context("unable to resolve sqlite path")?;
    let team = parse_str_arg("--team").context("missing --team")?;
    let side = parse_str_arg("--side")
        .context("missing --side")?
        .parse::<Side>()?;
    let lineup = parse_str_arg("--lineup")
        .context("missing --lineup a,b,...")?
        .split(',')
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect::<Vec<_>>();

    let store = Arc::new(SqliteSnapStore::open(&db_path)?);
    let service = CohesionService::new(store, EngineConfig::from_env()?);

    // Without --state, score against the team's current (open-ended) window.
    let state_id = match parse_str_arg("--state") {
        Some(id) => id,
        None => service
            .active_system_state(&team, side, None)?
            .map(|s| s.id)
            .ok_or_else(|| anyhow!("no active system state for {team} {side}; pass --state"))?,
    };

    let result = service.score(&team, side, &state_id, &lineup)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn parse_db_path_arg() -> Option<PathBuf> {
    parse_str_arg("--db").map(PathBuf::from)
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
