use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use rusqlite::{Connection, params, params_from_iter};

use crate::store::{
    CoSnapRecord, CoachRole, PlayerBio, PlayerSnapRecord, RoleCountRecord, RolePairWeightRecord,
    SnapStore,
};
use crate::system_state::{Side, SystemState};

const CACHE_DIR: &str = "lineup_cohesion";
const DB_FILE: &str = "cohesion.sqlite";
// Stays well under SQLite's bound-parameter limit.
const IN_CHUNK: usize = 500;

pub struct SqliteSnapStore {
    conn: Mutex<Connection>,
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR).join(DB_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(DB_FILE))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS games (
            game_id TEXT PRIMARY KEY,
            season INTEGER NOT NULL,
            week INTEGER NULL,
            game_date TEXT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_season ON games(season);

        CREATE TABLE IF NOT EXISTS players (
            gsis_id TEXT PRIMARY KEY,
            display_name TEXT NULL,
            position TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS coach_roles (
            coach_id TEXT NOT NULL,
            coach_name TEXT NOT NULL,
            team TEXT NOT NULL,
            role TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NULL,
            start_game_id TEXT NULL,
            end_game_id TEXT NULL,
            PRIMARY KEY (coach_id, team, role, start_date)
        );

        CREATE TABLE IF NOT EXISTS system_states (
            system_state_id TEXT PRIMARY KEY,
            team TEXT NOT NULL,
            side TEXT NOT NULL CHECK (side IN ('offense', 'defense')),
            coach_id TEXT NOT NULL,
            coach_name TEXT NULL,
            role TEXT NULL,
            window_start TEXT NULL,
            window_end TEXT NULL,
            start_game_id TEXT NULL,
            end_game_id TEXT NULL,
            total_snaps INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_states_team_side ON system_states(team, side);

        CREATE TABLE IF NOT EXISTS player_snaps_in_state (
            system_state_id TEXT NOT NULL,
            gsis_id TEXT NOT NULL,
            snaps INTEGER NOT NULL,
            PRIMARY KEY (system_state_id, gsis_id)
        );
        CREATE INDEX IF NOT EXISTS idx_snaps_gsis ON player_snaps_in_state(gsis_id);

        CREATE TABLE IF NOT EXISTS player_role_counts_in_state (
            system_state_id TEXT NOT NULL,
            gsis_id TEXT NOT NULL,
            role TEXT NOT NULL,
            snaps INTEGER NOT NULL,
            PRIMARY KEY (system_state_id, gsis_id, role)
        );

        CREATE TABLE IF NOT EXISTS co_snaps (
            system_state_id TEXT NOT NULL,
            a_gsis TEXT NOT NULL,
            b_gsis TEXT NOT NULL,
            co_snaps INTEGER NOT NULL,
            PRIMARY KEY (system_state_id, a_gsis, b_gsis),
            CHECK (a_gsis < b_gsis)
        );

        CREATE TABLE IF NOT EXISTS role_pair_weights (
            side TEXT NOT NULL,
            role_a TEXT NOT NULL,
            role_b TEXT NOT NULL,
            weight REAL NOT NULL,
            PRIMARY KEY (side, role_a, role_b)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

impl SqliteSnapStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_db(path)?),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs raw SQL against the store; used to load fixtures.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql).context("execute sql batch")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }
}

impl SnapStore for SqliteSnapStore {
    fn seasons(&self) -> Result<Vec<i32>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT season FROM games ORDER BY season ASC")
            .context("prepare seasons query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i32>(0))
            .context("query seasons")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode season row")?);
        }
        Ok(out)
    }

    fn teams(&self, season: Option<i32>) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT team FROM (
                    SELECT home_team AS team FROM games WHERE ?1 IS NULL OR season = ?1
                    UNION
                    SELECT away_team AS team FROM games WHERE ?1 IS NULL OR season = ?1
                )
                WHERE team <> ''
                ORDER BY team ASC
                "#,
            )
            .context("prepare teams query")?;
        let rows = stmt
            .query_map(params![season], |row| row.get::<_, String>(0))
            .context("query teams")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode team row")?);
        }
        Ok(out)
    }

    fn system_states(&self, team: &str, side: Side) -> Result<Vec<SystemState>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT
                    system_state_id, team, coach_id, coach_name, role,
                    window_start, window_end, start_game_id, end_game_id, total_snaps
                FROM system_states
                WHERE team = ?1 AND side = ?2
                "#,
            )
            .context("prepare system states query")?;
        let rows = stmt
            .query_map(params![team, side.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, i64>(9)?,
                ))
            })
            .context("query system states")?;

        let mut out = Vec::new();
        for row in rows {
            let (id, team, coach_id, coach_name, role, start, end, start_game, end_game, snaps) =
                row.context("decode system state row")?;
            out.push(SystemState {
                window_start: parse_date(start.as_deref())
                    .with_context(|| format!("window_start of {id}"))?,
                window_end: parse_date(end.as_deref())
                    .with_context(|| format!("window_end of {id}"))?,
                id,
                team,
                side,
                coach_id,
                coach_name,
                role,
                start_game_id: start_game,
                end_game_id: end_game,
                total_snaps: snaps.max(0) as u64,
            });
        }
        Ok(out)
    }

    fn player_snaps(&self, state: &SystemState) -> Result<Vec<PlayerSnapRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT gsis_id, snaps FROM player_snaps_in_state WHERE system_state_id = ?1",
            )
            .context("prepare player snaps query")?;
        let rows = stmt
            .query_map(params![state.id], |row| {
                Ok(PlayerSnapRecord {
                    gsis_id: row.get(0)?,
                    snaps: row.get::<_, i64>(1)?.max(0) as u64,
                })
            })
            .context("query player snaps")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode player snaps row")?);
        }
        Ok(out)
    }

    fn role_counts(&self, state: &SystemState) -> Result<Vec<RoleCountRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT gsis_id, role, snaps
                FROM player_role_counts_in_state
                WHERE system_state_id = ?1
                "#,
            )
            .context("prepare role counts query")?;
        let rows = stmt
            .query_map(params![state.id], |row| {
                Ok(RoleCountRecord {
                    gsis_id: row.get(0)?,
                    role: row.get(1)?,
                    snaps: row.get::<_, i64>(2)?.max(0) as u64,
                })
            })
            .context("query role counts")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode role count row")?);
        }
        Ok(out)
    }

    fn career_states_seen(&self, gsis_ids: &[String]) -> Result<HashMap<String, u32>> {
        let conn = self.conn()?;
        let mut out = HashMap::with_capacity(gsis_ids.len());
        for chunk in gsis_ids.chunks(IN_CHUNK) {
            let sql = format!(
                r#"
                SELECT gsis_id, COUNT(DISTINCT system_state_id)
                FROM player_snaps_in_state
                WHERE snaps > 0 AND gsis_id IN ({})
                GROUP BY gsis_id
                "#,
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql).context("prepare career states query")?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .context("query career states")?;
            for row in rows {
                let (id, count) = row.context("decode career states row")?;
                out.insert(id, count.max(0) as u32);
            }
        }
        Ok(out)
    }

    fn co_snaps(&self, state: &SystemState) -> Result<Vec<CoSnapRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT a_gsis, b_gsis, co_snaps
                FROM co_snaps
                WHERE system_state_id = ?1 AND co_snaps > 0
                "#,
            )
            .context("prepare co_snaps query")?;
        let rows = stmt
            .query_map(params![state.id], |row| {
                Ok(CoSnapRecord {
                    a: row.get(0)?,
                    b: row.get(1)?,
                    co_snaps: row.get::<_, i64>(2)?.max(0) as u64,
                })
            })
            .context("query co_snaps")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode co_snaps row")?);
        }
        Ok(out)
    }

    fn player_bios(&self, gsis_ids: &[String]) -> Result<HashMap<String, PlayerBio>> {
        let conn = self.conn()?;
        let mut out = HashMap::with_capacity(gsis_ids.len());
        for chunk in gsis_ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT gsis_id, display_name, position FROM players WHERE gsis_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql).context("prepare players query")?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        PlayerBio {
                            display_name: row.get(1)?,
                            position: row.get(2)?,
                        },
                    ))
                })
                .context("query players")?;
            for row in rows {
                let (id, bio) = row.context("decode player row")?;
                out.insert(id, bio);
            }
        }
        Ok(out)
    }

    fn role_pair_weights(&self, side: Side) -> Result<Vec<RolePairWeightRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT role_a, role_b, weight FROM role_pair_weights WHERE side = ?1")
            .context("prepare role pair weights query")?;
        let rows = stmt
            .query_map(params![side.as_str()], |row| {
                Ok(RolePairWeightRecord {
                    role_a: row.get(0)?,
                    role_b: row.get(1)?,
                    weight: row.get(2)?,
                })
            })
            .context("query role pair weights")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode role pair weight row")?);
        }
        Ok(out)
    }

    fn coach_roles(&self, team: &str) -> Result<Vec<CoachRole>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT coach_id, coach_name, team, role, start_date, end_date,
                       start_game_id, end_game_id
                FROM coach_roles
                WHERE team = ?1
                "#,
            )
            .context("prepare coach roles query")?;
        let rows = stmt
            .query_map(params![team], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })
            .context("query coach roles")?;
        let mut out = Vec::new();
        for row in rows {
            let (coach_id, coach_name, team, role, start, end, start_game_id, end_game_id) =
                row.context("decode coach role row")?;
            let start_date = parse_date(Some(&start))?
                .with_context(|| format!("coach {coach_id} has an empty start_date"))?;
            out.push(CoachRole {
                end_date: parse_date(end.as_deref())
                    .with_context(|| format!("end_date of coach {coach_id}"))?,
                coach_id,
                coach_name,
                team,
                role,
                start_date,
                start_game_id,
                end_game_id,
            });
        }
        Ok(out)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    // Tolerate timestamps by keeping the date part only.
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map(Some)
        .with_context(|| format!("invalid date {raw:?}"))
}
