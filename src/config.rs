use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CohesionError, CohesionResult};

const BLEND_TOLERANCE: f64 = 1e-6;

/// Linear blend weights for `cohesion = w_lsu*LSU + w_liu*LIU + w_lic*LIC`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    lsu: f64,
    liu: f64,
    lic: f64,
}

impl BlendWeights {
    pub fn new(lsu: f64, liu: f64, lic: f64) -> CohesionResult<Self> {
        if [lsu, liu, lic].iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CohesionError::Config(format!(
                "blend weights must be finite and non-negative (got {lsu}, {liu}, {lic})"
            )));
        }
        let sum = lsu + liu + lic;
        if (sum - 1.0).abs() > BLEND_TOLERANCE {
            return Err(CohesionError::Config(format!(
                "blend weights must sum to 1 (got {sum:.6})"
            )));
        }
        Ok(Self { lsu, liu, lic })
    }

    pub fn lsu(&self) -> f64 {
        self.lsu
    }

    pub fn liu(&self) -> f64 {
        self.liu
    }

    pub fn lic(&self) -> f64 {
        self.lic
    }

    pub fn blend(&self, lsu: f64, liu: f64, lic: f64) -> f64 {
        self.lsu * lsu + self.liu * liu + self.lic * lic
    }
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            lsu: 0.35,
            liu: 0.20,
            lic: 0.45,
        }
    }
}

/// Shape of the individual understanding curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IusParams {
    pub share_exponent: f64,
    pub exposure_gain: f64,
}

impl Default for IusParams {
    fn default() -> Self {
        Self {
            share_exponent: 1.0,
            exposure_gain: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LsuParams {
    pub curve_exponent: f64,
}

impl Default for LsuParams {
    fn default() -> Self {
        Self {
            curve_exponent: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub blend: BlendWeights,
    pub ius: IusParams,
    pub lsu: LsuParams,
    // Missing lineup edges (out of 55) at which a sparsity warning is raised.
    pub sparse_pair_threshold: usize,
    pub edge_weight_scale: f64,
    pub top_pairs_limit: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            blend: BlendWeights::default(),
            ius: IusParams::default(),
            lsu: LsuParams::default(),
            sparse_pair_threshold: 10,
            edge_weight_scale: 1.0,
            top_pairs_limit: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub build_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            build_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub cache: CacheConfig,
}

impl EngineConfig {
    pub fn from_env() -> CohesionResult<Self> {
        let defaults = ScoringConfig::default();
        let blend = BlendWeights::new(
            env_parse("COHESION_W_LSU").unwrap_or(defaults.blend.lsu()),
            env_parse("COHESION_W_LIU").unwrap_or(defaults.blend.liu()),
            env_parse("COHESION_W_LIC").unwrap_or(defaults.blend.lic()),
        )?;
        let ius = IusParams {
            share_exponent: env_parse::<f64>("COHESION_IUS_SHARE_EXPONENT")
                .unwrap_or(defaults.ius.share_exponent)
                .clamp(0.1, 4.0),
            exposure_gain: env_parse::<f64>("COHESION_IUS_EXPOSURE_GAIN")
                .unwrap_or(defaults.ius.exposure_gain)
                .max(0.0),
        };
        let lsu = LsuParams {
            curve_exponent: env_parse::<f64>("COHESION_LSU_CURVE_EXPONENT")
                .unwrap_or(defaults.lsu.curve_exponent)
                .clamp(0.1, 4.0),
        };
        let scoring = ScoringConfig {
            blend,
            ius,
            lsu,
            sparse_pair_threshold: env_parse::<usize>("COHESION_SPARSE_PAIR_THRESHOLD")
                .unwrap_or(defaults.sparse_pair_threshold)
                .clamp(1, 55),
            edge_weight_scale: env_parse::<f64>("COHESION_EDGE_WEIGHT_SCALE")
                .unwrap_or(defaults.edge_weight_scale)
                .max(0.0),
            top_pairs_limit: env_parse::<usize>("COHESION_TOP_PAIRS")
                .unwrap_or(defaults.top_pairs_limit)
                .clamp(1, 500),
        };
        let cache = CacheConfig {
            build_timeout: Duration::from_secs(
                env_parse::<u64>("COHESION_BUILD_TIMEOUT_SECS")
                    .unwrap_or(30)
                    .clamp(1, 600),
            ),
        };
        Ok(Self { scoring, cache })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr = env_parse::<SocketAddr>("COHESION_BIND")
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8000)));
        let db_path = env::var("COHESION_DB")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .map(PathBuf::from)
            .or_else(crate::sqlite_store::default_db_path);
        Self { bind_addr, db_path }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}
