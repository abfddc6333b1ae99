use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CohesionError {
    /// Malformed request input. Rejected before any cache access.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("aggregate build for system state {system_state_id} timed out after {waited_ms} ms")]
    BuildTimeout {
        system_state_id: String,
        waited_ms: u64,
    },

    #[error("snap aggregate store error: {0}")]
    UpstreamStore(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CohesionError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Store failures keep the whole anyhow context chain in the message.
    pub fn upstream(err: &anyhow::Error) -> Self {
        Self::UpstreamStore(format!("{err:#}"))
    }

    /// True for failures where the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BuildTimeout { .. } | Self::UpstreamStore(_) | Self::Internal(_)
        )
    }
}

pub type CohesionResult<T> = Result<T, CohesionError>;

/// Non-fatal data gaps attached to a score as warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataGapWarning {
    MissingPlayerUsage { gsis_id: String },
    SparsePairs { missing: usize, total: usize },
}

impl fmt::Display for DataGapWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPlayerUsage { gsis_id } => write!(
                f,
                "Player {gsis_id} has no recorded snaps in this system state"
            ),
            Self::SparsePairs { missing, total } => write!(
                f,
                "{missing} of {total} lineup pairs have no recorded co-snaps; LIC treats them as 0"
            ),
        }
    }
}
