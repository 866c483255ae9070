use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Run-level errors. Anything returned as `Err` from the orchestrator aborts the run, so
/// only infrastructural failures belong here; per-dimension failures are [`PhaseError`].
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Invalid state transition for dimension {dim_id}: {from} -> {to}")]
    InvalidStateTransition {
        dim_id: String,
        from: String,
        to: String,
    },

    #[error("Dimension not found: {0}")]
    DimensionNotFound(String),

    #[error("Duplicate dimension id: {0}")]
    DuplicateDimension(String),

    #[error("Tier dependency cycle detected among: {0}")]
    TierCycleDetected(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Invalid dimension catalog: {0}")]
    InvalidCatalog(String),

    #[error("Semaphore closed")]
    SemaphoreClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

impl BootstrapError {
    pub fn catalog<E: std::fmt::Display>(e: E) -> Self {
        Self::InvalidCatalog(e.to_string())
    }
}

/// Failures isolated to a single dimension. These never abort a run: the orchestrator
/// renders them into `DimensionResult::error` and `DimensionResult::failure_kind`.
/// Collaborator `anyhow` errors end up here as `*Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    #[error("explorer timed out after {}s", .0.as_secs())]
    ExplorerTimeout(Duration),

    #[error("explorer failed: {0}")]
    ExplorerFailed(String),

    #[error("formatter timed out after {}s", .0.as_secs())]
    FormatterTimeout(Duration),

    #[error("formatter failed: {0}")]
    FormatterFailed(String),

    /// Cooperative early termination, not a fault of the dimension.
    #[error("session-superseded")]
    SessionSuperseded,

    #[error("checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),

    #[error("artifact emission failed for {dim_id}: {reason}")]
    ArtifactEmission { dim_id: String, reason: String },

    #[error("dimension task panicked: {0}")]
    Panicked(String),
}

impl PhaseError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PhaseError::ExplorerTimeout(_) | PhaseError::FormatterTimeout(_) => {
                FailureKind::Timeout
            }
            PhaseError::SessionSuperseded => FailureKind::Superseded,
            PhaseError::ExplorerFailed(_)
            | PhaseError::FormatterFailed(_)
            | PhaseError::CheckpointCorrupt(_)
            | PhaseError::ArtifactEmission { .. }
            | PhaseError::Panicked(_) => FailureKind::Failed,
        }
    }
}

/// Coarse failure bucket recorded on each failed result and counted in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Failed,
    Superseded,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Failed => "failed",
            FailureKind::Superseded => "superseded",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_superseded_message() {
        assert_eq!(PhaseError::SessionSuperseded.to_string(), "session-superseded");
    }

    #[test]
    fn test_timeout_message_uses_seconds() {
        let err = PhaseError::ExplorerTimeout(Duration::from_secs(180));
        assert_eq!(err.to_string(), "explorer timed out after 180s");
        assert_eq!(err.kind(), FailureKind::Timeout);
    }

    #[test]
    fn test_failure_kind_buckets() {
        assert_eq!(
            PhaseError::FormatterFailed("boom".to_string()).kind(),
            FailureKind::Failed
        );
        assert_eq!(
            PhaseError::SessionSuperseded.kind(),
            FailureKind::Superseded
        );
        assert_eq!(FailureKind::Timeout.to_string(), "timeout");
    }
}
