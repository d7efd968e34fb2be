//! Error types for pipeline orchestration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the orchestration layer.
///
/// Per-configuration variants (`MissingSecondaryData`, `StageFailed`,
/// `RunFailed`, `CleanupFailed`) are recorded in the run report and never
/// abort the batch. `NoConfigurationsFound`, `Preflight` and repository
/// checkout failures abort before any staging.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The `All` selector matched no configuration directory.
    #[error("no configurations found under {}", case_root.display())]
    NoConfigurationsFound { case_root: PathBuf },

    /// A mesh case has no counterpart (or an empty one) in the V&V data repo.
    #[error("mesh case {configuration}/{mesh} has no data in the secondary repository")]
    MissingSecondaryData { configuration: String, mesh: String },

    /// Inputs for a configuration could not be staged.
    #[error("staging failed for {configuration}: {reason}")]
    StageFailed { configuration: String, reason: String },

    /// The solver failed, timed out or could not be started.
    #[error("run failed for {configuration}: {reason}")]
    RunFailed { configuration: String, reason: String },

    /// Publication to the results repository failed.
    #[error("publishing to branch {branch} failed: {reason}")]
    PublishFailed { branch: String, reason: String },

    /// Staged files could not be removed.
    #[error("cleanup failed for {}: {reason}", path.display())]
    CleanupFailed { path: PathBuf, reason: String },

    /// Combined plot generation failed.
    #[error("combined plots failed for {case_code}: {reason}")]
    CombineFailed { case_code: String, reason: String },

    /// A required external program is not available.
    #[error("required program {program:?} not found on PATH ({purpose})")]
    Preflight { program: String, purpose: String },

    /// An external tool could not be run.
    #[error("tool {program:?} failed: {reason}")]
    Tool { program: String, reason: String },

    /// Results archive creation failed.
    #[error("archive error: {0}")]
    Archive(String),

    /// Bubbled-up domain error.
    #[error("domain error: {0}")]
    Domain(#[from] vandv_core::VandvError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<walkdir::Error> for PipelineError {
    fn from(err: walkdir::Error) -> Self {
        PipelineError::Io(err.into())
    }
}

/// Convenience result alias.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failed_displays_configuration() {
        let err = PipelineError::RunFailed {
            configuration: "Configuration1".to_string(),
            reason: "Mesh1 exited with code 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Configuration1"));
        assert!(msg.contains("exited with code 1"));
    }

    #[test]
    fn test_missing_secondary_data_displays_mesh() {
        let err = PipelineError::MissingSecondaryData {
            configuration: "Configuration2".to_string(),
            mesh: "Mesh3".to_string(),
        };
        assert!(err.to_string().contains("Configuration2/Mesh3"));
    }

    #[test]
    fn test_domain_error_converts() {
        let err: PipelineError = vandv_core::VandvError::InvalidAuthor("a b".to_string()).into();
        assert!(matches!(err, PipelineError::Domain(_)));
    }
}
