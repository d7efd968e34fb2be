//! External program checks run before any staging.

use std::path::PathBuf;

use tracing::{debug, info};
use vandv_core::PipelineSettings;

use crate::error::{PipelineError, PipelineResult};

/// A program the run depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub program: String,
    pub purpose: &'static str,
}

/// Programs needed by a run with `settings`. `git` is only required when
/// publishing.
pub fn requirements(settings: &PipelineSettings) -> Vec<Requirement> {
    let mut reqs = vec![
        Requirement {
            program: settings.toolchain.program.clone(),
            purpose: "solver",
        },
        Requirement {
            program: settings.plot.program.clone(),
            purpose: "plot script interpreter",
        },
        Requirement {
            program: settings.combined_plot.program.clone(),
            purpose: "combined plot script interpreter",
        },
    ];
    if settings.publish && settings.results_repo.is_some() {
        reqs.push(Requirement {
            program: "git".to_string(),
            purpose: "results publication",
        });
    }
    reqs.dedup_by(|a, b| a.program == b.program);
    reqs
}

/// Resolve every requirement on `PATH`, failing on the first missing one.
pub fn check(requirements: &[Requirement]) -> PipelineResult<Vec<PathBuf>> {
    let mut found = Vec::with_capacity(requirements.len());
    for req in requirements {
        let path = which::which(&req.program).map_err(|_| PipelineError::Preflight {
            program: req.program.clone(),
            purpose: req.purpose.to_string(),
        })?;
        debug!(program = %req.program, path = %path.display(), "Found");
        found.push(path);
    }
    info!(checked = found.len(), "Preflight passed");
    Ok(found)
}
