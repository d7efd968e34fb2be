//! Plot publication into the results-hosting repository.
//!
//! Publishing is additive: only `vandv_files/{code}/{code}_{model}_{cfg}`
//! directories of the configurations being published are replaced. Every
//! other path on the branch is left as found.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};
use vandv_core::{branch_name, publication_dir, Author, ValidationCase, VersionControl};

use crate::error::{PipelineError, PipelineResult};
use crate::fs_ops::{copy_dir_all, remove_path};

/// What a publish step did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub branch: String,
    /// Configurations whose plots were copied into the work tree.
    pub published: Vec<String>,
    pub committed: bool,
    pub pushed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Publishes into one branch of a checked-out results repository.
pub struct Publisher<'a> {
    vcs: &'a dyn VersionControl,
    work_tree: PathBuf,
    case: ValidationCase,
    author: Author,
    branch: String,
    push: bool,
}

impl<'a> Publisher<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        work_tree: impl Into<PathBuf>,
        case: &ValidationCase,
        author: &Author,
        push: bool,
    ) -> Self {
        Self {
            vcs,
            work_tree: work_tree.into(),
            case: case.clone(),
            author: author.clone(),
            branch: branch_name(case, author),
            push,
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    pub fn case(&self) -> &ValidationCase {
        &self.case
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    fn failed(&self, reason: impl ToString) -> PipelineError {
        PipelineError::PublishFailed {
            branch: self.branch.clone(),
            reason: reason.to_string(),
        }
    }

    /// Check out the repository and switch to the publication branch,
    /// reusing it when it already exists.
    pub async fn prepare(&self, source: &str, base_ref: Option<&str>) -> PipelineResult<()> {
        self.vcs
            .checkout(source, base_ref, &self.work_tree)
            .await
            .map_err(|e| self.failed(e))?;
        self.vcs
            .create_or_switch_branch(&self.work_tree, &self.branch)
            .await
            .map_err(|e| self.failed(e))?;
        info!(branch = %self.branch, work_tree = %self.work_tree.display(), "Results repository ready");
        Ok(())
    }

    /// Replace the destination directory of each `(configuration, plots)`
    /// pair, then commit and push.
    ///
    /// Failures are reported in the outcome, never returned.
    pub async fn publish(&self, targets: &[(String, PathBuf)]) -> PublishOutcome {
        let mut outcome = PublishOutcome {
            branch: self.branch.clone(),
            ..PublishOutcome::default()
        };
        if targets.is_empty() {
            info!(branch = %self.branch, "No plots to publish");
            return outcome;
        }

        for (configuration, plots) in targets {
            let dest = self.work_tree.join(publication_dir(&self.case, configuration));
            let copied = remove_path(&dest)
                .map_err(PipelineError::from)
                .and_then(|()| copy_dir_all(plots, &dest));
            match copied {
                Ok(files) => {
                    info!(%configuration, files, dest = %dest.display(), "Published plots");
                    outcome.published.push(configuration.clone());
                }
                Err(e) => {
                    let err = self.failed(format!("{configuration}: {e}"));
                    error!(error = %err, "Publish failed");
                    outcome.error = Some(err.to_string());
                    return outcome;
                }
            }
        }

        let message = format!(
            "Add validation results for {} by {}",
            self.case.case_code, self.author
        );
        match self.commit_and_push(&message).await {
            Ok((committed, pushed)) => {
                outcome.committed = committed;
                outcome.pushed = pushed;
            }
            Err(e) => {
                error!(error = %e, "Publish failed");
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    /// Commit pending changes and push when something was committed.
    /// Returns `(committed, pushed)`.
    pub async fn commit_and_push(&self, message: &str) -> PipelineResult<(bool, bool)> {
        let committed = self
            .vcs
            .commit_if_changed(&self.work_tree, message)
            .await
            .map_err(|e| self.failed(e))?;
        if !committed {
            info!(branch = %self.branch, "Nothing changed; skipping push");
            return Ok((false, false));
        }
        if !self.push {
            info!(branch = %self.branch, "Push disabled");
            return Ok((true, false));
        }
        self.vcs
            .push(&self.work_tree, &self.branch)
            .await
            .map_err(|e| self.failed(e))?;
        info!(branch = %self.branch, "Pushed results branch");
        Ok((true, true))
    }
}
