//! Combined plots across sibling configurations.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vandv_core::{publication_case_dir, COMBINED_PLOTS_DIR};

use crate::error::PipelineError;
use crate::fs_ops::list_subdirs;
use crate::plotting::Plotter;
use crate::publisher::Publisher;

/// What the combine step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CombineOutcome {
    /// Fewer than two configuration outputs exist for the case.
    Skipped { siblings: usize },
    Combined { siblings: usize, committed: bool, pushed: bool },
    Failed { reason: String },
}

/// Generates combined plots in the publication work tree when more than one
/// configuration of the case has been published there.
pub struct Combiner<'a> {
    plotter: &'a dyn Plotter,
    publisher: &'a Publisher<'a>,
}

impl<'a> Combiner<'a> {
    pub fn new(plotter: &'a dyn Plotter, publisher: &'a Publisher<'a>) -> Self {
        Self { plotter, publisher }
    }

    /// Number of `{code}_*` configuration output directories under the case's
    /// publication directory.
    pub fn sibling_count(&self) -> usize {
        let case = self.publisher.case();
        let case_dir = self.publisher.work_tree().join(publication_case_dir(case));
        let prefix = format!("{}_", case.case_code);
        list_subdirs(&case_dir)
            .unwrap_or_default()
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy())
            .filter(|n| n.starts_with(&prefix) && *n != COMBINED_PLOTS_DIR)
            .count()
    }

    /// Best effort: failures come back as [`CombineOutcome::Failed`].
    pub async fn combine(&self) -> CombineOutcome {
        let case = self.publisher.case();
        let siblings = self.sibling_count();
        if siblings < 2 {
            info!(siblings, "Skipping combined plots");
            return CombineOutcome::Skipped { siblings };
        }

        let case_dir = self.publisher.work_tree().join(publication_case_dir(case));
        let output_dir = case_dir.join(COMBINED_PLOTS_DIR);
        let failed = |reason: String| {
            let err = PipelineError::CombineFailed {
                case_code: case.case_code.clone(),
                reason,
            };
            warn!(error = %err, "Combined plots failed");
            CombineOutcome::Failed {
                reason: err.to_string(),
            }
        };

        if let Err(e) = self
            .plotter
            .generate_combined_plots(&case.case_code, &case_dir, &output_dir)
            .await
        {
            return failed(e.to_string());
        }

        let message = format!(
            "Add combined plots for {} by {}",
            case.case_code,
            self.publisher.author()
        );
        match self.publisher.commit_and_push(&message).await {
            Ok((committed, pushed)) => CombineOutcome::Combined {
                siblings,
                committed,
                pushed,
            },
            Err(e) => failed(e.to_string()),
        }
    }
}
