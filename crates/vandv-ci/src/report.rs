//! Run report: `{workspace}/{bundle}.summary.json` and its terminal rendering.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vandv_core::{Author, ConfigurationSelector, ValidationCase};

use crate::collector::ArchiveInfo;
use crate::combiner::CombineOutcome;
use crate::error::PipelineResult;
use crate::fs_ops::write_atomic;
use crate::publisher::PublishOutcome;
use crate::runner::ConfigurationRun;

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// HEAD commits of the source repositories, when they are git work trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProvenance {
    pub primary_sha: Option<String>,
    pub secondary_sha: Option<String>,
}

/// Everything that happened to one configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationReport {
    pub configuration: String,
    pub staged_meshes: Vec<String>,
    pub skipped_meshes: Vec<String>,
    pub warnings: Vec<String>,
    pub stage_error: Option<String>,
    /// `None` when staging failed and the solver never ran.
    pub run: Option<ConfigurationRun>,
    /// `plots/` inside the results tree, when plots were generated.
    pub plots: Option<PathBuf>,
    pub plot_error: Option<String>,
    pub collected_files: usize,
    pub collect_error: Option<String>,
    pub cleanup_errors: Vec<String>,
}

impl ConfigurationReport {
    pub fn new(configuration: &str) -> Self {
        Self {
            configuration: configuration.to_string(),
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.run.as_ref().is_some_and(|r| r.status.succeeded())
    }

    pub fn failure_reason(&self) -> Option<String> {
        if let Some(e) = &self.stage_error {
            return Some(e.clone());
        }
        self.run.as_ref().and_then(|r| r.failure()).map(|e| e.to_string())
    }
}

/// Report of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub schema_version: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub case: ValidationCase,
    pub selector: String,
    pub author: String,
    pub bundle: String,
    pub branch: String,
    pub sources: SourceProvenance,
    pub configurations: Vec<ConfigurationReport>,
    pub archive: Option<ArchiveInfo>,
    pub archive_error: Option<String>,
    pub publication: Option<PublishOutcome>,
    pub combine: Option<CombineOutcome>,
    pub sweep_errors: Vec<String>,
}

impl PipelineReport {
    pub fn new(
        run_id: &str,
        case: &ValidationCase,
        selector: &ConfigurationSelector,
        author: &Author,
        bundle: &str,
        branch: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            started_at: now,
            finished_at: now,
            case: case.clone(),
            selector: selector.label().to_string(),
            author: author.to_string(),
            bundle: bundle.to_string(),
            branch: branch.to_string(),
            sources: SourceProvenance::default(),
            configurations: Vec::new(),
            archive: None,
            archive_error: None,
            publication: None,
            combine: None,
            sweep_errors: Vec::new(),
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.configurations.iter().filter(|c| c.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.configurations.len() - self.succeeded_count()
    }

    /// A run succeeds when at least one configuration's run succeeded.
    pub fn success(&self) -> bool {
        self.succeeded_count() > 0
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    pub fn cleanup_errors(&self) -> usize {
        self.sweep_errors.len()
            + self
                .configurations
                .iter()
                .map(|c| c.cleanup_errors.len())
                .sum::<usize>()
    }

    /// Write pretty JSON atomically.
    pub fn write_json(&self, path: &Path) -> PipelineResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(vandv_core::VandvError::from)?;
        write_atomic(path, content.as_bytes())
    }

    pub fn read_json(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content).map_err(vandv_core::VandvError::from)?)
    }

    /// Render a markdown summary for terminal output.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# V&V run {}\n\n", self.bundle));
        out.push_str(&format!(
            "- case: {}\n- selector: {}\n- author: {}\n- run id: {}\n- duration: {} ms\n",
            self.case,
            self.selector,
            self.author,
            self.run_id,
            self.duration_ms()
        ));
        if let Some(sha) = &self.sources.primary_sha {
            out.push_str(&format!("- primary: `{sha}`\n"));
        }
        if let Some(sha) = &self.sources.secondary_sha {
            out.push_str(&format!("- secondary: `{sha}`\n"));
        }

        out.push_str("\n## Configurations\n");
        for c in &self.configurations {
            let status = if c.succeeded() { "ok" } else { "FAILED" };
            out.push_str(&format!(
                "- {} [{}] meshes: {} staged, {} skipped; {} files collected",
                c.configuration,
                status,
                c.staged_meshes.len(),
                c.skipped_meshes.len(),
                c.collected_files
            ));
            if c.plots.is_some() {
                out.push_str("; plots");
            }
            out.push('\n');
            if let Some(reason) = c.failure_reason() {
                out.push_str(&format!("  - error: {reason}\n"));
            }
            for w in c.warnings.iter().chain(&c.cleanup_errors) {
                out.push_str(&format!("  - warning: {w}\n"));
            }
            if let Some(e) = &c.plot_error {
                out.push_str(&format!("  - plots: {e}\n"));
            }
            if let Some(e) = &c.collect_error {
                out.push_str(&format!("  - collect: {e}\n"));
            }
        }

        out.push_str("\n## Artifacts\n");
        match (&self.archive, &self.archive_error) {
            (Some(a), _) => out.push_str(&format!(
                "- archive: `{}` (sha256 {})\n",
                a.path.display(),
                a.sha256
            )),
            (None, Some(e)) => out.push_str(&format!("- archive: FAILED ({e})\n")),
            (None, None) => out.push_str("- archive: none\n"),
        }
        match &self.publication {
            Some(p) if p.failed() => out.push_str(&format!(
                "- publish: FAILED on {} ({})\n",
                p.branch,
                p.error.as_deref().unwrap_or_default()
            )),
            Some(p) => out.push_str(&format!(
                "- publish: {} configuration(s) to {} (committed: {}, pushed: {})\n",
                p.published.len(),
                p.branch,
                p.committed,
                p.pushed
            )),
            None => out.push_str("- publish: skipped\n"),
        }
        match &self.combine {
            Some(CombineOutcome::Combined { siblings, .. }) => {
                out.push_str(&format!("- combined plots: {siblings} configurations\n"))
            }
            Some(CombineOutcome::Failed { reason }) => {
                out.push_str(&format!("- combined plots: FAILED ({reason})\n"))
            }
            Some(CombineOutcome::Skipped { .. }) | None => {
                out.push_str("- combined plots: skipped\n")
            }
        }

        out.push_str(&format!(
            "\n**{}**: {} succeeded, {} failed\n",
            if self.success() { "PASS" } else { "FAIL" },
            self.succeeded_count(),
            self.failed_count()
        ));
        out
    }
}
