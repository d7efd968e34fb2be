//! Deterministic path and name resolution.
//!
//! Layout under both source repositories:
//! `{root}/{category}/{case_code}/{model}/{configuration}/{mesh}/`.
//!
//! Layout under the local workspace:
//! - `results/{bundle}/{configuration}/...` — collected results tree
//! - `{bundle}.tar.gz` — the compressed artifact bundle
//! - `{bundle}.summary.json` — the run report
//!
//! Layout under the results-hosting repository:
//! `vandv_files/{case_code}/{case_code}_{model}_{configuration}/`.

use std::path::{Path, PathBuf};

use crate::case::{Author, ConfigurationSelector, ValidationCase};

/// Top-level directory of published plots in the results repository.
pub const PUBLICATION_ROOT: &str = "vandv_files";

/// Name of the plot output directory written by plot scripts.
pub const PLOTS_DIR: &str = "plots";

/// Directory receiving combined plots inside a case's publication directory.
pub const COMBINED_PLOTS_DIR: &str = "combined_plots";

/// Which source repository a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repository {
    /// The solver repository whose case directories receive staged files.
    Primary,
    /// The V&V data repository holding mesh and restart files.
    Secondary,
}

/// Computes filesystem paths for a case across both repositories and the
/// local workspace.
#[derive(Debug, Clone)]
pub struct PathResolver {
    primary_root: PathBuf,
    secondary_root: PathBuf,
    workspace: PathBuf,
}

impl PathResolver {
    pub fn new(
        primary_root: impl Into<PathBuf>,
        secondary_root: impl Into<PathBuf>,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            primary_root: primary_root.into(),
            secondary_root: secondary_root.into(),
            workspace: workspace.into(),
        }
    }

    pub fn root(&self, repo: Repository) -> &Path {
        match repo {
            Repository::Primary => &self.primary_root,
            Repository::Secondary => &self.secondary_root,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// `{root}/{category}/{case_code}/{model}`
    pub fn case_root(&self, repo: Repository, case: &ValidationCase) -> PathBuf {
        self.root(repo)
            .join(case.category.as_str())
            .join(&case.case_code)
            .join(case.model.as_str())
    }

    pub fn configuration_dir(
        &self,
        repo: Repository,
        case: &ValidationCase,
        configuration: &str,
    ) -> PathBuf {
        self.case_root(repo, case).join(configuration)
    }

    pub fn mesh_dir(
        &self,
        repo: Repository,
        case: &ValidationCase,
        configuration: &str,
        mesh: &str,
    ) -> PathBuf {
        self.configuration_dir(repo, case, configuration).join(mesh)
    }

    /// Secondary-repository counterpart of a MeshCase, if it exists and holds
    /// at least one file.
    pub fn secondary_mesh_dir(
        &self,
        case: &ValidationCase,
        configuration: &str,
        mesh: &str,
    ) -> Option<PathBuf> {
        let dir = self.mesh_dir(Repository::Secondary, case, configuration, mesh);
        let has_file = std::fs::read_dir(&dir)
            .ok()?
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false));
        has_file.then_some(dir)
    }

    pub fn results_root(&self) -> PathBuf {
        self.workspace.join("results")
    }

    pub fn bundle_dir(&self, bundle: &str) -> PathBuf {
        self.results_root().join(bundle)
    }

    pub fn archive_path(&self, bundle: &str) -> PathBuf {
        self.workspace.join(format!("{bundle}.tar.gz"))
    }

    pub fn summary_path(&self, bundle: &str) -> PathBuf {
        self.workspace.join(format!("{bundle}.summary.json"))
    }
}

/// `{category}_{case_code}_{model}_{configuration-or-All}_{author}`
pub fn bundle_name(
    case: &ValidationCase,
    selector: &ConfigurationSelector,
    author: &Author,
) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        case.category,
        case.case_code,
        case.model,
        selector.label(),
        author
    )
}

/// `{case_code}_{author}`
pub fn branch_name(case: &ValidationCase, author: &Author) -> String {
    format!("{}_{}", case.case_code, author)
}

/// `vandv_files/{case_code}`, relative to the results repository root.
pub fn publication_case_dir(case: &ValidationCase) -> PathBuf {
    Path::new(PUBLICATION_ROOT).join(&case.case_code)
}

/// `vandv_files/{case_code}/{case_code}_{model}_{configuration}`, relative to
/// the results repository root.
pub fn publication_dir(case: &ValidationCase, configuration: &str) -> PathBuf {
    publication_case_dir(case).join(format!(
        "{}_{}_{}",
        case.case_code, case.model, configuration
    ))
}

/// The `plots/` subdirectory of `dir`, if present.
pub fn plots_dir(dir: &Path) -> Option<PathBuf> {
    let plots = dir.join(PLOTS_DIR);
    plots.is_dir().then_some(plots)
}
