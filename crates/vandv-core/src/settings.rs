//! Pipeline settings.
//!
//! Settings are layered: built-in defaults, then an optional JSON file, then
//! `VANDV_*` environment variables. The CLI applies its own flags last.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VandvError};

/// An external program invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable name or path.
    pub program: String,

    /// Arguments placed before any per-call arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout in seconds; 0 disables the timeout.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl ToolCommand {
    pub fn new(program: &str, args: &[&str], timeout_secs: u64) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_secs,
        }
    }

    /// Program and arguments as a single vector.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Commit identity used for results-repository commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: "V&V Pipeline".to_string(),
            email: "vandv-pipeline@users.noreply.github.com".to_string(),
        }
    }
}

/// The results-hosting repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultsRepo {
    /// Clone URL or local path of the repository.
    pub source: String,

    /// Ref checked out before the publication branch is created.
    #[serde(default)]
    pub base_ref: Option<String>,

    /// Local work tree; defaults to `{workspace}/results-repo`.
    #[serde(default)]
    pub checkout_dir: Option<PathBuf>,

    /// Push after committing.
    #[serde(default = "default_true")]
    pub push: bool,

    #[serde(default)]
    pub identity: CommitIdentity,
}

/// Complete pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineSettings {
    /// `ValidationCases` directory of the solver repository.
    pub primary_root: PathBuf,

    /// `ValidationCases` directory of the V&V data repository.
    pub secondary_root: PathBuf,

    /// Local directory for results trees, archives and reports.
    pub workspace: PathBuf,

    /// Results-hosting repository; publishing is skipped when `None`.
    pub results_repo: Option<ResultsRepo>,

    /// Whether to publish plots at all.
    pub publish: bool,

    /// Solver invocation; its timeout applies per configuration.
    pub toolchain: ToolCommand,

    /// Per-configuration plot script, run inside the configuration directory.
    pub plot: ToolCommand,

    /// Combined plot script.
    pub combined_plot: ToolCommand,

    /// Shared configuration file copied into every mesh directory.
    pub shared_config_file: String,

    /// Regex matched against configuration directory names.
    pub configuration_pattern: String,

    /// File extensions (without dot) collected into the results bundle.
    pub result_extensions: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            primary_root: PathBuf::from("ValidationCases"),
            secondary_root: PathBuf::from("su2-vandv/ValidationCases"),
            workspace: PathBuf::from("vandv-workspace"),
            results_repo: None,
            publish: true,
            toolchain: ToolCommand::new("SU2_CFD", &[], 3600),
            plot: ToolCommand::new("python3", &["Plot.py"], 600),
            combined_plot: ToolCommand::new("python3", &["generate_combined_plots.py"], 600),
            shared_config_file: "Config.cfg".to_string(),
            configuration_pattern: r"^Configuration\d+$".to_string(),
            result_extensions: ["csv", "dat", "vtu", "vtk", "su2", "cfg", "png", "jpg"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl PipelineSettings {
    /// Defaults, overlaid with `path` when given, overlaid with the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VandvError::Settings(format!("failed to read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `VANDV_*` overrides read through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("VANDV_PRIMARY_ROOT") {
            self.primary_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("VANDV_SECONDARY_ROOT") {
            self.secondary_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("VANDV_WORKSPACE") {
            self.workspace = PathBuf::from(v);
        }
        if let Some(v) = lookup("VANDV_RESULTS_REPO") {
            self.set_results_source(v);
        }
        if let Some(v) = lookup("VANDV_TOOLCHAIN") {
            self.toolchain.program = v;
        }
        if let Some(v) = lookup("VANDV_TIMEOUT_SECS") {
            self.toolchain.timeout_secs = v.parse().map_err(|_| {
                VandvError::Settings(format!("VANDV_TIMEOUT_SECS is not a number: {v:?}"))
            })?;
        }
        Ok(self)
    }

    /// Point publishing at `source`, keeping any other repository settings.
    pub fn set_results_source(&mut self, source: String) {
        match self.results_repo.as_mut() {
            Some(repo) => repo.source = source,
            None => {
                self.results_repo = Some(ResultsRepo {
                    source,
                    base_ref: None,
                    checkout_dir: None,
                    push: true,
                    identity: CommitIdentity::default(),
                })
            }
        }
    }

    /// Work tree of the results repository.
    pub fn results_checkout_dir(&self) -> PathBuf {
        self.results_repo
            .as_ref()
            .and_then(|r| r.checkout_dir.clone())
            .unwrap_or_else(|| self.workspace.join("results-repo"))
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        regex::Regex::new(&self.configuration_pattern)?;
        if self.toolchain.program.trim().is_empty() {
            return Err(VandvError::Settings("toolchain program is empty".to_string()));
        }
        if self.shared_config_file.trim().is_empty()
            || self.shared_config_file.contains(['/', '\\'])
        {
            return Err(VandvError::Settings(format!(
                "shared config file must be a plain file name, got {:?}",
                self.shared_config_file
            )));
        }
        if self.publish && self.results_repo.is_none() {
            return Err(VandvError::Settings(
                "publishing is enabled but no results repository is configured".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
