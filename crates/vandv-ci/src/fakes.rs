//! In-process fakes for the external collaborators (testing only)
//!
//! Provides `ScriptedToolchain`, `FakePlotter` and `FsVersionControl`, which
//! satisfy the collaborator traits against the local filesystem without a
//! solver, Python or a git remote.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use vandv_core::{VandvError, VersionControl, PLOTS_DIR};
use walkdir::WalkDir;

use crate::error::{PipelineError, PipelineResult};
use crate::plotting::Plotter;
use crate::runner::{ToolOutput, Toolchain};

// ---------------------------------------------------------------------------
// ScriptedToolchain
// ---------------------------------------------------------------------------

/// A solver invocation observed by [`ScriptedToolchain`].
#[derive(Debug, Clone)]
pub struct ToolchainCall {
    pub configuration: String,
    pub mesh: String,
    /// Entries of the mesh directory when the solver started.
    pub inputs: BTreeSet<String>,
}

/// Toolchain that writes `history.csv` and `flow.vtu` into the mesh
/// directory and exits with 1 for configurations marked as failing.
#[derive(Debug, Default)]
pub struct ScriptedToolchain {
    failing: BTreeSet<String>,
    clobbering: BTreeSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ToolchainCall>>,
}

impl ScriptedToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with 1 for every mesh of `configuration`.
    pub fn failing(mut self, configuration: &str) -> Self {
        self.failing.insert(configuration.to_string());
        self
    }

    /// Replace each mesh directory of `configuration` with a plain file
    /// after solving, leaving nothing teardown can list.
    pub fn clobbering(mut self, configuration: &str) -> Self {
        self.clobbering.insert(configuration.to_string());
        self
    }

    /// Sleep before producing output.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ToolchainCall> {
        self.calls.lock().unwrap().clone()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl Toolchain for ScriptedToolchain {
    async fn run(&self, config_file: &Path, working_dir: &Path) -> PipelineResult<ToolOutput> {
        let configuration = working_dir.parent().map(file_name).unwrap_or_default();
        let mesh = file_name(working_dir);
        let inputs = fs::read_dir(working_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        self.calls.lock().unwrap().push(ToolchainCall {
            configuration: configuration.clone(),
            mesh: mesh.clone(),
            inputs,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !config_file.is_file() {
            return Ok(ToolOutput {
                exit_code: 2,
                stdout: String::new(),
                stderr: format!("missing {}", config_file.display()),
                duration_ms: 0,
            });
        }

        fs::write(working_dir.join("history.csv"), "iter,rms\n1,-3.2\n")?;
        fs::write(working_dir.join("flow.vtu"), "<VTKFile/>")?;
        if self.clobbering.contains(&configuration) {
            fs::remove_dir_all(working_dir)?;
            fs::write(working_dir, "clobbered")?;
        }
        let exit_code = i32::from(self.failing.contains(&configuration));
        Ok(ToolOutput {
            exit_code,
            stdout: format!("solved {configuration}/{mesh}\n"),
            stderr: String::new(),
            duration_ms: 1,
        })
    }
}

// ---------------------------------------------------------------------------
// FakePlotter
// ---------------------------------------------------------------------------

/// Plotter that writes `plots/convergence.png` and `combined.png`.
#[derive(Debug, Default)]
pub struct FakePlotter {
    fail_plots: bool,
    fail_combined: bool,
    plot_calls: AtomicUsize,
    combined_calls: AtomicUsize,
}

impl FakePlotter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_plots(mut self) -> Self {
        self.fail_plots = true;
        self
    }

    pub fn failing_combined(mut self) -> Self {
        self.fail_combined = true;
        self
    }

    pub fn plot_calls(&self) -> usize {
        self.plot_calls.load(Ordering::SeqCst)
    }

    pub fn combined_calls(&self) -> usize {
        self.combined_calls.load(Ordering::SeqCst)
    }
}

fn plot_failure(what: &str) -> PipelineError {
    PipelineError::Tool {
        program: "python3".to_string(),
        reason: format!("{what} failed"),
    }
}

#[async_trait]
impl Plotter for FakePlotter {
    async fn generate_plots(&self, configuration_dir: &Path) -> PipelineResult<Option<PathBuf>> {
        self.plot_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_plots {
            return Err(plot_failure("Plot.py"));
        }
        let plots = configuration_dir.join(PLOTS_DIR);
        fs::create_dir_all(&plots)?;
        fs::write(plots.join("convergence.png"), file_name(configuration_dir))?;
        Ok(Some(plots))
    }

    async fn generate_combined_plots(
        &self,
        case_code: &str,
        _input_dir: &Path,
        output_dir: &Path,
    ) -> PipelineResult<()> {
        self.combined_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_combined {
            return Err(plot_failure("generate_combined_plots.py"));
        }
        fs::create_dir_all(output_dir)?;
        fs::write(output_dir.join("combined.png"), case_code)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FsVersionControl
// ---------------------------------------------------------------------------

/// Version control over a plain directory.
///
/// "Commits" record a digest of the work tree; a commit happens only when
/// the digest differs from the previous one for that tree.
#[derive(Debug, Default)]
pub struct FsVersionControl {
    fail_checkout: bool,
    fail_push: bool,
    heads: Mutex<HashMap<PathBuf, String>>,
    branches: Mutex<Vec<String>>,
    commits: Mutex<Vec<String>>,
    pushes: Mutex<Vec<String>>,
}

impl FsVersionControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_checkout(mut self) -> Self {
        self.fail_checkout = true;
        self
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub fn branches(&self) -> Vec<String> {
        self.branches.lock().unwrap().clone()
    }

    /// Commit messages, oldest first.
    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }
}

/// SHA-256 over the sorted relative paths and contents of every file.
pub fn tree_digest(root: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0]);
        hasher.update(fs::read(entry.path())?);
        hasher.update([0]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[async_trait]
impl VersionControl for FsVersionControl {
    async fn checkout(
        &self,
        source: &str,
        _reference: Option<&str>,
        work_tree: &Path,
    ) -> vandv_core::Result<()> {
        if self.fail_checkout {
            return Err(VandvError::GitError(format!("cannot clone {source}")));
        }
        fs::create_dir_all(work_tree)?;
        Ok(())
    }

    async fn create_or_switch_branch(&self, _work_tree: &Path, branch: &str) -> vandv_core::Result<()> {
        self.branches.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn commit_if_changed(&self, work_tree: &Path, message: &str) -> vandv_core::Result<bool> {
        let digest = tree_digest(work_tree)?;
        let mut heads = self.heads.lock().unwrap();
        if heads.get(work_tree) == Some(&digest) {
            return Ok(false);
        }
        heads.insert(work_tree.to_path_buf(), digest);
        self.commits.lock().unwrap().push(message.to_string());
        Ok(true)
    }

    async fn push(&self, _work_tree: &Path, branch: &str) -> vandv_core::Result<()> {
        if self.fail_push {
            return Err(VandvError::GitError(format!("push of {branch} rejected")));
        }
        self.pushes.lock().unwrap().push(branch.to_string());
        Ok(())
    }
}
