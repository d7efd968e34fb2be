//! Solver execution.
//!
//! The [`Toolchain`] collaborator runs the solver once for a staged mesh
//! case. [`RunDriver`] drives every staged mesh of one configuration as a
//! single call bounded by the configuration timeout, writing a log per mesh.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{error, info, warn};
use vandv_core::ToolCommand;

use crate::error::{PipelineError, PipelineResult};
use crate::stage::StagedConfiguration;

/// Captured result of one external process.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ToolOutput {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `argv` in `cwd` and capture its output.
///
/// The child is killed if the returned future is dropped, which is how
/// callers enforce timeouts.
pub async fn run_tool(argv: &[String], cwd: &Path) -> PipelineResult<ToolOutput> {
    let Some((program, args)) = argv.split_first() else {
        return Err(PipelineError::Tool {
            program: String::new(),
            reason: "empty command".to_string(),
        });
    };

    let start = Instant::now();
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::Tool {
            program: program.clone(),
            reason: format!("failed to start in {}: {e}", cwd.display()),
        })?;

    let output = child.wait_with_output().await?;
    Ok(ToolOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Like [`run_tool`], bounded by `timeout_secs` (0 = unbounded).
pub async fn run_tool_with_timeout(
    argv: &[String],
    cwd: &Path,
    timeout_secs: u64,
) -> PipelineResult<ToolOutput> {
    if timeout_secs == 0 {
        return run_tool(argv, cwd).await;
    }
    tokio::time::timeout(Duration::from_secs(timeout_secs), run_tool(argv, cwd))
        .await
        .map_err(|_| PipelineError::Tool {
            program: argv.first().cloned().unwrap_or_default(),
            reason: format!("timed out after {timeout_secs} seconds"),
        })?
}

/// The external solver.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Run the solver on `config_file` inside `working_dir`.
    async fn run(&self, config_file: &Path, working_dir: &Path) -> PipelineResult<ToolOutput>;
}

/// [`Toolchain`] that spawns the configured command with the config file
/// name appended.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    command: ToolCommand,
}

impl CommandToolchain {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    async fn run(&self, config_file: &Path, working_dir: &Path) -> PipelineResult<ToolOutput> {
        let mut argv = self.command.argv();
        let file = config_file
            .strip_prefix(working_dir)
            .unwrap_or(config_file)
            .to_string_lossy()
            .into_owned();
        argv.push(file);
        run_tool(&argv, working_dir).await
    }
}

/// Outcome of a configuration's run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed { reason: String },
}

impl RunStatus {
    pub fn succeeded(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }
}

/// One mesh invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshRun {
    pub mesh: String,
    /// `None` when the solver could not be started.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub log: Option<PathBuf>,
}

/// Result of driving one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRun {
    pub configuration: String,
    #[serde(flatten)]
    pub status: RunStatus,
    pub meshes: Vec<MeshRun>,
    pub duration_ms: u64,
}

impl ConfigurationRun {
    /// The `RunFailed` condition for this run, if it failed.
    pub fn failure(&self) -> Option<PipelineError> {
        match &self.status {
            RunStatus::Succeeded => None,
            RunStatus::Failed { reason } => Some(PipelineError::RunFailed {
                configuration: self.configuration.clone(),
                reason: reason.clone(),
            }),
        }
    }
}

/// Runs a staged configuration through the [`Toolchain`].
pub struct RunDriver<'a> {
    toolchain: &'a dyn Toolchain,
    timeout: Option<Duration>,
}

impl<'a> RunDriver<'a> {
    /// `timeout_secs` bounds the whole configuration; 0 disables it.
    pub fn new(toolchain: &'a dyn Toolchain, timeout_secs: u64) -> Self {
        Self {
            toolchain,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }

    /// Invoke the solver for every staged mesh, in order.
    ///
    /// Every mesh is attempted even after one fails; the configuration
    /// succeeds only if all of them exit with 0. Logs go to
    /// `{logs_dir}/{mesh}.log`.
    pub async fn run(&self, staged: &StagedConfiguration, logs_dir: &Path) -> ConfigurationRun {
        let configuration = staged.configuration().to_string();
        let start = Instant::now();

        if staged.staged().is_empty() {
            warn!(%configuration, "No staged mesh cases; solver not invoked");
            return ConfigurationRun {
                configuration,
                status: RunStatus::Failed {
                    reason: "no staged mesh cases".to_string(),
                },
                meshes: Vec::new(),
                duration_ms: 0,
            };
        }

        let mut meshes = Vec::new();
        let work = self.run_meshes(staged, logs_dir, &mut meshes);
        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(status) => status,
                Err(_) => {
                    error!(%configuration, timeout_secs = limit.as_secs(), "Run timed out");
                    RunStatus::Failed {
                        reason: format!("timed out after {} seconds", limit.as_secs()),
                    }
                }
            },
            None => work.await,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &status {
            RunStatus::Succeeded => info!(%configuration, duration_ms, "Run succeeded"),
            RunStatus::Failed { reason } => {
                error!(%configuration, duration_ms, %reason, "Run failed")
            }
        }
        ConfigurationRun {
            configuration,
            status,
            meshes,
            duration_ms,
        }
    }

    async fn run_meshes(
        &self,
        staged: &StagedConfiguration,
        logs_dir: &Path,
        meshes: &mut Vec<MeshRun>,
    ) -> RunStatus {
        let mut failed = Vec::new();
        for mesh in staged.staged() {
            info!(configuration = staged.configuration(), mesh = %mesh.name, "Running solver");
            let log_path = logs_dir.join(format!("{}.log", mesh.name));
            match self.toolchain.run(&mesh.config_file, &mesh.dir).await {
                Ok(output) => {
                    let log = write_log(&log_path, &output).await;
                    if !output.passed() {
                        failed.push(format!("{} exited with code {}", mesh.name, output.exit_code));
                    }
                    meshes.push(MeshRun {
                        mesh: mesh.name.clone(),
                        exit_code: Some(output.exit_code),
                        duration_ms: output.duration_ms,
                        log,
                    });
                }
                Err(e) => {
                    failed.push(format!("{}: {e}", mesh.name));
                    meshes.push(MeshRun {
                        mesh: mesh.name.clone(),
                        exit_code: None,
                        duration_ms: 0,
                        log: None,
                    });
                }
            }
        }

        if failed.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed {
                reason: failed.join("; "),
            }
        }
    }
}

async fn write_log(path: &Path, output: &ToolOutput) -> Option<PathBuf> {
    let content = format!(
        "exit code: {}\nduration: {} ms\n\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
        output.exit_code, output.duration_ms, output.stdout, output.stderr
    );
    let written = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await
    };
    match written.await {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to write run log");
            None
        }
    }
}
