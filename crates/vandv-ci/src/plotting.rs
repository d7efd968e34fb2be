//! Plot-script collaborators.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};
use vandv_core::{plots_dir, ToolCommand};

use crate::error::{PipelineError, PipelineResult};
use crate::runner::run_tool_with_timeout;

/// External plot generation.
#[async_trait]
pub trait Plotter: Send + Sync {
    /// Generate plots for a configuration. Returns the `plots/` directory the
    /// script produced, or `None` when it produced none.
    async fn generate_plots(&self, configuration_dir: &Path) -> PipelineResult<Option<PathBuf>>;

    /// Generate combined plots across every configuration under `input_dir`
    /// into `output_dir`.
    async fn generate_combined_plots(
        &self,
        case_code: &str,
        input_dir: &Path,
        output_dir: &Path,
    ) -> PipelineResult<()>;
}

/// [`Plotter`] that runs the configured Python scripts.
///
/// The per-configuration script runs inside the configuration directory.
/// The combined script is called as
/// `{argv...} --case-code CODE --input-dir IN --output-dir OUT`.
#[derive(Debug, Clone)]
pub struct ScriptPlotter {
    plot: ToolCommand,
    combined: ToolCommand,
}

impl ScriptPlotter {
    pub fn new(plot: ToolCommand, combined: ToolCommand) -> Self {
        Self { plot, combined }
    }
}

fn check(program: &str, output: &crate::runner::ToolOutput) -> PipelineResult<()> {
    if output.passed() {
        return Ok(());
    }
    Err(PipelineError::Tool {
        program: program.to_string(),
        reason: format!(
            "exited with code {}: {}",
            output.exit_code,
            output.stderr.trim()
        ),
    })
}

#[async_trait]
impl Plotter for ScriptPlotter {
    async fn generate_plots(&self, configuration_dir: &Path) -> PipelineResult<Option<PathBuf>> {
        let output = run_tool_with_timeout(
            &self.plot.argv(),
            configuration_dir,
            self.plot.timeout_secs,
        )
        .await?;
        check(&self.plot.program, &output)?;

        let plots = plots_dir(configuration_dir);
        match &plots {
            Some(dir) => info!(plots = %dir.display(), "Plots generated"),
            None => warn!(dir = %configuration_dir.display(), "Plot script produced no plots directory"),
        }
        Ok(plots)
    }

    async fn generate_combined_plots(
        &self,
        case_code: &str,
        input_dir: &Path,
        output_dir: &Path,
    ) -> PipelineResult<()> {
        tokio::fs::create_dir_all(output_dir).await?;
        let mut argv = self.combined.argv();
        argv.extend([
            "--case-code".to_string(),
            case_code.to_string(),
            "--input-dir".to_string(),
            input_dir.to_string_lossy().into_owned(),
            "--output-dir".to_string(),
            output_dir.to_string_lossy().into_owned(),
        ]);
        let output = run_tool_with_timeout(&argv, input_dir, self.combined.timeout_secs).await?;
        check(&self.combined.program, &output)?;
        info!(case_code, output = %output_dir.display(), "Combined plots generated");
        Ok(())
    }
}
