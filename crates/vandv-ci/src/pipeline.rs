//! Validation pipeline orchestration.
//!
//! One run: expand the selector, then for each configuration in order
//! stage → run → plot → collect → unstage, then archive, publish, combine,
//! sweep and write the report. Configurations never overlap; a failure in one
//! is recorded and the loop moves on.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;
use vandv_core::telemetry::{
    emit_configuration_finished, emit_pipeline_finished, emit_pipeline_started,
};
use vandv_core::{
    branch_name, bundle_name, capture_head_sha, plots_dir, Author, ConfigOverrides,
    ConfigurationSelector, ConfigurationSet, GitCli, PathResolver, PipelineSettings,
    PipelineSpan, Repository, ValidationCase, VersionControl,
};

use crate::collector::ArtifactCollector;
use crate::combiner::Combiner;
use crate::error::PipelineResult;
use crate::expander::ConfigurationExpander;
use crate::fs_ops::{copy_dir_all, remove_path};
use crate::plotting::{Plotter, ScriptPlotter};
use crate::publisher::Publisher;
use crate::report::{ConfigurationReport, PipelineReport, SourceProvenance};
use crate::runner::{CommandToolchain, RunDriver, Toolchain};
use crate::stage::StageManager;

/// External collaborators of a run.
#[derive(Clone)]
pub struct Collaborators {
    pub toolchain: Arc<dyn Toolchain>,
    pub plotter: Arc<dyn Plotter>,
    pub vcs: Arc<dyn VersionControl>,
}

impl Collaborators {
    /// Real implementations driven by `settings`.
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        let identity = settings
            .results_repo
            .as_ref()
            .map(|r| r.identity.clone())
            .unwrap_or_default();
        Self {
            toolchain: Arc::new(CommandToolchain::new(settings.toolchain.clone())),
            plotter: Arc::new(ScriptPlotter::new(
                settings.plot.clone(),
                settings.combined_plot.clone(),
            )),
            vcs: Arc::new(GitCli::new(identity)),
        }
    }
}

/// What to run.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub case: ValidationCase,
    pub selector: ConfigurationSelector,
    pub author: Author,
    pub overrides: ConfigOverrides,
}

/// The orchestrator.
pub struct ValidationPipeline {
    settings: PipelineSettings,
    resolver: PathResolver,
    expander: ConfigurationExpander,
    collector: ArtifactCollector,
    collaborators: Collaborators,
}

impl ValidationPipeline {
    pub fn new(settings: PipelineSettings, collaborators: Collaborators) -> PipelineResult<Self> {
        settings.validate()?;
        let resolver = PathResolver::new(
            &settings.primary_root,
            &settings.secondary_root,
            &settings.workspace,
        );
        let expander = ConfigurationExpander::new(&settings.configuration_pattern)?;
        let collector = ArtifactCollector::new(&settings.result_extensions);
        Ok(Self {
            settings,
            resolver,
            expander,
            collector,
            collaborators,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Concrete configurations for `selector` in the primary repository.
    pub fn expand(
        &self,
        case: &ValidationCase,
        selector: &ConfigurationSelector,
    ) -> PipelineResult<ConfigurationSet> {
        self.expander
            .expand(selector, &self.resolver.case_root(Repository::Primary, case))
    }

    /// Execute a full run and write `{workspace}/{bundle}.summary.json`.
    ///
    /// Errors are returned only for conditions that abort the run before the
    /// configuration loop (no configurations, results checkout failure) or
    /// when the report cannot be written. Everything else is in the report.
    pub async fn run(&self, request: &PipelineRequest) -> PipelineResult<PipelineReport> {
        let run_id = Uuid::new_v4().to_string();
        let bundle = bundle_name(&request.case, &request.selector, &request.author);
        let span = PipelineSpan::new(&run_id, &bundle);
        self.run_inner(request, &run_id, &bundle)
            .instrument(span.span())
            .await
    }

    async fn run_inner(
        &self,
        request: &PipelineRequest,
        run_id: &str,
        bundle: &str,
    ) -> PipelineResult<PipelineReport> {
        let started = Instant::now();
        let case = &request.case;
        let configurations = self.expand(case, &request.selector)?;
        emit_pipeline_started(run_id, &case.to_string(), configurations.len());

        let branch = branch_name(case, &request.author);
        let mut report =
            PipelineReport::new(run_id, case, &request.selector, &request.author, bundle, &branch);
        report.sources = self.provenance();

        let publisher = match (&self.settings.results_repo, self.settings.publish) {
            (Some(repo), true) => {
                let publisher = Publisher::new(
                    self.collaborators.vcs.as_ref(),
                    self.settings.results_checkout_dir(),
                    case,
                    &request.author,
                    repo.push,
                );
                publisher
                    .prepare(&repo.source, repo.base_ref.as_deref())
                    .await?;
                Some(publisher)
            }
            _ => {
                info!("Publishing disabled");
                None
            }
        };

        let stage_manager = StageManager::new(
            &self.resolver,
            &self.settings.shared_config_file,
            &request.overrides,
        );
        report.sweep_errors.extend(self.sweep(&stage_manager, case, &configurations));

        let bundle_dir = self.resolver.bundle_dir(bundle);
        remove_path(&bundle_dir)?;
        std::fs::create_dir_all(&bundle_dir)?;

        let driver = RunDriver::new(
            self.collaborators.toolchain.as_ref(),
            self.settings.toolchain.timeout_secs,
        );
        for configuration in configurations.iter() {
            let result = self
                .process_configuration(&stage_manager, &driver, case, configuration, &bundle_dir)
                .await;
            report.configurations.push(result);
        }

        match self
            .collector
            .archive(&bundle_dir, &self.resolver.archive_path(bundle))
        {
            Ok(archive) => report.archive = Some(archive),
            Err(e) => {
                error!(error = %e, "Archiving failed");
                report.archive_error = Some(e.to_string());
            }
        }

        if let Some(publisher) = &publisher {
            let targets: Vec<(String, PathBuf)> = report
                .configurations
                .iter()
                .filter_map(|c| c.plots.clone().map(|p| (c.configuration.clone(), p)))
                .collect();
            let outcome = publisher.publish(&targets).await;
            let published = !outcome.failed();
            report.publication = Some(outcome);

            if published {
                let combiner = Combiner::new(self.collaborators.plotter.as_ref(), publisher);
                report.combine = Some(combiner.combine().await);
            }
        }

        report.sweep_errors.extend(self.sweep(&stage_manager, case, &configurations));

        report.finished_at = Utc::now();
        report.write_json(&self.resolver.summary_path(bundle))?;
        emit_pipeline_finished(
            run_id,
            report.succeeded_count(),
            report.failed_count(),
            started.elapsed().as_millis() as u64,
        );
        Ok(report)
    }

    async fn process_configuration(
        &self,
        stage_manager: &StageManager<'_>,
        driver: &RunDriver<'_>,
        case: &ValidationCase,
        configuration: &str,
        bundle_dir: &Path,
    ) -> ConfigurationReport {
        let started = Instant::now();
        let mut result = ConfigurationReport::new(configuration);
        let dest = bundle_dir.join(configuration);

        let staged = match stage_manager.stage(case, configuration) {
            Ok(staged) => staged,
            Err(e) => {
                error!(%configuration, error = %e, "Staging failed");
                result.stage_error = Some(e.to_string());
                emit_configuration_finished(
                    configuration,
                    false,
                    false,
                    started.elapsed().as_millis() as u64,
                );
                return result;
            }
        };
        result.staged_meshes = staged.staged().iter().map(|m| m.name.clone()).collect();
        result.skipped_meshes = staged.skipped();
        result.warnings = staged.warnings().iter().map(|w| w.to_string()).collect();

        let run = driver.run(&staged, &dest.join("logs")).await;

        let mut plots = None;
        if run.status.succeeded() {
            match self
                .collaborators
                .plotter
                .generate_plots(staged.config_dir())
                .await
            {
                Ok(Some(dir)) => plots = Some(dir),
                Ok(None) => {
                    result.plot_error = Some("plot script produced no plots directory".to_string())
                }
                Err(e) => {
                    warn!(%configuration, error = %e, "Plot generation failed");
                    result.plot_error = Some(e.to_string());
                }
            }
        }

        match self.collector.collect(staged.config_dir(), &dest) {
            Ok(files) => result.collected_files = files,
            Err(e) => {
                error!(%configuration, error = %e, "Collecting results failed");
                result.collect_error = Some(e.to_string());
            }
        }
        if let Some(dir) = plots {
            // The whole plots directory is kept regardless of extension.
            let target = dest.join(vandv_core::PLOTS_DIR);
            match copy_dir_all(&dir, &target) {
                Ok(_) => result.plots = plots_dir(&dest),
                Err(e) => result.plot_error = Some(e.to_string()),
            }
        }
        let succeeded = run.status.succeeded();
        result.run = Some(run);

        for failure in staged.release() {
            error!(%configuration, error = %failure, "Cleanup failed");
            result.cleanup_errors.push(failure.to_string());
        }

        emit_configuration_finished(
            configuration,
            true,
            succeeded,
            started.elapsed().as_millis() as u64,
        );
        result
    }

    fn sweep(
        &self,
        stage_manager: &StageManager<'_>,
        case: &ValidationCase,
        configurations: &ConfigurationSet,
    ) -> Vec<String> {
        stage_manager
            .sweep(case, configurations)
            .into_iter()
            .map(|e| {
                error!(error = %e, "Sweep could not remove leftover input");
                e.to_string()
            })
            .collect()
    }

    fn provenance(&self) -> SourceProvenance {
        SourceProvenance {
            primary_sha: capture_head_sha(self.resolver.root(Repository::Primary)).ok(),
            secondary_sha: capture_head_sha(self.resolver.root(Repository::Secondary)).ok(),
        }
    }
}
