//! Integration tests for the validation pipeline with filesystem fakes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use vandv_ci::fakes::{FakePlotter, FsVersionControl, ScriptedToolchain};
use vandv_ci::{
    Collaborators, CombineOutcome, PipelineError, PipelineReport, PipelineRequest,
    ValidationPipeline,
};
use vandv_core::{
    Author, ConfigOverrides, ConfigurationSelector, PipelineSettings, ValidationCase,
};
use walkdir::WalkDir;

const CASE_DIR: &str = "Basic/2DML/SA";

struct Harness {
    dir: tempfile::TempDir,
    toolchain: Arc<ScriptedToolchain>,
    plotter: Arc<FakePlotter>,
    vcs: Arc<FsVersionControl>,
    settings: PipelineSettings,
}

impl Harness {
    /// Two configurations with `Mesh1` and `Mesh2`, both backed by secondary
    /// data.
    fn new() -> Self {
        Self::with(ScriptedToolchain::new(), FakePlotter::new(), FsVersionControl::new())
    }

    fn with(toolchain: ScriptedToolchain, plotter: FakePlotter, vcs: FsVersionControl) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = PipelineSettings::default();
        settings.primary_root = dir.path().join("su2/ValidationCases");
        settings.secondary_root = dir.path().join("vandv/ValidationCases");
        settings.workspace = dir.path().join("ws");
        settings.set_results_source("file:///srv/website.git".to_string());
        settings.toolchain.timeout_secs = 30;

        let harness = Self {
            dir,
            toolchain: Arc::new(toolchain),
            plotter: Arc::new(plotter),
            vcs: Arc::new(vcs),
            settings,
        };
        for cfg in ["Configuration1", "Configuration2"] {
            harness.add_configuration(cfg, &["Mesh1", "Mesh2"]);
        }
        harness
    }

    fn primary_case(&self) -> PathBuf {
        self.settings.primary_root.join(CASE_DIR)
    }

    fn secondary_case(&self) -> PathBuf {
        self.settings.secondary_root.join(CASE_DIR)
    }

    fn add_configuration(&self, cfg: &str, meshes: &[&str]) {
        let primary = self.primary_case().join(cfg);
        fs::create_dir_all(&primary).unwrap();
        fs::write(primary.join("Config.cfg"), "SOLVER= RANS\nMACH_NUMBER= 0.2\n").unwrap();
        for mesh in meshes {
            fs::create_dir_all(primary.join(mesh)).unwrap();
            let secondary = self.secondary_case().join(cfg).join(mesh);
            fs::create_dir_all(&secondary).unwrap();
            fs::write(secondary.join("mesh.su2"), format!("{cfg}/{mesh}")).unwrap();
            fs::write(secondary.join("restart_flow.dat"), "restart").unwrap();
        }
    }

    fn work_tree(&self) -> PathBuf {
        self.settings.results_checkout_dir()
    }

    fn pipeline(&self) -> ValidationPipeline {
        ValidationPipeline::new(
            self.settings.clone(),
            Collaborators {
                toolchain: self.toolchain.clone(),
                plotter: self.plotter.clone(),
                vcs: self.vcs.clone(),
            },
        )
        .unwrap()
    }

    async fn run(&self, selector: &str) -> Result<PipelineReport, PipelineError> {
        let request = PipelineRequest {
            case: ValidationCase::parse("Basic", "2DML", "SA").unwrap(),
            selector: selector.parse::<ConfigurationSelector>().unwrap(),
            author: Author::new("alice").unwrap(),
            overrides: ConfigOverrides::default(),
        };
        self.pipeline().run(&request).await
    }
}

/// Every path under `root`, relative and sorted.
fn snapshot(root: &Path) -> Vec<String> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .map(|e| {
            e.unwrap()
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

#[tokio::test]
async fn test_all_configurations_end_to_end() {
    let h = Harness::new();
    let before = snapshot(&h.settings.primary_root);

    let report = h.run("All").await.expect("pipeline failed");

    assert!(report.success());
    assert_eq!(report.bundle, "Basic_2DML_SA_All_alice");
    assert_eq!(report.branch, "2DML_alice");
    let names: Vec<_> = report
        .configurations
        .iter()
        .map(|c| c.configuration.as_str())
        .collect();
    assert_eq!(names, ["Configuration1", "Configuration2"]);

    // Inputs were present while the solver ran.
    let calls = h.toolchain.calls();
    assert_eq!(calls.len(), 4);
    for call in &calls {
        for input in ["Config.cfg", "mesh.su2", "restart_flow.dat"] {
            assert!(call.inputs.contains(input), "{} missing {input}", call.mesh);
        }
    }

    // Results tree, logs, archive and report.
    let ws = &h.settings.workspace;
    let bundle = ws.join("results/Basic_2DML_SA_All_alice");
    assert!(bundle.join("Configuration1/Mesh1/history.csv").exists());
    assert!(bundle.join("Configuration2/Mesh2/flow.vtu").exists());
    assert!(bundle.join("Configuration1/Config.cfg").exists());
    assert!(bundle.join("Configuration1/logs/Mesh1.log").exists());
    assert!(bundle.join("Configuration2/plots/convergence.png").exists());
    let archive = report.archive.as_ref().expect("archive written");
    assert_eq!(archive.path, ws.join("Basic_2DML_SA_All_alice.tar.gz"));
    assert!(archive.path.exists());
    let summary = ws.join("Basic_2DML_SA_All_alice.summary.json");
    assert_eq!(PipelineReport::read_json(&summary).unwrap(), report);

    // Publication and combined plots.
    let case_dir = h.work_tree().join("vandv_files/2DML");
    assert!(case_dir.join("2DML_SA_Configuration1/convergence.png").exists());
    assert!(case_dir.join("2DML_SA_Configuration2/convergence.png").exists());
    assert!(case_dir.join("combined_plots/combined.png").exists());
    let publication = report.publication.as_ref().unwrap();
    assert_eq!(publication.published, ["Configuration1", "Configuration2"]);
    assert!(publication.pushed);
    assert!(matches!(
        report.combine,
        Some(CombineOutcome::Combined { siblings: 2, .. })
    ));
    assert_eq!(
        h.vcs.commits(),
        [
            "Add validation results for 2DML by alice",
            "Add combined plots for 2DML by alice"
        ]
    );

    // The primary repository is back to its original layout.
    assert_eq!(snapshot(&h.settings.primary_root), before);
}

#[tokio::test]
async fn test_single_configuration() {
    let h = Harness::new();

    let report = h.run("Configuration1").await.unwrap();

    assert_eq!(report.bundle, "Basic_2DML_SA_Configuration1_alice");
    assert_eq!(report.configurations.len(), 1);
    assert!(h
        .toolchain
        .calls()
        .iter()
        .all(|c| c.configuration == "Configuration1"));
    assert!(h
        .settings
        .workspace
        .join("Basic_2DML_SA_Configuration1_alice.tar.gz")
        .exists());
    // One published configuration: nothing to combine.
    assert!(matches!(
        report.combine,
        Some(CombineOutcome::Skipped { siblings: 1 })
    ));
}

#[tokio::test]
async fn test_failure_is_isolated_per_configuration() {
    let h = Harness::with(
        ScriptedToolchain::new().failing("Configuration1"),
        FakePlotter::new(),
        FsVersionControl::new(),
    );
    let before = snapshot(&h.settings.primary_root);

    let report = h.run("All").await.unwrap();

    assert!(report.success(), "partial success is a successful run");
    assert_eq!((report.succeeded_count(), report.failed_count()), (1, 1));
    assert!(report.configurations[0]
        .failure_reason()
        .unwrap()
        .contains("Configuration1"));
    // Failed runs are collected but not plotted or published.
    assert!(report.configurations[0].collected_files > 0);
    assert!(report.configurations[0].plots.is_none());
    assert_eq!(h.plotter.plot_calls(), 1);
    assert_eq!(
        report.publication.as_ref().unwrap().published,
        ["Configuration2"]
    );
    assert!(!h
        .work_tree()
        .join("vandv_files/2DML/2DML_SA_Configuration1")
        .exists());
    assert_eq!(snapshot(&h.settings.primary_root), before);
}

#[tokio::test]
async fn test_every_configuration_failing_fails_the_run() {
    let h = Harness::with(
        ScriptedToolchain::new()
            .failing("Configuration1")
            .failing("Configuration2"),
        FakePlotter::new(),
        FsVersionControl::new(),
    );

    let report = h.run("All").await.unwrap();

    assert!(!report.success());
    assert_eq!(report.failed_count(), 2);
    let publication = report.publication.unwrap();
    assert!(publication.published.is_empty());
    assert!(!publication.committed);
    assert!(h.vcs.pushes().is_empty());
}

#[tokio::test]
async fn test_publish_preserves_unrelated_branch_content() {
    let h = Harness::new();
    let unrelated = h
        .work_tree()
        .join("vandv_files/3DWB/3DWB_SST_Configuration1/cp.png");
    fs::create_dir_all(unrelated.parent().unwrap()).unwrap();
    fs::write(&unrelated, "other author").unwrap();
    let stale = h
        .work_tree()
        .join("vandv_files/2DML/2DML_SA_Configuration1/stale.png");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "previous run").unwrap();

    h.run("Configuration1").await.unwrap();

    assert_eq!(fs::read_to_string(&unrelated).unwrap(), "other author");
    assert!(!stale.exists(), "target directory is replaced");
    assert!(stale.with_file_name("convergence.png").exists());
}

#[tokio::test]
async fn test_rerun_without_changes_does_not_push_again() {
    let h = Harness::new();

    h.run("Configuration1").await.unwrap();
    let second = h.run("Configuration1").await.unwrap();

    let publication = second.publication.unwrap();
    assert_eq!(publication.published, ["Configuration1"]);
    assert!(!publication.committed);
    assert!(!publication.pushed);
    assert_eq!(h.vcs.pushes().len(), 1);
}

#[tokio::test]
async fn test_partial_staging_skips_mesh_without_secondary_data() {
    let h = Harness::new();
    fs::create_dir_all(h.primary_case().join("Configuration1/Mesh3")).unwrap();
    fs::create_dir_all(h.secondary_case().join("Configuration1/Mesh3")).unwrap();
    let before = snapshot(&h.settings.primary_root);

    let report = h.run("Configuration1").await.unwrap();

    let cfg = &report.configurations[0];
    assert!(cfg.succeeded());
    assert_eq!(cfg.staged_meshes, ["Mesh1", "Mesh2"]);
    assert_eq!(cfg.skipped_meshes, ["Mesh3"]);
    assert_eq!(cfg.warnings.len(), 1);
    assert!(h.toolchain.calls().iter().all(|c| c.mesh != "Mesh3"));
    assert_eq!(snapshot(&h.settings.primary_root), before);
}

#[tokio::test]
async fn test_configuration_without_stageable_meshes_fails() {
    let h = Harness::new();
    let cfg = h.primary_case().join("Configuration3");
    fs::create_dir_all(cfg.join("Mesh1")).unwrap();
    fs::write(cfg.join("Config.cfg"), "SOLVER= RANS\n").unwrap();

    let report = h.run("Configuration3").await.unwrap();

    assert!(!report.success());
    assert!(report.configurations[0]
        .failure_reason()
        .unwrap()
        .contains("no staged mesh cases"));
    assert!(h.toolchain.calls().is_empty());
}

#[tokio::test]
async fn test_missing_named_configuration_is_stage_failure() {
    let h = Harness::new();

    let report = h.run("Configuration9").await.unwrap();

    assert!(!report.success());
    assert!(report.configurations[0].stage_error.is_some());
    assert!(report.configurations[0].run.is_none());
}

#[tokio::test]
async fn test_all_without_configurations_aborts() {
    let h = Harness::new();
    fs::remove_dir_all(h.primary_case()).unwrap();
    fs::create_dir_all(h.primary_case().join("plots")).unwrap();

    let err = h.run("All").await.unwrap_err();

    assert!(matches!(err, PipelineError::NoConfigurationsFound { .. }));
    assert!(!h
        .settings
        .workspace
        .join("Basic_2DML_SA_All_alice.summary.json")
        .exists());
}

#[tokio::test]
async fn test_checkout_failure_aborts_before_staging() {
    let h = Harness::with(
        ScriptedToolchain::new(),
        FakePlotter::new(),
        FsVersionControl::new().failing_checkout(),
    );

    let err = h.run("All").await.unwrap_err();

    assert!(matches!(err, PipelineError::PublishFailed { .. }));
    assert!(h.toolchain.calls().is_empty());
}

#[tokio::test]
async fn test_push_failure_keeps_local_artifacts() {
    let h = Harness::with(
        ScriptedToolchain::new(),
        FakePlotter::new(),
        FsVersionControl::new().failing_push(),
    );

    let report = h.run("All").await.unwrap();

    assert!(report.success());
    assert!(report.publication.as_ref().unwrap().failed());
    assert!(report.combine.is_none());
    assert!(report.archive.unwrap().path.exists());
}

#[tokio::test]
async fn test_timeout_fails_configuration_and_still_unstages() {
    let mut h = Harness::with(
        ScriptedToolchain::new().with_delay(Duration::from_secs(5)),
        FakePlotter::new(),
        FsVersionControl::new(),
    );
    h.settings.toolchain.timeout_secs = 1;
    let before = snapshot(&h.settings.primary_root);

    let report = h.run("Configuration1").await.unwrap();

    assert!(!report.success());
    assert!(report.configurations[0]
        .failure_reason()
        .unwrap()
        .contains("timed out"));
    assert_eq!(snapshot(&h.settings.primary_root), before);
}

#[tokio::test]
async fn test_leftovers_from_killed_run_are_swept() {
    let h = Harness::new();
    let before = snapshot(&h.settings.primary_root);
    let mesh = h.primary_case().join("Configuration2/Mesh1");
    fs::write(mesh.join("Config.cfg"), "stale").unwrap();
    fs::write(mesh.join("mesh.su2"), "stale").unwrap();

    let report = h.run("Configuration1").await.unwrap();

    assert!(report.sweep_errors.is_empty());
    // Only the selected configuration is swept.
    assert!(mesh.join("Config.cfg").exists());

    h.run("All").await.unwrap();
    assert_eq!(snapshot(&h.settings.primary_root), before);
}

#[tokio::test]
async fn test_publishing_disabled() {
    let mut h = Harness::new();
    h.settings.publish = false;

    let report = h.run("All").await.unwrap();

    assert!(report.success());
    assert!(report.publication.is_none());
    assert!(report.combine.is_none());
    assert!(h.vcs.branches().is_empty());
    assert!(!h.work_tree().exists());
}

#[tokio::test]
async fn test_plot_failure_is_non_fatal() {
    let h = Harness::with(
        ScriptedToolchain::new(),
        FakePlotter::new().failing_plots(),
        FsVersionControl::new(),
    );

    let report = h.run("Configuration1").await.unwrap();

    assert!(report.success());
    assert!(report.configurations[0].plot_error.is_some());
    assert!(report.publication.unwrap().published.is_empty());
}

#[tokio::test]
async fn test_cleanup_failure_is_reported_without_failing_the_run() {
    let h = Harness::with(
        ScriptedToolchain::new().clobbering("Configuration1"),
        FakePlotter::new(),
        FsVersionControl::new(),
    );

    let report = h.run("All").await.unwrap();

    let first = &report.configurations[0];
    assert!(first.succeeded());
    assert_eq!(first.cleanup_errors.len(), 2);
    assert!(first
        .cleanup_errors
        .iter()
        .all(|e| e.starts_with("cleanup failed for") && e.contains("Configuration1")));
    assert!(report.configurations[1].cleanup_errors.is_empty());
    assert_eq!(report.cleanup_errors(), 2);

    // The run still counts as a success and publishes both configurations.
    assert!(report.success());
    assert_eq!(
        report.publication.as_ref().unwrap().published,
        ["Configuration1", "Configuration2"]
    );
    let summary = h
        .settings
        .workspace
        .join("Basic_2DML_SA_All_alice.summary.json");
    let saved = PipelineReport::read_json(&summary).unwrap();
    assert_eq!(saved.configurations[0].cleanup_errors, first.cleanup_errors);
    assert!(report.render_summary().contains("**PASS**"));
}
