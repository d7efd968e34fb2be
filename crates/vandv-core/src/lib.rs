//! V&V pipeline core library
//!
//! Domain types, deterministic path/name resolution, solver configuration
//! handling, settings and the version-control collaborator shared by the
//! orchestrator and the CLI.

pub mod case;
pub mod error;
pub mod git;
pub mod paths;
pub mod settings;
pub mod su2_config;
pub mod telemetry;

pub use case::{
    Author, Category, ConfigurationSelector, ConfigurationSet, TurbulenceModel, ValidationCase,
    ALL_SENTINEL,
};
pub use error::{Result, VandvError};
pub use git::{capture_head_sha, GitCli, VersionControl};
pub use paths::{
    branch_name, bundle_name, plots_dir, publication_case_dir, publication_dir, PathResolver,
    Repository, COMBINED_PLOTS_DIR, PLOTS_DIR, PUBLICATION_ROOT,
};
pub use settings::{CommitIdentity, PipelineSettings, ResultsRepo, ToolCommand};
pub use su2_config::{parse_options, ConfigOverrides};
pub use telemetry::{init_tracing, PipelineSpan};
