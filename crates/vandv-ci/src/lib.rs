//! V&V pipeline orchestration.
//!
//! Expands a configuration selector, stages solver inputs from the V&V data
//! repository with guaranteed teardown, runs the solver per configuration,
//! collects and archives results, and publishes plots additively to the
//! results-hosting repository.

pub mod collector;
pub mod combiner;
pub mod error;
pub mod expander;
pub mod fakes;
pub mod fs_ops;
pub mod pipeline;
pub mod plotting;
pub mod preflight;
pub mod publisher;
pub mod report;
pub mod runner;
pub mod stage;

pub use collector::{ArchiveInfo, ArtifactCollector};
pub use combiner::{CombineOutcome, Combiner};
pub use error::{PipelineError, PipelineResult};
pub use expander::ConfigurationExpander;
pub use pipeline::{Collaborators, PipelineRequest, ValidationPipeline};
pub use plotting::{Plotter, ScriptPlotter};
pub use publisher::{PublishOutcome, Publisher};
pub use report::{ConfigurationReport, PipelineReport, SourceProvenance};
pub use runner::{
    CommandToolchain, ConfigurationRun, MeshRun, RunDriver, RunStatus, ToolOutput, Toolchain,
};
pub use stage::{StageManager, StagedConfiguration, StagedMesh};
