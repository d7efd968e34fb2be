//! Tracing initialisation and pipeline lifecycle events.
//!
//! Call [`init_tracing`] once at program start. Every orchestrator run is
//! instrumented with a [`PipelineSpan`] so all of its log lines carry the run
//! id and bundle name.

use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json` — emit newline-delimited JSON log lines.
/// * `level` — default verbosity when `RUST_LOG` is not set.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// Run-scoped span. Attach it to the run future with
/// `tracing::Instrument::instrument(fut, span.span())`.
#[derive(Debug, Clone)]
pub struct PipelineSpan {
    span: tracing::Span,
}

impl PipelineSpan {
    pub fn new(run_id: &str, bundle: &str) -> Self {
        Self {
            span: tracing::info_span!("vandv.run", run_id = %run_id, bundle = %bundle),
        }
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

pub fn emit_pipeline_started(run_id: &str, case: &str, configurations: usize) {
    info!(event = "pipeline.started", run_id = %run_id, case = %case, configurations);
}

pub fn emit_configuration_finished(configuration: &str, ran: bool, succeeded: bool, duration_ms: u64) {
    info!(
        event = "configuration.finished",
        configuration = %configuration,
        ran,
        succeeded,
        duration_ms
    );
}

pub fn emit_pipeline_finished(run_id: &str, succeeded: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        succeeded,
        failed,
        duration_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        let span = PipelineSpan::new("run-1", "Basic_2DML_SA_All_alice");
        let _entered = span.span().entered();
        emit_pipeline_started("run-1", "Basic/2DML/SA", 2);
    }
}
