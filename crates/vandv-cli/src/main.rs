//! SU2 V&V pipeline CLI
//!
//! The `vandv` command stages V&V data into the solver's validation cases,
//! runs them, archives the results and publishes plots.
//!
//! ## Commands
//!
//! - `run`: run one configuration (or `All`) of a validation case
//! - `configurations`: list the configurations `All` expands to
//! - `options`: list the options of an SU2 configuration file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use vandv_ci::{preflight, Collaborators, PipelineRequest, ValidationPipeline};
use vandv_core::{
    parse_options, Author, ConfigOverrides, ConfigurationSelector, PipelineSettings,
    ValidationCase,
};

#[derive(Parser)]
#[command(name = "vandv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SU2 verification & validation pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines (and JSON output where supported)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage, run, collect, archive and publish a validation case
    Run(RunArgs),

    /// List the configurations a selector expands to
    Configurations {
        #[command(flatten)]
        case: CaseArgs,

        /// Configuration name or "All"
        #[arg(long, default_value = "All")]
        configuration: String,

        #[command(flatten)]
        paths: PathArgs,
    },

    /// List the options of an SU2 configuration file
    Options {
        /// Path to the .cfg file
        file: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct CaseArgs {
    /// Case category (Basic or Extended)
    #[arg(long)]
    category: String,

    /// Case code, e.g. 2DML
    #[arg(long)]
    case_code: String,

    /// Turbulence model, e.g. SA
    #[arg(long)]
    turbulence_model: String,
}

#[derive(Args, Debug, Clone, Default)]
struct PathArgs {
    /// Settings file (JSON)
    #[arg(long, env = "VANDV_SETTINGS")]
    settings: Option<PathBuf>,

    /// ValidationCases directory of the solver repository
    #[arg(long)]
    primary_root: Option<PathBuf>,

    /// ValidationCases directory of the V&V data repository
    #[arg(long)]
    secondary_root: Option<PathBuf>,

    /// Directory for results, archives and reports
    #[arg(long)]
    workspace: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    case: CaseArgs,

    /// Configuration name or "All"
    #[arg(long)]
    configuration: String,

    /// Author name used in bundle and branch names
    #[arg(long, env = "VANDV_AUTHOR")]
    author: String,

    #[command(flatten)]
    paths: PathArgs,

    /// Results repository to publish into (URL or path)
    #[arg(long)]
    results_repo: Option<String>,

    /// Ref of the results repository to start from
    #[arg(long)]
    base_ref: Option<String>,

    /// Override a solver option in the staged config, KEY=VALUE (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Per-configuration solver timeout in seconds (0 disables)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip publishing plots
    #[arg(long)]
    no_publish: bool,

    /// Commit but do not push
    #[arg(long)]
    no_push: bool,

    /// Do not check for required programs on PATH
    #[arg(long)]
    skip_preflight: bool,
}

impl CaseArgs {
    fn to_case(&self) -> Result<ValidationCase> {
        ValidationCase::parse(&self.category, &self.case_code, &self.turbulence_model)
            .context("invalid validation case")
    }
}

impl PathArgs {
    fn apply(&self, settings: &mut PipelineSettings) {
        if let Some(p) = &self.primary_root {
            settings.primary_root = p.clone();
        }
        if let Some(p) = &self.secondary_root {
            settings.secondary_root = p.clone();
        }
        if let Some(p) = &self.workspace {
            settings.workspace = p.clone();
        }
    }
}

/// Defaults → settings file → `VANDV_*` environment → flags.
fn build_settings(args: &RunArgs) -> Result<PipelineSettings> {
    let mut settings = PipelineSettings::load(args.paths.settings.as_deref())
        .context("failed to load settings")?;
    args.paths.apply(&mut settings);

    if let Some(source) = &args.results_repo {
        settings.set_results_source(source.clone());
    }
    if let Some(repo) = settings.results_repo.as_mut() {
        if args.base_ref.is_some() {
            repo.base_ref = args.base_ref.clone();
        }
        if args.no_push {
            repo.push = false;
        }
    }
    if let Some(secs) = args.timeout_secs {
        settings.toolchain.timeout_secs = secs;
    }
    if args.no_publish {
        settings.publish = false;
    }
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    vandv_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Configurations {
            case,
            configuration,
            paths,
        } => cmd_configurations(&case, &configuration, &paths),
        Commands::Options { file } => cmd_options(&file, cli.json),
    }
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let settings = build_settings(args)?;
    let request = PipelineRequest {
        case: args.case.to_case()?,
        selector: args
            .configuration
            .parse::<ConfigurationSelector>()
            .context("invalid configuration")?,
        author: Author::new(&args.author).context("invalid author")?,
        overrides: ConfigOverrides::parse(&args.overrides).context("invalid --set")?,
    };

    if args.skip_preflight {
        info!("Skipping preflight checks");
    } else {
        preflight::check(&preflight::requirements(&settings)).context("preflight failed")?;
    }

    let collaborators = Collaborators::from_settings(&settings);
    let pipeline = ValidationPipeline::new(settings, collaborators)?;
    let report = pipeline
        .run(&request)
        .await
        .context("validation pipeline aborted")?;

    println!("{}", report.render_summary());
    println!(
        "Report: {}",
        pipeline.resolver().summary_path(&report.bundle).display()
    );

    if report.success() {
        Ok(())
    } else {
        anyhow::bail!(
            "every configuration failed ({} of {})",
            report.failed_count(),
            report.configurations.len()
        )
    }
}

fn cmd_configurations(case: &CaseArgs, configuration: &str, paths: &PathArgs) -> Result<()> {
    for name in list_configurations(case, configuration, paths)? {
        println!("{name}");
    }
    Ok(())
}

fn list_configurations(
    case: &CaseArgs,
    configuration: &str,
    paths: &PathArgs,
) -> Result<Vec<String>> {
    let mut settings =
        PipelineSettings::load(paths.settings.as_deref()).context("failed to load settings")?;
    paths.apply(&mut settings);
    // Listing never publishes.
    settings.publish = false;

    let case = case.to_case()?;
    let selector = configuration
        .parse::<ConfigurationSelector>()
        .context("invalid configuration")?;
    let pipeline = ValidationPipeline::new(settings.clone(), Collaborators::from_settings(&settings))?;
    let set = pipeline.expand(&case, &selector)?;
    Ok(set.names().to_vec())
}

fn cmd_options(file: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let options = parse_options(&text);
    if json {
        let map: serde_json::Map<String, serde_json::Value> = options
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        for (key, value) in options {
            println!("{key}= {value}");
        }
    }
    Ok(())
}
