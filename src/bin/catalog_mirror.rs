use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use catalog_mirror::app::{App, PlanAction};
use catalog_mirror::config::{ConfigLoader, ConfigOverrides};
use catalog_mirror::http::HttpClient;
use catalog_mirror::output::{LogSink, OutputMode, print_plan};

#[derive(Parser)]
#[command(name = "catalog-mirror")]
#[command(about = "Mirror documents listed by a paginated JSON catalog API")]
#[command(version, author)]
struct Cli {
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List, download, reconcile and write reports")]
    Run(CommonArgs),
    #[command(about = "Show what a run would download, without changing anything")]
    Plan(PlanArgs),
}

#[derive(Args, Clone)]
struct CommonArgs {
    #[arg(long, short)]
    config: PathBuf,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, value_name = "SECONDS")]
    cache_age: Option<u64>,

    #[arg(long)]
    base_path: Option<Utf8PathBuf>,
}

#[derive(Args, Clone)]
struct PlanArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long)]
    json: bool,
}

impl CommonArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_path: self.base_path.clone(),
            workers: self.workers,
            cache_age_secs: self.cache_age,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let start = Instant::now();
    let result = run(cli.command);
    tracing::info!("Run time: {}", format_run_time(start.elapsed()));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> miette::Result<()> {
    match command {
        Commands::Run(args) => {
            let app = build_app(&args)?;
            tracing::info!(name = %app.config().name, feed = %app.config().feed, "starting run");
            let report = app.run(&LogSink)?;
            tracing::info!(
                source = ?report.source,
                downloads = report.downloads,
                changes = report.summary.changes(),
                "run complete"
            );
            Ok(())
        }
        Commands::Plan(args) => {
            let app = build_app(&args.common)?;
            let plan = app.plan(&LogSink)?;
            let mode = if args.json {
                OutputMode::Json
            } else {
                OutputMode::Text
            };
            print_plan(&plan, mode).into_diagnostic()?;
            tracing::info!(
                fetch = plan.count(PlanAction::Fetch),
                refresh = plan.count(PlanAction::Refresh),
                cached = plan.count(PlanAction::Cached),
                skip = plan.count(PlanAction::Skip),
                conflict = plan.count(PlanAction::Conflict),
                "plan"
            );
            Ok(())
        }
    }
}

fn build_app(args: &CommonArgs) -> miette::Result<App<HttpClient>> {
    let config = ConfigLoader::resolve(&args.config, &args.overrides())?;
    let http = HttpClient::new(&config.http)?;
    Ok(App::new(config, http))
}

fn format_run_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let minutes = (secs / 60.0).floor();
    format!("{}:{:04.1}", minutes as u64, secs - minutes * 60.0)
}
