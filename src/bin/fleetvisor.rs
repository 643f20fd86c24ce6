//! `fleetvisor` command line.
//!
//! ```text
//! fleetvisor run   --config fleet.toml     supervise until SIGINT/SIGTERM/SIGQUIT
//! fleetvisor check --config fleet.toml     validate and print the process table
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fleetvisor::{
    FleetConfig, LogWriter, RuntimeError, Subscribe, SupervisorBuilder, build_table,
    prepare_layout,
};

#[derive(Parser, Debug)]
#[command(name = "fleetvisor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the fleet configuration file
    #[arg(short, long, global = true, default_value = "fleet.toml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch the fleet and supervise it until a termination signal
    Run,
    /// Validate the configuration and print the expanded process table
    Check,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let cfg = FleetConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration {}", args.config.display()))?;

    match args.command {
        Command::Check => check(&cfg),
        Command::Run => run(cfg).await,
    }
}

fn check(cfg: &FleetConfig) -> Result<()> {
    let specs = build_table(cfg)?;
    for spec in &specs {
        let port = spec.port().map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let data = spec
            .data_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<16} port={:<6} data={} cmd={} {}",
            spec.name(),
            port,
            data,
            spec.command().display(),
            spec.args().join(" ")
        );
    }
    println!("{} process(es); configuration ok", specs.len());
    Ok(())
}

async fn run(cfg: FleetConfig) -> Result<()> {
    let layout = prepare_layout(&cfg.layout, &cfg.cluster)
        .await
        .context("failed to prepare data layout")?;
    if layout.created_cluster_file {
        info!(path = %layout.cluster_file.display(), "new cluster file written");
    }

    let specs = build_table(&cfg)?;
    info!(processes = specs.len(), "starting fleet");

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = SupervisorBuilder::from_fleet(&cfg, layout)
        .with_subscribers(subs)
        .build();

    match sup.run(specs).await {
        Ok(report) => {
            info!(processes = report.len(), "fleet stopped cleanly");
            Ok(())
        }
        Err(RuntimeError::ShutdownTimeout { forced, report, .. }) => {
            for (name, outcome) in report.iter() {
                info!(process = name, ?outcome, "stop outcome");
            }
            warn!(?forced, "fleet stopped; some processes were force-killed");
            anyhow::bail!("{} process(es) ignored SIGTERM", forced.len())
        }
        Err(err) => Err(err).context("supervisor failed"),
    }
}
