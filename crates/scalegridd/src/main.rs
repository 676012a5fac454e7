//! scalegridd — the ScaleGrid daemon.
//!
//! Single binary that assembles the ScaleGrid subsystems:
//! - State store (redb)
//! - Store-backed metrics and instance sources
//! - Scale executor (dry run or webhook)
//! - Autoscaler control loop
//! - REST API + Prometheus exposition
//!
//! # Usage
//!
//! ```text
//! scalegridd run --config scalegrid.toml --port 8443
//! scalegridd check --config scalegrid.toml
//! ```

mod daemon;
mod executor;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scalegrid_core::ScalegridConfig;

const DEFAULT_LOG_FILTER: &str = "info,scalegridd=debug,scalegrid=debug";

#[derive(Parser)]
#[command(name = "scalegridd", about = "ScaleGrid autoscaling daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the autoscaler and its API.
    Run {
        /// Path to scalegrid.toml. Built-in defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, default_value = "8443")]
        port: u16,

        /// Data directory for persistent state (overrides `[store] data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Validate a config file and every service in it.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
        } => {
            let config = match config {
                Some(path) => ScalegridConfig::from_file(&path)?,
                None => ScalegridConfig::default(),
            };
            daemon::run(config, port, data_dir).await
        }
        Command::Check { config } => check(&config),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = ScalegridConfig::from_file(path)?;
    println!("{}: ok", path.display());
    println!(
        "  interval {:?}, executor {:?}, {} service(s)",
        config.interval(),
        config.executor.mode,
        config.services.len()
    );
    for service in &config.services {
        println!(
            "  {} ({}-{} instances, cooldown {}s up / {}s down)",
            service.name,
            service.min_instances,
            service.max_instances,
            service.scale_up_cooldown_secs,
            service.scale_down_cooldown_secs
        );
    }
    Ok(())
}
