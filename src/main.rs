use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing::{debug, error};

use tokio::runtime::Builder;

use ssl_checker::app;
use ssl_checker::cli::{Cli, Commands};
use ssl_checker::config::{default_config_path, FileConfig, RunConfig};
use ssl_checker::error::exit_code_for;
use ssl_checker::logging;

fn main() {
    let cli = Cli::parse();

    if cli.command == Some(Commands::Version) {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    logging::init(&cli.log_file, cli.debug);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            exit_code_for(&e)
        }
    };

    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    // Configuration problems are reported before the runtime even starts
    let explicit = cli.config.is_some();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let file = FileConfig::load(&config_path, explicit)?;
    let config = RunConfig::from_sources(&cli, file.as_ref())?;
    debug!("Run configuration: {:?}", config);

    // Limit worker threads: probes are I/O bound and a handful of threads
    // is plenty even for thousands of targets
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let worker_threads = std::cmp::min(num_cpus + 2, 16);
    debug!("Configuring Tokio runtime with {} worker threads", worker_threads);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for interrupt signal: {}", e);
                // Never resolve: the run cannot be interrupted
                std::future::pending::<()>().await;
            }
        };
        app::run(&config, interrupt).await
    })
}
