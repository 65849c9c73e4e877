use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prsweep::cli::Cli;
use prsweep::config::Config;
use prsweep::engine::Engine;
use prsweep::github::GitHubGateway;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    if !cli.once && !cli.continuous {
        eprintln!("error: specify --once or --continuous");
        std::process::exit(2);
    }

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    let marker = match config.marker_regex() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    info!(repo = %config.repo, "prsweep starting");

    // One gateway per run: credential and repo are injected here and
    // never vary per call.
    let gateway = Arc::new(GitHubGateway::new(
        &config.repo,
        &config.token,
        &config.api_base,
        Duration::from_secs(config.timeout),
    ));
    let engine = Engine::new(
        gateway,
        marker,
        config.resolution.clone(),
        config.workers,
        config.dry_run,
        config.annotate,
    );

    if config.once {
        let summary = engine.run_pass().await;
        print!("{summary}");
    } else {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing current pass");
                let _ = shutdown_tx.send(true);
            }
        });
        let passes = engine
            .run_continuous(
                Duration::from_secs(config.interval),
                config.max_passes,
                shutdown_rx,
            )
            .await;
        info!(passes, "prsweep stopped");
    }
}
