use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use media_session::{
    calibrate_with_level, create_router, format_remaining, AppState, Config, MediaKinds,
    ProviderFactory, SessionEngine, StatusPublisher, TaskSessionState, TokioScheduler,
    CALIBRATION_SAMPLES,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Media session engine for timed observation tasks
#[derive(Parser, Debug)]
#[command(name = "media-session")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, global = true, default_value = "config/media-session")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP control API
    Serve,
    /// Calibrate, then run every configured task in order
    Run,
    /// Check camera and microphone access
    Calibrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Media Session v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let provider = ProviderFactory::create(&cfg.devices)?;
    let engine = SessionEngine::new(provider, TokioScheduler::shared(), &cfg.monitor);

    match args.command {
        Command::Serve => serve(&cfg, engine).await,
        Command::Run => run(&cfg, engine).await,
        Command::Calibrate => {
            let report = calibrate_with_level(
                Arc::clone(engine.provider()),
                &engine.level_monitor(),
                MediaKinds::BOTH,
                CALIBRATION_SAMPLES,
            )
            .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn connect_publisher(cfg: &Config) -> Result<Option<Arc<StatusPublisher>>> {
    if !cfg.nats.enabled {
        return Ok(None);
    }
    let publisher = StatusPublisher::connect(&cfg.nats.url).await?;
    Ok(Some(Arc::new(publisher)))
}

async fn serve(cfg: &Config, engine: SessionEngine) -> Result<()> {
    let mut state = AppState::new(engine, cfg.tasks.clone());
    if let Some(publisher) = connect_publisher(cfg).await? {
        state = state.with_publisher(publisher);
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}

async fn run(cfg: &Config, engine: SessionEngine) -> Result<()> {
    let report = calibrate_with_level(
        Arc::clone(engine.provider()),
        &engine.level_monitor(),
        MediaKinds::BOTH,
        CALIBRATION_SAMPLES,
    )
    .await;
    if !report.is_ready() {
        anyhow::bail!(
            "Calibration failed: {}",
            report.error.unwrap_or_else(|| "devices unavailable".to_string())
        );
    }

    let publisher = connect_publisher(cfg).await?;

    for task in &cfg.tasks {
        info!("Task: {} ({})", task.title, format_remaining(task.duration_secs));

        let controller = engine.controller(task.clone());
        if let Some(publisher) = &publisher {
            Arc::clone(publisher).forward(controller.subscribe());
        }

        if let Err(e) = controller.begin().await {
            warn!("Skipping {}: {}", task.task_id, e);
            controller.dispose();
            continue;
        }

        let mut status = controller.subscribe();
        let mut last_remaining = None;
        loop {
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = status.borrow_and_update().clone();
                    if last_remaining != Some(snapshot.remaining_secs) {
                        last_remaining = Some(snapshot.remaining_secs);
                        let level = snapshot
                            .loudness
                            .map(|l| format!("{:5.1} {}", l.value(), l.bucket().label()))
                            .unwrap_or_else(|| "-".to_string());
                        println!("{:>20} {}  {}", task.task_id, format_remaining(snapshot.remaining_secs), level);
                    }
                    if snapshot.state == TaskSessionState::Complete {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted; ending {}", task.task_id);
                    controller.dispose();
                    return Ok(());
                }
            }
        }

        let reason = controller.wait_complete().await;
        info!("Task {} finished ({:?})", task.task_id, reason);
        controller.dispose();
    }

    Ok(())
}
