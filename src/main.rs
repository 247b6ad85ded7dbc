//! Segue - main entry point.
//!
//! Wires the audio backend, library scan, resolution pipeline and
//! orchestrator together, then serves the HTTP control surface until a
//! shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use segue::api;
use segue::audio;
use segue::config::Config;
use segue::engine::AudioEngine;
use segue::library::{LocalLibrary, LocalResolver};
use segue::orchestrator::{NoopMetadataFetcher, Orchestrator, PlayerCommand};
use segue::resolve::UrlPipeline;
use segue::state::SharedState;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "segue")]
#[command(about = "Headless music playback service with crossfade")]
#[command(version)]
struct Args {
    /// Path to the config file
    #[arg(short, long, env = "SEGUE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host override
    #[arg(long, env = "SEGUE_HOST")]
    host: Option<String>,

    /// Listen port override
    #[arg(short, long, env = "SEGUE_PORT")]
    port: Option<u16>,

    /// Music directory override
    #[arg(short, long, env = "SEGUE_MUSIC_DIR")]
    music_dir: Option<PathBuf>,

    /// Audio output device name override
    #[arg(long, env = "SEGUE_AUDIO_DEVICE")]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segue=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(music_dir) = args.music_dir {
        config.music_dir = Some(music_dir);
    }
    if let Some(device) = args.device {
        config.audio_device = Some(device);
    }
    config.validate().context("Invalid config")?;

    info!("Starting segue v{}", env!("CARGO_PKG_VERSION"));

    let music_dir = config.music_dir();
    let library = Arc::new(LocalLibrary::scan(&music_dir));
    info!(
        "Library: {} tracks from {}",
        library.len(),
        music_dir.display()
    );

    let (sink_a, sink_b) =
        audio::build_sinks(config.audio_device.clone()).context("Failed to open audio output")?;

    let state = Arc::new(SharedState::new(config.settings.clone()));
    let (engine, sink_events) = AudioEngine::new(sink_a, sink_b, &config.settings);
    engine.spawn_monitor();

    let pipeline = Arc::new(UrlPipeline::new(Arc::new(LocalResolver), state.bus.clone()));
    let (orchestrator, player) = Orchestrator::new(
        engine,
        sink_events,
        pipeline,
        state.clone(),
        library.clone(),
        Arc::new(NoopMetadataFetcher),
    );
    let orchestrator_task = orchestrator.spawn();

    let ctx = api::AppContext {
        state,
        library,
        player: player.clone(),
    };
    api::serve(&config, ctx, shutdown_signal()).await?;

    player.send(PlayerCommand::Shutdown);
    let _ = orchestrator_task.await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
