// player-remote engine
//
// Small by intent:
//   - Accept WebSocket clients on one endpoint (default /player)
//   - Route play/stop commands to mpv, restricted to configured folders
//   - Push playback status to every client every two seconds

use player_remote::config::{EngineConfig, ServiceConfig};
use player_remote::engine::{DryRunEngine, PlaybackEngine};
use player_remote::PlayerService;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = ServiceConfig::load()?;
    let folders = config.folder_map()?;
    if folders.is_empty() {
        warn!("no multimedia folders configured; every play command will be ignored");
    }
    for alias in folders.aliases() {
        if let Some(root) = folders.root(alias) {
            info!("folder {alias} -> {}", root.display());
        }
    }

    let engine = start_engine(&config.engine).await?;
    let mut service = PlayerService::new(&config, folders, engine)?;

    info!("player-remote engine {} starting", env!("CARGO_PKG_VERSION"));
    service.start().await?;

    shutdown_signal().await;
    service.stop().await;
    Ok(())
}

async fn start_engine(config: &EngineConfig) -> anyhow::Result<Box<dyn PlaybackEngine>> {
    match config {
        #[cfg(unix)]
        EngineConfig::Mpv(mpv) => {
            let engine = player_remote::engine::MpvSocketEngine::spawn(mpv).await?;
            Ok(Box::new(engine))
        }
        #[cfg(not(unix))]
        EngineConfig::Mpv(_) => anyhow::bail!("the mpv engine needs unix domain sockets"),
        EngineConfig::DryRun => {
            warn!("dry-run engine selected; nothing will actually play");
            Ok(Box::new(DryRunEngine::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async { tokio::signal::ctrl_c().await.ok(); };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    warn!("Shutdown signal received.");
}
