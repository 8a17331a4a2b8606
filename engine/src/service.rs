//! Service lifecycle: wires the router, broadcaster, transport and engine
//! together and owns their startup/shutdown order.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::broadcaster::{StatusBroadcaster, StatusReporter};
use crate::commands::CommandRouter;
use crate::config::ServiceConfig;
use crate::connections::ConnectionRegistry;
use crate::engine::{PlaybackEngine, SharedEngine};
use crate::paths::FolderMap;
use crate::ws::{player_socket, AppState};

/// How long `stop` waits for the HTTP server to wind down.
const TRANSPORT_GRACE: Duration = Duration::from_secs(5);

struct Transport {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

pub struct PlayerService {
    bind: SocketAddr,
    endpoint: String,
    static_dir: Option<PathBuf>,
    engine: SharedEngine,
    registry: ConnectionRegistry,
    router: Arc<CommandRouter>,
    reporter: StatusReporter,
    broadcaster: StatusBroadcaster,
    transport: Option<Transport>,
}

impl PlayerService {
    pub fn new(
        config: &ServiceConfig,
        folders: FolderMap,
        engine: Box<dyn PlaybackEngine>,
    ) -> anyhow::Result<Self> {
        let engine = SharedEngine::new(engine, config.engine_timeout());
        let registry = ConnectionRegistry::new();
        let reporter = StatusReporter::new(engine.clone(), registry.clone());
        Ok(Self {
            bind: config.bind_addr()?,
            endpoint: config.endpoint.clone(),
            static_dir: config.static_dir.clone(),
            router: Arc::new(CommandRouter::player(Arc::new(folders), engine.clone())),
            broadcaster: StatusBroadcaster::new(reporter.clone(), config.status_interval()),
            engine,
            registry,
            reporter,
            transport: None,
        })
    }

    /// Bind the endpoint, start the broadcast loop and begin accepting
    /// connections. Returns the bound address.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        if let Some(transport) = &self.transport {
            return Ok(transport.local_addr);
        }

        let listener = tokio::net::TcpListener::bind(self.bind)
            .await
            .with_context(|| format!("failed to bind {}", self.bind))?;
        let local_addr = listener.local_addr()?;

        self.broadcaster.start(CancellationToken::new());

        let shutdown = CancellationToken::new();
        let app = self.build_router(shutdown.clone());
        let graceful = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { graceful.cancelled().await })
                .await
        });

        tracing::info!("player endpoint listening on ws://{local_addr}{}", self.endpoint);
        self.transport = Some(Transport {
            local_addr,
            shutdown,
            task,
        });
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().map(|t| t.local_addr)
    }

    pub fn open_connections(&self) -> usize {
        self.registry.len()
    }

    /// Ordered shutdown: broadcast loop, then engine, then transport.
    pub async fn stop(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };

        // The loop must be gone before the engine and connections it uses.
        self.broadcaster.stop().await;

        if let Err(e) = self.engine.quit().await {
            tracing::warn!("engine quit failed: {e}");
        }

        transport.shutdown.cancel();
        match tokio::time::timeout(TRANSPORT_GRACE, transport.task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::warn!("http server failed: {e}"),
            Ok(Err(e)) => tracing::warn!("http server task failed: {e}"),
            Err(_) => tracing::warn!("http server did not stop within {TRANSPORT_GRACE:?}"),
        }
        tracing::info!("player service stopped");
    }

    fn build_router(&self, shutdown: CancellationToken) -> Router {
        let state = AppState {
            router: self.router.clone(),
            registry: self.registry.clone(),
            reporter: self.reporter.clone(),
            shutdown,
        };

        let mut app = Router::new()
            .route(&self.endpoint, get(player_socket))
            .route("/health", get(|| async { "OK" }));
        let trailing = format!("{}/", self.endpoint.trim_end_matches('/'));
        if trailing != self.endpoint {
            app = app.route(&trailing, get(player_socket));
        }
        if let Some(dir) = &self.static_dir {
            app = app.fallback_service(ServeDir::new(dir));
        }
        app.layer(TraceLayer::new_for_http()).with_state(state)
    }
}
