//! WebSocket transport and process orchestration.
//!
//! The transport is deliberately thin: it assigns connection ids, forwards
//! open/message/close into the engine, and drains each connection's
//! outbound frame queue into its socket. All protocol decisions live in the
//! engine.

use crate::config::Config;
use crate::engine::{Engine, TransportEvent};
use crate::media::Registry;
use crate::session::ConnectionId;
use crate::watch;
use anyhow::{Context, Result};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Frames buffered per connection before delivery starts skipping ticks.
const OUTBOUND_QUEUE_FRAMES: usize = 256;

/// Transport and watcher event queue depths into the engine.
const ENGINE_QUEUE_EVENTS: usize = 1024;

/// Shared transport context
#[derive(Clone)]
pub struct AppContext {
    engine_tx: mpsc::Sender<TransportEvent>,
    next_id: Arc<AtomicU64>,
}

impl AppContext {
    pub fn new(engine_tx: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            engine_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

/// Create the Axum router
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new().allow_origin(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn ws_handler(State(ctx): State<AppContext>, ws: WebSocketUpgrade) -> impl IntoResponse {
    // Ids increase monotonically and are never reused for the lifetime of
    // the process.
    let id = ctx.next_id.fetch_add(1, Ordering::Relaxed);
    ws.on_upgrade(move |socket| handle_socket(socket, ctx.engine_tx.clone(), id))
}

async fn handle_socket(socket: WebSocket, engine_tx: mpsc::Sender<TransportEvent>, id: ConnectionId) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_FRAMES);
    if engine_tx
        .send(TransportEvent::Open {
            id,
            outbound: outbound_tx,
        })
        .await
        .is_err()
    {
        return;
    }

    let (mut sink, mut stream) = socket.split();

    // Writer task: the connection's FIFO send queue. Ends when the engine
    // drops the session (sender closed) or the socket dies.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Binary(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(frame)) => {
                if engine_tx
                    .send(TransportEvent::Message { id, frame })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            // Text, ping and pong frames are not part of the protocol.
            Ok(_) => {}
        }
    }

    let _ = engine_tx.send(TransportEvent::Close { id }).await;
    let _ = writer.await;
}

/// Build everything from configuration and serve until ctrl-c or a fatal
/// engine error.
pub async fn run(config: Config) -> Result<()> {
    let registry = Registry::from_config(&config);

    let (transport_tx, transport_rx) = mpsc::channel(ENGINE_QUEUE_EVENTS);
    let (watch_tx, watch_rx) = mpsc::channel(ENGINE_QUEUE_EVENTS);

    // Attach the watcher before the startup scan so nothing finished in
    // between is missed; re-ingesting a file is idempotent.
    let roots: Vec<(String, PathBuf)> = config
        .channels
        .iter()
        .map(|c| (c.name.clone(), c.source_dir.clone()))
        .collect();
    let _watcher = watch::spawn_watcher(&roots, watch_tx)?;

    let mut engine = Engine::new(
        registry,
        Duration::from_millis(config.tick_ms),
        transport_rx,
        watch_rx,
    );
    engine.preload();

    let app = create_router(AppContext::new(transport_tx));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    let shutdown = CancellationToken::new();
    let mut engine_task = tokio::spawn(engine.run(shutdown.clone()));
    let server = {
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(shutdown))
                .await
        }
    };

    tokio::select! {
        result = server => {
            shutdown.cancel();
            result.context("transport server failed")?;
            engine_task.await.context("engine task panicked")??;
        }
        result = &mut engine_task => {
            shutdown.cancel();
            result.context("engine task panicked")??;
        }
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}
