//! Connection handlers for Huddle server.
//!
//! This module handles the connection lifecycle: upgrade checks, frame
//! decoding, outbound delivery, and heartbeats. All chat semantics live in
//! the dispatch loop.

use crate::config::Config;
use crate::dispatch::{self, Command, DispatchHandle};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use huddle_core::{ConnectionId, Dispatcher, Hub};
use huddle_protocol::{codec, ClientEvent, Encoding, ProtocolError, WireFrame};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Handle to the dispatch loop.
    pub dispatch: DispatchHandle,
    /// Server configuration.
    pub config: Config,
    /// Open WebSocket connections.
    connections: AtomicUsize,
}

impl AppState {
    /// Create new app state and start the dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the chat configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let dispatcher = Dispatcher::with_config(Hub::new(), config.chat.dispatcher_config()?);
        let (dispatch, _task) = dispatch::spawn(dispatcher);

        Ok(Self {
            dispatch,
            config,
            connections: AtomicUsize::new(0),
        })
    }

    /// Number of open WebSocket connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// Holds one slot of the connection limit until dropped.
struct ConnectionSlot {
    state: Arc<AppState>,
}

impl ConnectionSlot {
    /// Take a slot if the server is below `limits.max_connections`.
    fn try_acquire(state: &Arc<AppState>) -> Option<Self> {
        let max = state.config.limits.max_connections;
        state
            .connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < max).then_some(open + 1)
            })
            .ok()?;

        Some(Self {
            state: Arc::clone(state),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let state = Arc::new(AppState::new(config)?);
    serve(listener, state).await
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.connection_count(),
    }))
}

/// Upgrade query parameters.
#[derive(Debug, Default, Deserialize)]
struct WsParams {
    /// Outbound encoding for this connection.
    #[serde(default)]
    format: Encoding,
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());

    if !state.config.allows_origin(origin, host) {
        warn!(origin = ?origin, "Rejected WebSocket upgrade from disallowed origin");
        metrics::record_error("origin");
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    let Some(slot) = ConnectionSlot::try_acquire(&state) else {
        warn!("Rejected WebSocket upgrade: connection limit reached");
        metrics::record_error("capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, slot, params.format))
}

fn to_ws_message(frame: WireFrame) -> Message {
    match frame {
        WireFrame::Text(text) => Message::Text(text),
        WireFrame::Binary(data) => Message::Binary(data.to_vec()),
    }
}

/// Pass a decoded event to the dispatch loop.
fn forward(state: &AppState, connection_id: &ConnectionId, event: ClientEvent) -> bool {
    metrics::record_event(event.kind());
    state.dispatch.send(Command::Event {
        id: connection_id.clone(),
        event,
    })
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    _slot: ConnectionSlot,
    encoding: Encoding,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    let (outbox, mut inbox) = mpsc::unbounded_channel();

    if !state.dispatch.send(Command::Connect {
        id: connection_id.clone(),
        outbox,
    }) {
        error!(connection = %connection_id, "Dispatch loop is not running");
        return;
    }

    debug!(connection = %connection_id, encoding = ?encoding, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Read buffer for partial MessagePack frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    let heartbeat = &state.config.heartbeat;
    let ping_every = Duration::from_millis(heartbeat.interval_ms.max(1));
    let idle_timeout = Duration::from_millis(heartbeat.timeout_ms);
    let mut pings = interval_at(Instant::now() + ping_every, ping_every);
    let mut last_seen = Instant::now();

    'connection: loop {
        tokio::select! {
            // Events routed to this connection by the dispatch loop
            Some(event) = inbox.recv() => {
                match encoding.encode(event.as_ref()) {
                    Ok(frame) => {
                        metrics::record_frame(frame.len(), "outbound");
                        if sender.send(to_ws_message(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Failed to encode event");
                        metrics::record_error("encode");
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                };
                last_seen = Instant::now();

                match msg {
                    Message::Text(text) => {
                        metrics::record_frame(text.len(), "inbound");
                        match codec::decode_json::<ClientEvent>(&text) {
                            Ok(event) => {
                                if !forward(&state, &connection_id, event) {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(connection = %connection_id, error = %e, "Dropped undecodable text frame");
                                metrics::record_error("decode");
                            }
                        }
                    }
                    Message::Binary(data) => {
                        metrics::record_frame(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);

                        loop {
                            match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                                Ok(Some(event)) => {
                                    if !forward(&state, &connection_id, event) {
                                        break 'connection;
                                    }
                                }
                                Ok(None) => break,
                                Err(ProtocolError::FrameTooLarge(size)) => {
                                    warn!(connection = %connection_id, size, "Oversized frame, discarding buffer");
                                    metrics::record_error("decode");
                                    read_buffer.clear();
                                    break;
                                }
                                Err(e) => {
                                    warn!(connection = %connection_id, error = %e, "Dropped undecodable binary frame");
                                    metrics::record_error("decode");
                                }
                            }
                        }
                    }
                    Message::Ping(data) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                }
            }

            _ = pings.tick() => {
                if last_seen.elapsed() > idle_timeout {
                    info!(connection = %connection_id, "Heartbeat timeout");
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.dispatch.send(Command::Disconnect {
        id: connection_id.clone(),
    });

    debug!(connection = %connection_id, "WebSocket disconnected");
}
