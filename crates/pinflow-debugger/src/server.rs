//! HTTP and websocket transport for the debug protocol.
//!
//! - `GET /ws`: websocket. Outbound event batches are pushed as
//!   [`OutboundMessage`] text frames; inbound text frames are
//!   [`InboundMessage`](crate::protocol::InboundMessage)s.
//! - `GET /history?insId=..&pinId=..&limit=..`
//! - `DELETE /history`
//! - `GET /state`

use std::io;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::history::EventHistory;
use crate::protocol::{self, CommandTarget, DebugQuery, HistoryQuery, OutboundMessage, StateSource};

/// Batches buffered per websocket client before it starts lagging.
pub const CLIENT_BUFFER: usize = 256;

/// Everything the debug routes need from one session.
#[derive(Clone)]
pub struct DebugServer {
  control: Arc<dyn CommandTarget>,
  history: Arc<EventHistory>,
  state: Arc<dyn StateSource>,
  events: broadcast::Sender<OutboundMessage>,
  shutdown: CancellationToken,
}

impl DebugServer {
  /// `events` carries the emitter's batches; every connected client gets
  /// its own subscription.
  pub fn new(
    control: Arc<dyn CommandTarget>,
    history: Arc<EventHistory>,
    state: Arc<dyn StateSource>,
    events: broadcast::Sender<OutboundMessage>,
  ) -> Self {
    Self {
      control,
      history,
      state,
      events,
      shutdown: CancellationToken::new(),
    }
  }

  /// Stop serving and close open websockets.
  pub fn shutdown(&self) {
    self.shutdown.cancel();
  }
}

pub fn router(server: DebugServer) -> Router {
  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods(Any)
    .allow_headers(Any);

  Router::new()
    .route("/ws", get(socket_handler))
    .route("/history", get(history_handler).delete(clear_history_handler))
    .route("/state", get(state_handler))
    .layer(cors)
    .with_state(server)
}

/// Serve until [`DebugServer::shutdown`] is called.
pub async fn serve(listener: TcpListener, server: DebugServer) -> io::Result<()> {
  info!(addr = ?listener.local_addr().ok(), "debug_server_listening");
  let shutdown = server.shutdown.clone();
  axum::serve(listener, router(server))
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}

async fn history_handler(
  State(server): State<DebugServer>,
  Query(query): Query<HistoryQuery>,
) -> Json<Value> {
  Json(answer(&server, DebugQuery::History(query)))
}

async fn clear_history_handler(State(server): State<DebugServer>) -> Json<Value> {
  Json(answer(&server, DebugQuery::ClearHistory))
}

async fn state_handler(State(server): State<DebugServer>) -> Json<Value> {
  Json(answer(&server, DebugQuery::State))
}

fn answer(server: &DebugServer, query: DebugQuery) -> Value {
  protocol::answer_query(&query, &server.history, server.state.as_ref())
}

async fn socket_handler(ws: WebSocketUpgrade, State(server): State<DebugServer>) -> Response {
  ws.on_upgrade(move |socket| handle_socket(socket, server))
}

async fn handle_socket(socket: WebSocket, server: DebugServer) {
  debug!("debug_client_connected");
  let (mut sink, mut stream) = socket.split();
  let mut events = server.events.subscribe();

  loop {
    tokio::select! {
      _ = server.shutdown.cancelled() => {
        // Client may already be gone
        let _ = sink.send(Message::Close(None)).await;
        break;
      }
      batch = events.recv() => match batch {
        Ok(message) => {
          let Ok(text) = serde_json::to_string(&message) else {
            continue;
          };
          if sink.send(Message::Text(text)).await.is_err() {
            break;
          }
        }
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          warn!(skipped, "debug_client_lagged");
        }
        Err(broadcast::error::RecvError::Closed) => break,
      },
      incoming = stream.next() => match incoming {
        Some(Ok(Message::Text(text))) => protocol::handle_message(server.control.as_ref(), &text),
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => {}
        Some(Err(e)) => {
          debug!(error = %e, "debug_socket_error");
          break;
        }
      },
    }
  }
  debug!("debug_client_disconnected");
}
