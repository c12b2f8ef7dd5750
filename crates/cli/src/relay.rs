//! Local relay server.
//!
//! Lets a remote context running in a real browser reach the builder's transports:
//!
//! - `POST /direct`, `GET /direct?session=<id>` (WebSocket) -> direct channel
//! - `POST /broadcast`, `GET /broadcast?session=<id>` (WebSocket) -> broadcast channel
//! - `GET|PUT|DELETE /store/{key}` -> shared store
//!
//! WebSocket connections that name a session register presence. A session whose
//! sockets have all disconnected counts as a closed remote context, and closing the
//! context from our side pushes `{"type": "<ns>_close"}` to its sockets.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pickwire_runtime::TransportSet;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

#[derive(Default)]
struct PresenceEntry {
	connections: HashMap<u64, mpsc::UnboundedSender<Message>>,
	seen: bool,
}

/// Tracks which sessions have a remote context connected to the relay.
#[derive(Clone)]
pub struct Presence {
	namespace: Arc<str>,
	sessions: Arc<Mutex<HashMap<String, PresenceEntry>>>,
	next_id: Arc<Mutex<u64>>,
}

impl Presence {
	pub fn new(namespace: &str) -> Self {
		Self {
			namespace: Arc::from(namespace),
			sessions: Arc::new(Mutex::new(HashMap::new())),
			next_id: Arc::new(Mutex::new(0)),
		}
	}

	pub(crate) fn join(&self, session: &str, tx: mpsc::UnboundedSender<Message>) -> u64 {
		let id = {
			let mut next = self.next_id.lock();
			*next += 1;
			*next
		};
		let mut sessions = self.sessions.lock();
		let entry = sessions.entry(session.to_string()).or_default();
		entry.seen = true;
		entry.connections.insert(id, tx);
		id
	}

	fn leave(&self, session: &str, connection: u64) {
		if let Some(entry) = self.sessions.lock().get_mut(session) {
			entry.connections.remove(&connection);
		}
	}

	pub fn is_connected(&self, session: &str) -> bool {
		self.sessions
			.lock()
			.get(session)
			.is_some_and(|entry| !entry.connections.is_empty())
	}

	/// True once the session connected at least once and every socket is gone.
	pub fn has_left(&self, session: &str) -> bool {
		self.sessions
			.lock()
			.get(session)
			.is_some_and(|entry| entry.seen && entry.connections.is_empty())
	}

	/// Stops tracking `session`. Sockets still open keep working but no longer count.
	pub fn forget(&self, session: &str) -> bool {
		self.sessions.lock().remove(session).is_some()
	}

	pub fn session_count(&self) -> usize {
		self.sessions.lock().len()
	}

	/// Asks every socket of `session` to close its context. Returns how many were told.
	pub fn request_close(&self, session: &str) -> usize {
		let frame = json!({
			"type": format!("{}_close", self.namespace),
			"payload": { "sessionId": session },
		})
		.to_string();
		let sessions = self.sessions.lock();
		let Some(entry) = sessions.get(session) else {
			return 0;
		};
		entry
			.connections
			.values()
			.filter(|tx| tx.send(Message::Text(frame.clone().into())).is_ok())
			.count()
	}
}

/// Shared state behind the relay routes.
#[derive(Clone)]
pub struct RelayState {
	transports: TransportSet,
	presence: Presence,
}

impl RelayState {
	pub fn new(transports: TransportSet, presence: Presence) -> Self {
		Self { transports, presence }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
	Direct,
	Broadcast,
}

impl Channel {
	fn name(self) -> &'static str {
		match self {
			Channel::Direct => "direct",
			Channel::Broadcast => "broadcast",
		}
	}
}

#[derive(Debug, Deserialize)]
struct SocketQuery {
	session: Option<String>,
}

pub fn router(state: RelayState) -> Router {
	Router::new()
		.route("/", get(|| async { "OK" }))
		.route(
			"/direct",
			get(
				|ws: WebSocketUpgrade, Query(query): Query<SocketQuery>, State(state): State<RelayState>| async move {
					ws.on_upgrade(move |socket| handle_socket(socket, state, Channel::Direct, query.session))
				},
			)
			.post(|State(state): State<RelayState>, body: Bytes| async move { publish(&state, Channel::Direct, &body) }),
		)
		.route(
			"/broadcast",
			get(
				|ws: WebSocketUpgrade, Query(query): Query<SocketQuery>, State(state): State<RelayState>| async move {
					ws.on_upgrade(move |socket| handle_socket(socket, state, Channel::Broadcast, query.session))
				},
			)
			.post(|State(state): State<RelayState>, body: Bytes| async move { publish(&state, Channel::Broadcast, &body) }),
		)
		.route("/store/{key}", get(store_get).put(store_put).delete(store_delete))
		.layer(map_response(allow_any_origin))
		.with_state(state)
}

/// Remote pages post from their own origin; the relay only listens on loopback.
async fn allow_any_origin(mut response: Response) -> Response {
	response
		.headers_mut()
		.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
	response
}

/// Body is read as raw bytes so text/plain posts (which skip CORS preflight) work.
fn publish(state: &RelayState, channel: Channel, body: &[u8]) -> StatusCode {
	let Ok(message) = serde_json::from_slice::<Value>(body) else {
		debug!(target = "pickwire.relay", channel = channel.name(), "rejecting non-JSON post");
		return StatusCode::BAD_REQUEST;
	};
	deliver(state, channel, message)
}

fn deliver(state: &RelayState, channel: Channel, message: Value) -> StatusCode {
	match channel {
		Channel::Direct => {
			state.transports.direct().post(message);
			StatusCode::ACCEPTED
		}
		Channel::Broadcast if state.transports.broadcast().publish(message) => StatusCode::ACCEPTED,
		Channel::Broadcast => StatusCode::SERVICE_UNAVAILABLE,
	}
}

async fn handle_socket(socket: WebSocket, state: RelayState, channel: Channel, session: Option<String>) {
	debug!(target = "pickwire.relay", channel = channel.name(), session = ?session, "remote context connected");

	let (tx, mut rx) = mpsc::unbounded_channel();
	let connection = session.as_deref().map(|session| state.presence.join(session, tx));
	let (mut ws_tx, mut ws_rx) = socket.split();

	let send_task = tokio::spawn(async move {
		while let Some(msg) = rx.recv().await {
			if ws_tx.send(msg).await.is_err() {
				break;
			}
		}
	});

	while let Some(msg) = ws_rx.next().await {
		match msg {
			Ok(Message::Text(text)) => match serde_json::from_str::<Value>(text.as_str()) {
				Ok(message) => {
					deliver(&state, channel, message);
				}
				Err(_) => trace!(target = "pickwire.relay", channel = channel.name(), "ignoring non-JSON frame"),
			},
			Ok(Message::Close(_)) => break,
			Ok(_) => {}
			Err(err) => {
				warn!(target = "pickwire.relay", channel = channel.name(), error = %err, "relay websocket error");
				break;
			}
		}
	}

	if let (Some(session), Some(connection)) = (session.as_deref(), connection) {
		state.presence.leave(session, connection);
	}
	send_task.abort();
	debug!(target = "pickwire.relay", channel = channel.name(), session = ?session, "remote context disconnected");
}

async fn store_get(State(state): State<RelayState>, Path(key): Path<String>) -> Response {
	let Some(store) = state.transports.store() else {
		return StatusCode::SERVICE_UNAVAILABLE.into_response();
	};
	match store.get(&key) {
		Ok(Some(value)) => value.into_response(),
		Ok(None) => StatusCode::NOT_FOUND.into_response(),
		Err(err) => {
			warn!(target = "pickwire.relay", %key, error = %err, "store read failed");
			StatusCode::INTERNAL_SERVER_ERROR.into_response()
		}
	}
}

async fn store_put(State(state): State<RelayState>, Path(key): Path<String>, body: String) -> StatusCode {
	let Some(store) = state.transports.store() else {
		return StatusCode::SERVICE_UNAVAILABLE;
	};
	match store.set(&key, &body) {
		Ok(()) => StatusCode::NO_CONTENT,
		Err(err) => {
			warn!(target = "pickwire.relay", %key, error = %err, "store write failed");
			StatusCode::INTERNAL_SERVER_ERROR
		}
	}
}

async fn store_delete(State(state): State<RelayState>, Path(key): Path<String>) -> StatusCode {
	let Some(store) = state.transports.store() else {
		return StatusCode::SERVICE_UNAVAILABLE;
	};
	match store.remove(&key) {
		Ok(()) => StatusCode::NO_CONTENT,
		Err(err) => {
			warn!(target = "pickwire.relay", %key, error = %err, "store delete failed");
			StatusCode::INTERNAL_SERVER_ERROR
		}
	}
}

/// Running relay server; stops when dropped.
pub struct RelayHandle {
	addr: SocketAddr,
	task: JoinHandle<()>,
}

impl RelayHandle {
	pub fn addr(&self) -> SocketAddr {
		self.addr
	}

	/// Base URL advertised to the remote context.
	pub fn url(&self) -> String {
		format!("http://{}", self.addr)
	}
}

impl Drop for RelayHandle {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Binds `host:port` (port 0 picks a free one) and serves the relay in the background.
pub async fn start(host: &str, port: u16, state: RelayState) -> Result<RelayHandle> {
	let addr: SocketAddr = format!("{host}:{port}")
		.parse()
		.with_context(|| format!("Invalid host/port combination: {host}:{port}"))?;

	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind relay server to {addr}"))?;
	let addr = listener.local_addr().context("Failed to read relay address")?;

	info!(target = "pickwire.relay", %addr, "relay listening");

	let app = router(state);
	let task = tokio::spawn(async move {
		if let Err(err) = axum::serve(listener, app.into_make_service()).await {
			error!(target = "pickwire.relay", error = %err, "relay server error");
		}
	});

	Ok(RelayHandle { addr, task })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn presence_follows_sockets_until_forgotten() {
		let presence = Presence::new("pickwire");
		assert!(!presence.has_left("s1"));

		let (tx, mut rx) = mpsc::unbounded_channel();
		let first = presence.join("s1", tx.clone());
		let second = presence.join("s1", tx);
		assert!(presence.is_connected("s1"));

		assert_eq!(presence.request_close("s1"), 2);
		let Ok(Message::Text(frame)) = rx.try_recv() else {
			panic!("expected a close frame");
		};
		let frame: Value = serde_json::from_str(frame.as_str()).unwrap();
		assert_eq!(frame["type"], "pickwire_close");
		assert_eq!(frame["payload"]["sessionId"], "s1");

		presence.leave("s1", first);
		assert!(!presence.has_left("s1"));
		presence.leave("s1", second);
		assert!(presence.has_left("s1"));

		assert!(presence.forget("s1"));
		assert_eq!(presence.session_count(), 0);
		assert!(!presence.forget("s1"));
		presence.leave("s1", second);
		assert_eq!(presence.session_count(), 0);
	}
}
