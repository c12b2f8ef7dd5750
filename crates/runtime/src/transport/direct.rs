//! Direct channel: messages addressed to this context regardless of origin.
//!
//! This is the only transport that works when the remote context lives on a different
//! origin, so it is also the noisiest: anything may be posted here, and the listener
//! filters by namespaced type tag before it looks at the payload.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use super::{InboundSink, Subscription, Transport, TransportKind, spawn_listener};
use crate::token::SessionId;

const CHANNEL_CAPACITY: usize = 256;

/// Inbound message port of this context.
#[derive(Clone)]
pub struct DirectChannel {
	tx: broadcast::Sender<Value>,
}

impl DirectChannel {
	pub fn new() -> Self {
		let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
		Self { tx }
	}

	/// Posts a structured message to every listener. Messages posted while nobody
	/// listens are lost, like a `postMessage` to a window without handlers.
	pub fn post(&self, message: Value) {
		if self.tx.send(message).is_err() {
			trace!(target = "pickwire.transport", "direct message posted with no listeners");
		}
	}

	/// Posts a raw text frame, returns false when it is not JSON.
	pub fn post_text(&self, text: &str) -> bool {
		match serde_json::from_str::<Value>(text) {
			Ok(message) => {
				self.post(message);
				true
			}
			Err(_) => false,
		}
	}

	/// Adapter listening on this channel for `namespace` envelopes.
	pub fn listener(&self, namespace: &str) -> DirectChannelListener {
		DirectChannelListener {
			channel: self.clone(),
			namespace: Arc::from(namespace),
		}
	}

	/// Returns the number of active listeners.
	pub fn listener_count(&self) -> usize {
		self.tx.receiver_count()
	}
}

impl Default for DirectChannel {
	fn default() -> Self {
		Self::new()
	}
}

/// [`Transport`] over a [`DirectChannel`].
pub struct DirectChannelListener {
	channel: DirectChannel,
	namespace: Arc<str>,
}

impl Transport for DirectChannelListener {
	fn kind(&self) -> TransportKind {
		TransportKind::Direct
	}

	fn start(&self, session_id: &SessionId, sink: InboundSink) -> Subscription {
		spawn_listener(
			TransportKind::Direct,
			self.channel.tx.subscribe(),
			self.namespace.clone(),
			session_id.clone(),
			sink,
		)
	}
}
