//! Same-origin broadcast channel.
//!
//! Lower latency than the direct channel but only reachable from contexts on the same
//! origin. Runtimes without a broadcast primitive get an unavailable channel whose
//! listener never fires.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{InboundSink, Subscription, Transport, TransportKind, spawn_listener};
use crate::token::SessionId;

const CHANNEL_CAPACITY: usize = 256;

/// Named publish/subscribe channel shared by every same-origin context.
#[derive(Clone)]
pub struct BroadcastChannel {
	name: Arc<str>,
	tx: Option<broadcast::Sender<Value>>,
}

impl BroadcastChannel {
	pub fn new(name: &str) -> Self {
		let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
		Self {
			name: Arc::from(name),
			tx: Some(tx),
		}
	}

	/// A channel for runtimes that have no broadcast primitive.
	pub fn unavailable(name: &str) -> Self {
		Self {
			name: Arc::from(name),
			tx: None,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn is_available(&self) -> bool {
		self.tx.is_some()
	}

	/// Publishes to all subscribers, returns false if the channel is unavailable.
	pub fn publish(&self, message: Value) -> bool {
		let Some(tx) = &self.tx else {
			return false;
		};
		if tx.send(message).is_err() {
			trace!(target = "pickwire.transport", channel = %self.name, "broadcast with no subscribers");
		}
		true
	}

	pub fn listener(&self, namespace: &str) -> BroadcastListener {
		BroadcastListener {
			channel: self.clone(),
			namespace: Arc::from(namespace),
		}
	}
}

/// [`Transport`] over a [`BroadcastChannel`].
pub struct BroadcastListener {
	channel: BroadcastChannel,
	namespace: Arc<str>,
}

impl Transport for BroadcastListener {
	fn kind(&self) -> TransportKind {
		TransportKind::Broadcast
	}

	fn is_available(&self) -> bool {
		self.channel.is_available()
	}

	fn start(&self, session_id: &SessionId, sink: InboundSink) -> Subscription {
		let Some(tx) = &self.channel.tx else {
			debug!(target = "pickwire.transport", channel = %self.channel.name, "broadcast unavailable; listener inert");
			return Subscription::noop();
		};
		spawn_listener(
			TransportKind::Broadcast,
			tx.subscribe(),
			self.namespace.clone(),
			session_id.clone(),
			sink,
		)
	}
}
