//! Transport adapters carrying envelopes from the remote context back to the builder.
//!
//! Three independent, unreliable channels run side by side for every session:
//!
//! - [`DirectChannelListener`] - Messages posted straight to this context, any origin
//! - [`BroadcastListener`] - Same-origin publish/subscribe channel
//! - [`StorePoller`] - Fixed-interval polling of a shared key/value store
//!
//! Every adapter implements [`Transport`]: `start` subscribes for one session id and
//! returns a [`Subscription`] whose `stop` (or drop) tears the adapter down. Adapters
//! only filter by session id; deduplication across adapters belongs to the consumer of
//! the [`InboundSink`].

mod direct;
mod same_origin;
mod store;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use pickwire_protocol::{DEFAULT_NAMESPACE, Envelope};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub use self::direct::{DirectChannel, DirectChannelListener};
pub use self::same_origin::{BroadcastChannel, BroadcastListener};
pub use self::store::{FileStore, MemoryStore, SharedStore, StorePoller};
use crate::token::SessionId;

/// Identifies which adapter delivered an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
	Direct,
	Broadcast,
	SharedStore,
}

impl fmt::Display for TransportKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			TransportKind::Direct => "direct",
			TransportKind::Broadcast => "broadcast",
			TransportKind::SharedStore => "shared_store",
		})
	}
}

/// Callback invoked by an adapter for each envelope matching its session id.
pub type InboundSink = Arc<dyn Fn(TransportKind, Envelope) + Send + Sync>;

/// A pluggable delivery channel.
pub trait Transport: Send + Sync {
	fn kind(&self) -> TransportKind;

	/// Capability check; unavailable adapters are skipped by the session controller.
	fn is_available(&self) -> bool {
		true
	}

	/// Starts listening for envelopes tagged with `session_id`.
	fn start(&self, session_id: &SessionId, sink: InboundSink) -> Subscription;
}

/// RAII handle for a running adapter, timer or monitor.
///
/// Stopping is idempotent: the first `stop` or the drop runs the teardown, later
/// calls do nothing.
pub struct Subscription {
	stop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
	/// Wraps a spawned task; stopping aborts it.
	pub fn from_task(handle: JoinHandle<()>) -> Self {
		Self::from_fn(move || handle.abort())
	}

	pub fn from_fn(stop: impl FnOnce() + Send + 'static) -> Self {
		Self {
			stop: Some(Box::new(stop)),
		}
	}

	/// A subscription with nothing to tear down.
	pub fn noop() -> Self {
		Self { stop: None }
	}

	pub fn is_active(&self) -> bool {
		self.stop.is_some()
	}

	pub fn stop(mut self) {
		self.run_stop();
	}

	fn run_stop(&mut self) {
		if let Some(stop) = self.stop.take() {
			stop();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.run_stop();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("active", &self.is_active()).finish()
	}
}

/// Shared receive loop for the push-style adapters (direct and broadcast).
///
/// Foreign messages and envelopes for other sessions are expected traffic and are
/// dropped at trace/debug level only.
pub(crate) fn spawn_listener(
	kind: TransportKind,
	mut rx: tokio::sync::broadcast::Receiver<Value>,
	namespace: Arc<str>,
	session_id: SessionId,
	sink: InboundSink,
) -> Subscription {
	let handle = tokio::spawn(async move {
		loop {
			match rx.recv().await {
				Ok(message) => {
					let Some(envelope) = Envelope::parse(&namespace, &message) else {
						trace!(target = "pickwire.transport", transport = %kind, "ignoring foreign message");
						continue;
					};
					if !envelope.is_for(session_id.as_str()) {
						debug!(
							target = "pickwire.transport",
							transport = %kind,
							expected = %session_id,
							received = %envelope.session_id,
							"dropping envelope for another session"
						);
						continue;
					}
					sink(kind, envelope);
				}
				Err(RecvError::Lagged(skipped)) => {
					warn!(target = "pickwire.transport", transport = %kind, skipped, "listener lagged; messages skipped");
				}
				Err(RecvError::Closed) => break,
			}
		}
	});
	Subscription::from_task(handle)
}

/// Default interval for [`StorePoller`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The ambient channels of one builder context, and the adapters built on them.
///
/// Channels are shared: many sessions (and other tabs) use them at once, which is why
/// every adapter filters by session id.
#[derive(Clone)]
pub struct TransportSet {
	namespace: Arc<str>,
	direct: DirectChannel,
	broadcast: BroadcastChannel,
	store: Option<Arc<dyn SharedStore>>,
	poll_interval: Duration,
}

impl TransportSet {
	/// In-memory channels and store for `namespace`.
	pub fn new(namespace: &str) -> Self {
		Self {
			namespace: Arc::from(namespace),
			direct: DirectChannel::new(),
			broadcast: BroadcastChannel::new(namespace),
			store: Some(Arc::new(MemoryStore::new())),
			poll_interval: DEFAULT_POLL_INTERVAL,
		}
	}

	pub fn with_broadcast(mut self, broadcast: BroadcastChannel) -> Self {
		self.broadcast = broadcast;
		self
	}

	/// Replaces the shared store; [`None`] models a runtime without one.
	pub fn with_store(mut self, store: Option<Arc<dyn SharedStore>>) -> Self {
		self.store = store;
		self
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn direct(&self) -> &DirectChannel {
		&self.direct
	}

	pub fn broadcast(&self) -> &BroadcastChannel {
		&self.broadcast
	}

	pub fn store(&self) -> Option<&Arc<dyn SharedStore>> {
		self.store.as_ref()
	}

	/// All three adapters, as used for element selection.
	pub fn selection_adapters(&self) -> Vec<Arc<dyn Transport>> {
		vec![
			Arc::new(self.direct.listener(&self.namespace)) as Arc<dyn Transport>,
			Arc::new(self.broadcast.listener(&self.namespace)),
			Arc::new(StorePoller::new(self.store.clone(), &self.namespace, self.poll_interval)),
		]
	}

	/// Push adapters only; validation outcomes are not written to the shared store.
	pub fn validation_adapters(&self) -> Vec<Arc<dyn Transport>> {
		vec![
			Arc::new(self.direct.listener(&self.namespace)) as Arc<dyn Transport>,
			Arc::new(self.broadcast.listener(&self.namespace)),
		]
	}
}

impl Default for TransportSet {
	fn default() -> Self {
		Self::new(DEFAULT_NAMESPACE)
	}
}

impl fmt::Debug for TransportSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TransportSet")
			.field("namespace", &self.namespace)
			.field("broadcast_available", &self.broadcast.is_available())
			.field("store", &self.store.is_some())
			.field("poll_interval", &self.poll_interval)
			.finish()
	}
}
