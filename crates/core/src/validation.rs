//! Validation orchestrator: re-checks recorded selectors in one remote round-trip.
//!
//! Each batch gets its own session id, its own remote context and its own item map.
//! Batches are independent, so several may be in flight at once; an outcome only
//! ever reaches the batch whose adapters were started with its id.
//!
//! Completion is emitted exactly once per batch. The batch is removed from the table
//! under the lock before anything is emitted, so whichever of last outcome, completion
//! message, timeout, closure or cancellation gets there first is the only one that
//! reports.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use pickwire_protocol::{
	EntryMode, EntryParams, Envelope, ItemStatus, MessageKind, ValidationItem, ValidationOutcome, ValidationRequest,
	augment_entry_url,
};
use pickwire_runtime::{
	Error, InboundSink, RemoteHandle, RemoteLauncher, Result, SessionId, Subscription, Transport, TransportKind,
};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::context::PickerContext;
use crate::handlers::{HandlerGuard, Handlers};
use crate::monitor::spawn_monitor;

/// Current state of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
	pub item_id: String,
	pub status: ItemStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tested_at_url: Option<String>,
}

impl ItemResult {
	fn new(item_id: String, status: ItemStatus) -> Self {
		Self {
			item_id,
			status,
			tested_at_url: None,
		}
	}
}

/// A single item changed inside a running batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdate {
	pub session_id: SessionId,
	pub item: ItemResult,
}

/// Why a batch finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchEnd {
	/// Every item has an outcome.
	AllReported,
	/// The remote context said it was done.
	CompleteMessage,
	/// Nothing had to be sent.
	Empty,
	TimedOut,
	RemoteClosed,
	LaunchFailed,
	Cancelled,
}

impl fmt::Display for BatchEnd {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			BatchEnd::AllReported => "all_reported",
			BatchEnd::CompleteMessage => "complete_message",
			BatchEnd::Empty => "empty",
			BatchEnd::TimedOut => "timed_out",
			BatchEnd::RemoteClosed => "remote_closed",
			BatchEnd::LaunchFailed => "launch_failed",
			BatchEnd::Cancelled => "cancelled",
		})
	}
}

/// Final snapshot of a batch, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
	#[serde(serialize_with = "serialize_session_id")]
	pub session_id: SessionId,
	pub items: Vec<ItemResult>,
	pub end: BatchEnd,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

fn serialize_session_id<S: serde::Serializer>(id: &SessionId, serializer: S) -> std::result::Result<S::Ok, S::Error> {
	serializer.serialize_str(id.as_str())
}

impl BatchReport {
	pub fn status_of(&self, item_id: &str) -> Option<ItemStatus> {
		self.items.iter().find(|item| item.item_id == item_id).map(|item| item.status)
	}

	pub fn count(&self, status: ItemStatus) -> usize {
		self.items.iter().filter(|item| item.status == status).count()
	}
}

/// Dispatches validation batches and aggregates their outcomes.
#[derive(Clone)]
pub struct ValidationOrchestrator {
	shared: Arc<Shared>,
}

struct Settings {
	namespace: String,
	timeout: Duration,
	monitor_interval: Duration,
	close_grace: Duration,
	auto_close: bool,
	close_on_timeout: bool,
	relay_url: Option<String>,
}

struct Shared {
	settings: Settings,
	adapters: Vec<Arc<dyn Transport>>,
	launcher: Arc<dyn RemoteLauncher>,
	batches: Mutex<HashMap<SessionId, Batch>>,
	updates: Handlers<ItemUpdate>,
	completions: Handlers<BatchReport>,
}

struct Batch {
	items: IndexMap<String, ItemResult>,
	pending: usize,
	handle: Option<Arc<dyn RemoteHandle>>,
	subscriptions: Vec<Subscription>,
}

impl ValidationOrchestrator {
	/// Orchestrator listening on the push transports of `ctx`.
	pub fn new(ctx: &PickerContext) -> Self {
		Self::with_adapters(ctx, ctx.transports.validation_adapters())
	}

	pub fn with_adapters(ctx: &PickerContext, adapters: Vec<Arc<dyn Transport>>) -> Self {
		let config = &ctx.config;
		Self {
			shared: Arc::new(Shared {
				settings: Settings {
					namespace: config.namespace.clone(),
					timeout: config.validation_timeout(),
					monitor_interval: config.monitor_interval(),
					close_grace: config.close_grace(),
					auto_close: config.auto_close,
					close_on_timeout: config.close_on_timeout,
					relay_url: ctx.relay_url.clone(),
				},
				adapters,
				launcher: ctx.launcher.clone(),
				batches: Mutex::new(HashMap::new()),
				updates: Handlers::new(),
				completions: Handlers::new(),
			}),
		}
	}

	/// Validates `items` in one remote context under a fresh session id.
	pub fn run_batch(&self, entry_url: &str, items: Vec<ValidationItem>) -> Result<SessionId> {
		let id = SessionId::new();
		self.start_batch(id.clone(), entry_url, items)?;
		Ok(id)
	}

	/// Validates a single selector in its own remote context.
	pub fn run_single(&self, entry_url: &str, item_id: &str, selector: Option<&str>) -> Result<SessionId> {
		self.run_batch(entry_url, vec![ValidationItem::new(item_id, selector.map(str::to_string))])
	}

	/// Starts a batch under a caller-chosen id.
	///
	/// Items without a selector are classified [`ItemStatus::NoSelector`] and never sent.
	/// When nothing is left to send, the batch completes immediately without opening a
	/// remote context. A launch failure completes the batch with every pending item set
	/// to [`ItemStatus::Error`] and is also returned.
	pub fn start_batch(&self, id: SessionId, entry_url: &str, items: Vec<ValidationItem>) -> Result<()> {
		let shared = &self.shared;
		let mut results: IndexMap<String, ItemResult> = IndexMap::with_capacity(items.len());
		let mut request_items = Vec::new();
		for item in items {
			if results.contains_key(&item.item_id) {
				debug!(target = "pickwire.validation", item_id = %item.item_id, "duplicate item id skipped");
				continue;
			}
			let status = match item.selector() {
				Some(selector) => {
					request_items.push(ValidationItem::new(item.item_id.clone(), Some(selector.to_string())));
					ItemStatus::Pending
				}
				None => ItemStatus::NoSelector,
			};
			results.insert(item.item_id.clone(), ItemResult::new(item.item_id, status));
		}

		let pending = request_items.len();
		let batch = Batch {
			items: results,
			pending,
			handle: None,
			subscriptions: Vec::new(),
		};
		if pending == 0 {
			debug!(target = "pickwire.validation", session_id = %id, "nothing to validate");
			shared.completions.emit(&batch.into_report(id, BatchEnd::Empty, None));
			return Ok(());
		}

		let request = ValidationRequest {
			session_id: id.to_string(),
			items: request_items,
		};
		let params = EntryParams::new(EntryMode::Validate { request }).with_relay_url(shared.settings.relay_url.clone());
		let url = augment_entry_url(entry_url, &shared.settings.namespace, &params).map_err(|source| {
			Error::InvalidEntryUrl {
				url: entry_url.to_string(),
				source,
			}
		})?;

		shared.batches.lock().insert(id.clone(), batch);

		let handle = match shared.launcher.launch(&url) {
			Ok(handle) => handle,
			Err(err) => {
				warn!(target = "pickwire.validation", session_id = %id, error = %err, "failed to open remote context");
				shared.finish(&id, BatchEnd::LaunchFailed, Some(err.to_string()));
				return Err(err);
			}
		};
		info!(target = "pickwire.validation", session_id = %id, items = pending, "validation batch dispatched");

		let mut subscriptions = Vec::with_capacity(shared.adapters.len() + 2);
		let sink = Shared::inbound_sink(shared, &id);
		for adapter in &shared.adapters {
			if adapter.is_available() {
				subscriptions.push(adapter.start(&id, sink.clone()));
			}
		}
		let weak = Arc::downgrade(shared);
		let timer_id = id.clone();
		let timeout = shared.settings.timeout;
		subscriptions.push(Subscription::from_task(tokio::spawn(async move {
			tokio::time::sleep(timeout).await;
			if let Some(shared) = weak.upgrade() {
				let message = Error::Timeout {
					ms: timeout.as_millis() as u64,
				}
				.to_string();
				shared.finish(&timer_id, BatchEnd::TimedOut, Some(message));
			}
		})));
		let weak = Arc::downgrade(shared);
		let monitor_id = id.clone();
		subscriptions.push(spawn_monitor(
			handle.clone(),
			shared.settings.monitor_interval,
			shared.settings.close_grace,
			move || {
				if let Some(shared) = weak.upgrade() {
					shared.finish(&monitor_id, BatchEnd::RemoteClosed, None);
				}
			},
		));

		let orphaned = {
			let mut batches = shared.batches.lock();
			match batches.get_mut(&id) {
				Some(batch) => {
					batch.handle = Some(handle);
					batch.subscriptions.extend(subscriptions);
					None
				}
				None => Some((handle, subscriptions)),
			}
		};
		if let Some((handle, subscriptions)) = orphaned {
			for subscription in subscriptions {
				subscription.stop();
			}
			if shared.settings.auto_close {
				handle.close();
			}
		}
		Ok(())
	}

	/// Finishes a running batch early; pending items become [`ItemStatus::Error`].
	/// Returns false if the batch already completed.
	pub fn cancel(&self, id: &SessionId) -> bool {
		self.shared.finish(id, BatchEnd::Cancelled, None)
	}

	/// Registers a callback for individual item results.
	pub fn on_outcome<F>(&self, callback: F) -> HandlerGuard
	where
		F: Fn(&ItemUpdate) + Send + Sync + 'static,
	{
		self.shared.updates.register(callback)
	}

	/// Registers a callback fired once per batch with its final snapshot.
	pub fn on_complete<F>(&self, callback: F) -> HandlerGuard
	where
		F: Fn(&BatchReport) + Send + Sync + 'static,
	{
		self.shared.completions.register(callback)
	}

	pub fn is_running(&self, id: &SessionId) -> bool {
		self.shared.batches.lock().contains_key(id)
	}

	pub fn running_batches(&self) -> usize {
		self.shared.batches.lock().len()
	}

	/// Current statuses of a running batch, in request order.
	pub fn snapshot(&self, id: &SessionId) -> Option<Vec<ItemResult>> {
		self.shared
			.batches
			.lock()
			.get(id)
			.map(|batch| batch.items.values().cloned().collect())
	}
}

impl fmt::Debug for ValidationOrchestrator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ValidationOrchestrator")
			.field("namespace", &self.shared.settings.namespace)
			.field("running", &self.running_batches())
			.finish()
	}
}

impl Batch {
	fn into_report(self, session_id: SessionId, end: BatchEnd, error: Option<String>) -> BatchReport {
		let items = self
			.items
			.into_values()
			.map(|mut item| {
				if item.status == ItemStatus::Pending {
					item.status = ItemStatus::Error;
				}
				item
			})
			.collect();
		BatchReport {
			session_id,
			items,
			end,
			error,
		}
	}
}

impl Shared {
	fn inbound_sink(shared: &Arc<Self>, id: &SessionId) -> InboundSink {
		let weak = Arc::downgrade(shared);
		let id = id.clone();
		Arc::new(move |kind: TransportKind, envelope: Envelope| {
			if let Some(shared) = weak.upgrade() {
				shared.deliver(&id, kind, envelope);
			}
		})
	}

	fn deliver(&self, id: &SessionId, kind: TransportKind, envelope: Envelope) {
		match envelope.kind {
			MessageKind::ValidationResult => match envelope.decode::<ValidationOutcome>() {
				Ok(outcome) => self.record(id, kind, outcome),
				Err(err) => debug!(target = "pickwire.validation", transport = %kind, error = %err, "malformed outcome"),
			},
			MessageKind::ValidationComplete => {
				self.finish(id, BatchEnd::CompleteMessage, None);
			}
			MessageKind::ElementSelection => {
				trace!(target = "pickwire.validation", transport = %kind, "ignoring selection envelope");
			}
		}
	}

	fn record(&self, id: &SessionId, kind: TransportKind, outcome: ValidationOutcome) {
		let (update, drained) = {
			let mut batches = self.batches.lock();
			let Some(batch) = batches.get_mut(id) else {
				return;
			};
			let Some(item) = batch.items.get_mut(&outcome.item_id) else {
				debug!(target = "pickwire.validation", session_id = %id, item_id = %outcome.item_id, "outcome for unknown item");
				return;
			};
			if item.status != ItemStatus::Pending {
				trace!(target = "pickwire.validation", session_id = %id, item_id = %outcome.item_id, transport = %kind, "repeated outcome ignored");
				return;
			}
			item.status = if outcome.found {
				ItemStatus::Found
			} else {
				ItemStatus::NotFound
			};
			item.tested_at_url = outcome.tested_at_url;
			let update = ItemUpdate {
				session_id: id.clone(),
				item: item.clone(),
			};
			batch.pending -= 1;
			(update, batch.pending == 0)
		};

		debug!(
			target = "pickwire.validation",
			session_id = %id,
			item_id = %update.item.item_id,
			status = %update.item.status,
			transport = %kind,
			"item validated"
		);
		self.updates.emit(&update);
		if drained {
			self.finish(id, BatchEnd::AllReported, None);
		}
	}

	/// Removes the batch and reports it. Returns false if it was already gone.
	fn finish(&self, id: &SessionId, end: BatchEnd, error: Option<String>) -> bool {
		let Some(mut batch) = self.batches.lock().remove(id) else {
			return false;
		};

		for subscription in batch.subscriptions.drain(..) {
			subscription.stop();
		}
		if let Some(handle) = batch.handle.take() {
			let close = match end {
				BatchEnd::AllReported | BatchEnd::CompleteMessage => self.settings.auto_close,
				BatchEnd::TimedOut => self.settings.close_on_timeout,
				BatchEnd::Cancelled => true,
				BatchEnd::Empty | BatchEnd::RemoteClosed | BatchEnd::LaunchFailed => false,
			};
			if close && !handle.is_closed() {
				handle.close();
			}
		}

		let report = batch.into_report(id.clone(), end, error);
		info!(
			target = "pickwire.validation",
			session_id = %id,
			end = %end,
			found = report.count(ItemStatus::Found),
			not_found = report.count(ItemStatus::NotFound),
			errors = report.count(ItemStatus::Error),
			"validation batch complete"
		);
		self.completions.emit(&report);
		true
	}
}
