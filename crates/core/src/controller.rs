//! Session controller: one outstanding selection request at a time.
//!
//! The controller owns the live [`Session`], the remote context handle and every
//! subscription (adapters, timeout, lifecycle monitor) started for it. All three
//! adapters feed one inbound sink; the sink routes every delivery through
//! [`Session::transition`] under the controller's lock, so the first matching
//! delivery wins and everything after it is ignored.
//!
//! Callbacks run after the lock is released and may call back into the controller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pickwire_protocol::{ElementTarget, EntryMode, EntryParams, Envelope, MessageKind, SelectionResult, augment_entry_url};
use pickwire_runtime::{
	Error, InboundSink, RemoteHandle, RemoteLauncher, Result, SessionId, Subscription, Transport, TransportKind,
};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::context::PickerContext;
use crate::handlers::{HandlerGuard, Handlers};
use crate::monitor::spawn_monitor;
use crate::session::{Session, SessionEvent, SessionStatus, Transition};

/// Options for [`SessionController::open`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
	/// Ask the remote context to close after a pick, and close it ourselves on
	/// resolution.
	pub auto_close: bool,
}

/// Owns the lifecycle of one selection request.
///
/// Cheap to clone; clones share the same live session.
#[derive(Clone)]
pub struct SessionController {
	shared: Arc<Shared>,
}

struct Settings {
	namespace: String,
	timeout: Duration,
	monitor_interval: Duration,
	close_grace: Duration,
	close_on_timeout: bool,
	relay_url: Option<String>,
}

struct Shared {
	settings: Settings,
	adapters: Vec<Arc<dyn Transport>>,
	launcher: Arc<dyn RemoteLauncher>,
	state: Mutex<State>,
	results: Handlers<ElementTarget>,
	errors: Handlers<String>,
	statuses: Handlers<SessionStatus>,
	status_tx: watch::Sender<SessionStatus>,
}

#[derive(Default)]
struct State {
	session: Option<Session>,
	live: Option<Live>,
}

/// Resources held for the live session while it awaits a response.
struct Live {
	auto_close: bool,
	handle: Arc<dyn RemoteHandle>,
	subscriptions: Vec<Subscription>,
}

impl Live {
	fn release(self, close: bool) {
		for subscription in self.subscriptions {
			subscription.stop();
		}
		if close && !self.handle.is_closed() {
			self.handle.close();
		}
	}
}

impl SessionController {
	/// Controller listening on all three selection transports of `ctx`.
	pub fn new(ctx: &PickerContext) -> Self {
		Self::with_adapters(ctx, ctx.transports.selection_adapters())
	}

	/// Controller listening on a caller-supplied adapter set.
	pub fn with_adapters(ctx: &PickerContext, adapters: Vec<Arc<dyn Transport>>) -> Self {
		let config = &ctx.config;
		let (status_tx, _) = watch::channel(SessionStatus::Idle);
		Self {
			shared: Arc::new(Shared {
				settings: Settings {
					namespace: config.namespace.clone(),
					timeout: config.selection_timeout(),
					monitor_interval: config.monitor_interval(),
					close_grace: config.close_grace(),
					close_on_timeout: config.close_on_timeout,
					relay_url: ctx.relay_url.clone(),
				},
				adapters,
				launcher: ctx.launcher.clone(),
				state: Mutex::new(State::default()),
				results: Handlers::new(),
				errors: Handlers::new(),
				statuses: Handlers::new(),
				status_tx,
			}),
		}
	}

	/// Starts a new session, superseding any live one, and launches the remote context
	/// on `entry_url` with the session parameters in its fragment.
	///
	/// A launch failure moves the new session to [`SessionStatus::Error`], fires the
	/// error callbacks and is also returned. No adapter or timer is started in that case.
	pub fn open(&self, entry_url: &str, options: OpenOptions) -> Result<SessionId> {
		let shared = &self.shared;
		let id = SessionId::new();
		let params = EntryParams::new(EntryMode::Select {
			session_id: id.to_string(),
			auto_close: options.auto_close,
		})
		.with_relay_url(shared.settings.relay_url.clone());
		let url = augment_entry_url(entry_url, &shared.settings.namespace, &params).map_err(|source| {
			Error::InvalidEntryUrl {
				url: entry_url.to_string(),
				source,
			}
		})?;

		let superseded = {
			let mut state = shared.state.lock();
			if let Some(mut previous) = state.session.replace(Session::new(id.clone())) {
				if previous.transition(SessionEvent::Superseded).is_terminal() {
					debug!(target = "pickwire.session", session_id = %previous.id(), "session superseded");
				}
			}
			state.live.take()
		};
		if let Some(live) = superseded {
			live.release(true);
		}

		let handle = match shared.launcher.launch(&url) {
			Ok(handle) => handle,
			Err(err) => {
				warn!(target = "pickwire.session", session_id = %id, error = %err, "failed to open remote context");
				shared.apply(&id, SessionEvent::LaunchFailed(err.to_string()));
				return Err(err);
			}
		};

		let launched = {
			let mut state = shared.state.lock();
			let transition = match state.session.as_mut() {
				Some(session) if session.id() == &id => session.transition(SessionEvent::Launched),
				_ => Transition::Ignored,
			};
			if transition == Transition::Awaiting {
				state.live = Some(Live {
					auto_close: options.auto_close,
					handle: handle.clone(),
					subscriptions: Vec::new(),
				});
				true
			} else {
				false
			}
		};
		if !launched {
			debug!(target = "pickwire.session", session_id = %id, "session replaced during launch");
			handle.close();
			return Ok(id);
		}
		info!(target = "pickwire.session", session_id = %id, url = %url, "remote context opened");
		shared.publish_status(SessionStatus::AwaitingResponse);

		let mut subscriptions = Vec::with_capacity(shared.adapters.len() + 2);
		let sink = Shared::inbound_sink(shared, &id);
		for adapter in &shared.adapters {
			if !adapter.is_available() {
				debug!(target = "pickwire.session", transport = %adapter.kind(), "transport unavailable; skipped");
				continue;
			}
			subscriptions.push(adapter.start(&id, sink.clone()));
		}
		subscriptions.push(Shared::spawn_timer(shared, &id));
		let weak = Arc::downgrade(shared);
		let monitor_id = id.clone();
		subscriptions.push(spawn_monitor(
			handle,
			shared.settings.monitor_interval,
			shared.settings.close_grace,
			move || {
				if let Some(shared) = weak.upgrade() {
					shared.apply(&monitor_id, SessionEvent::RemoteClosed);
				}
			},
		));
		shared.attach(&id, subscriptions);

		Ok(id)
	}

	/// Stops waiting for the live session. Returns false (and does nothing) unless a
	/// session was awaiting a response.
	pub fn cancel(&self) -> bool {
		let Some(id) = self.session_id() else {
			return false;
		};
		self.shared.apply(&id, SessionEvent::Cancel)
	}

	/// Registers a callback for resolved selections.
	pub fn on_result<F>(&self, callback: F) -> HandlerGuard
	where
		F: Fn(&ElementTarget) + Send + Sync + 'static,
	{
		self.shared.results.register(callback)
	}

	/// Registers a callback for launch failures and timeouts.
	pub fn on_error<F>(&self, callback: F) -> HandlerGuard
	where
		F: Fn(&str) + Send + Sync + 'static,
	{
		self.shared.errors.register(move |message: &String| callback(message))
	}

	pub fn on_status<F>(&self, callback: F) -> HandlerGuard
	where
		F: Fn(SessionStatus) + Send + Sync + 'static,
	{
		self.shared.statuses.register(move |status: &SessionStatus| callback(*status))
	}

	pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
		self.shared.status_tx.subscribe()
	}

	pub fn status(&self) -> SessionStatus {
		self.shared
			.state
			.lock()
			.session
			.as_ref()
			.map_or(SessionStatus::Idle, Session::status)
	}

	/// Message of the last launch failure or timeout of the current session.
	pub fn error(&self) -> Option<String> {
		self.shared.state.lock().session.as_ref().and_then(|s| s.error().map(str::to_string))
	}

	pub fn session_id(&self) -> Option<SessionId> {
		self.shared.state.lock().session.as_ref().map(|s| s.id().clone())
	}

	/// Copy of the current session.
	pub fn snapshot(&self) -> Option<Session> {
		self.shared.state.lock().session.clone()
	}

	/// Number of adapters, timers and monitors running for the live session.
	pub fn active_tasks(&self) -> usize {
		self.shared.state.lock().live.as_ref().map_or(0, |live| live.subscriptions.len())
	}
}

impl fmt::Debug for SessionController {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionController")
			.field("namespace", &self.shared.settings.namespace)
			.field("session", &self.snapshot())
			.finish()
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

	fn spawn_timer(shared: &Arc<Self>, id: &SessionId) -> Subscription {
		let weak = Arc::downgrade(shared);
		let id = id.clone();
		let timeout = shared.settings.timeout;
		Subscription::from_task(tokio::spawn(async move {
			tokio::time::sleep(timeout).await;
			if let Some(shared) = weak.upgrade() {
				shared.apply(
					&id,
					SessionEvent::TimerElapsed {
						ms: timeout.as_millis() as u64,
					},
				);
			}
		}))
	}

	fn deliver(&self, id: &SessionId, kind: TransportKind, envelope: Envelope) {
		if envelope.kind != MessageKind::ElementSelection {
			trace!(target = "pickwire.session", transport = %kind, "ignoring non-selection envelope");
			return;
		}
		let result: SelectionResult = match envelope.decode() {
			Ok(result) => result,
			Err(err) => {
				debug!(target = "pickwire.session", transport = %kind, error = %err, "malformed selection payload");
				return;
			}
		};
		if self.apply(id, SessionEvent::Delivered(result)) {
			debug!(target = "pickwire.session", session_id = %id, transport = %kind, "delivery accepted");
		} else {
			debug!(target = "pickwire.session", session_id = %id, transport = %kind, "duplicate delivery dropped");
		}
	}

	/// Adds freshly started subscriptions to the live session, or stops them if the
	/// session already finished.
	fn attach(&self, id: &SessionId, subscriptions: Vec<Subscription>) {
		let orphaned = {
			let mut state = self.state.lock();
			let is_live = state.session.as_ref().is_some_and(|s| s.id() == id);
			match state.live.as_mut() {
				Some(live) if is_live => {
					live.subscriptions.extend(subscriptions);
					None
				}
				_ => Some(subscriptions),
			}
		};
		for subscription in orphaned.into_iter().flatten() {
			subscription.stop();
		}
	}

	/// Routes `event` through the session state machine. Returns true if it moved the
	/// session into a terminal state.
	fn apply(&self, id: &SessionId, event: SessionEvent) -> bool {
		let (transition, live) = {
			let mut state = self.state.lock();
			let transition = match state.session.as_mut() {
				Some(session) if session.id() == id => session.transition(event),
				_ => {
					trace!(target = "pickwire.session", session_id = %id, "event for stale session");
					return false;
				}
			};
			if !transition.is_terminal() {
				return false;
			}
			(transition, state.live.take())
		};

		if let Some(live) = live {
			let close = match &transition {
				Transition::Resolved(_) => live.auto_close,
				Transition::Cancelled => true,
				Transition::TimedOut(_) => self.settings.close_on_timeout,
				_ => false,
			};
			live.release(close);
		}

		let status = match &transition {
			Transition::Resolved(_) => SessionStatus::Resolved,
			Transition::Cancelled => SessionStatus::Cancelled,
			Transition::TimedOut(_) => SessionStatus::TimedOut,
			_ => SessionStatus::Error,
		};
		info!(target = "pickwire.session", session_id = %id, status = %status, "session finished");
		self.publish_status(status);

		match transition {
			Transition::Resolved(target) => self.results.emit(&target),
			Transition::TimedOut(message) | Transition::Failed(message) => self.errors.emit(&message),
			_ => {}
		}
		true
	}

	fn publish_status(&self, status: SessionStatus) {
		self.status_tx.send_replace(status);
		self.statuses.emit(&status);
	}
}
