//! Selection sessions driven end to end over in-memory transports.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pickwire::{
	ElementSelector, ElementTarget, OpenOptions, PickerConfig, PickerContext, SelectionResult, SessionController,
	SessionId, SessionStatus,
};
use pickwire_protocol::{Envelope, MessageKind};
use pickwire_runtime::{
	BroadcastChannel, FakeLauncher, InboundSink, Subscription, Transport, TransportKind, TransportSet,
};
use serde_json::Value;

const ENTRY: &str = "https://shop.example/products";
const STORE_KEY: &str = "pickwire_selected_element";

/// Wraps an adapter and counts how often it is started and torn down.
struct Counting {
	inner: Arc<dyn Transport>,
	starts: Arc<AtomicUsize>,
	stops: Arc<AtomicUsize>,
}

impl Transport for Counting {
	fn kind(&self) -> TransportKind {
		self.inner.kind()
	}

	fn is_available(&self) -> bool {
		self.inner.is_available()
	}

	fn start(&self, session_id: &SessionId, sink: InboundSink) -> Subscription {
		self.starts.fetch_add(1, Ordering::SeqCst);
		let inner = self.inner.start(session_id, sink);
		let stops = self.stops.clone();
		Subscription::from_fn(move || {
			stops.fetch_add(1, Ordering::SeqCst);
			inner.stop();
		})
	}
}

struct Harness {
	launcher: Arc<FakeLauncher>,
	transports: TransportSet,
	ctx: PickerContext,
	starts: Arc<AtomicUsize>,
	stops: Arc<AtomicUsize>,
}

impl Harness {
	fn new(config: PickerConfig) -> Self {
		Self::with_transports(config, TransportSet::new("pickwire"))
	}

	fn with_transports(config: PickerConfig, transports: TransportSet) -> Self {
		let launcher = Arc::new(FakeLauncher::new());
		let ctx = PickerContext::new(config, launcher.clone()).with_transports(transports.clone());
		Self {
			launcher,
			transports,
			ctx,
			starts: Arc::new(AtomicUsize::new(0)),
			stops: Arc::new(AtomicUsize::new(0)),
		}
	}

	fn controller(&self) -> SessionController {
		let adapters = self
			.transports
			.selection_adapters()
			.into_iter()
			.map(|inner| {
				Arc::new(Counting {
					inner,
					starts: self.starts.clone(),
					stops: self.stops.clone(),
				}) as Arc<dyn Transport>
			})
			.collect();
		SessionController::with_adapters(&self.ctx, adapters)
	}

	fn post_direct(&self, result: &SelectionResult) {
		self.transports.direct().post(envelope(result));
	}

	fn publish_broadcast(&self, result: &SelectionResult) {
		assert!(self.transports.broadcast().publish(envelope(result)));
	}

	fn write_store(&self, result: &SelectionResult) {
		let store = self.transports.store().expect("store configured");
		store.set(STORE_KEY, &serde_json::to_string(result).unwrap()).unwrap();
	}

	fn starts(&self) -> usize {
		self.starts.load(Ordering::SeqCst)
	}

	fn stops(&self) -> usize {
		self.stops.load(Ordering::SeqCst)
	}
}

fn config() -> PickerConfig {
	PickerConfig::default().with_target_domain("shop.example")
}

fn pick(session_id: &SessionId, selector: &str) -> SelectionResult {
	SelectionResult {
		session_id: session_id.to_string(),
		selector: selector.to_string(),
		display_name: Some("Add to cart".to_string()),
		is_fragile: false,
		page_url: Some("https://shop.example/products".to_string()),
		tag_name: Some("button".to_string()),
		attributes: None,
		cancelled: false,
	}
}

fn envelope(result: &SelectionResult) -> Value {
	Envelope::new(MessageKind::ElementSelection, result)
		.unwrap()
		.to_value("pickwire")
}

type Collected<T> = Arc<Mutex<Vec<T>>>;

fn collect_results(controller: &SessionController) -> (Collected<ElementTarget>, pickwire::HandlerGuard) {
	let results: Collected<ElementTarget> = Arc::new(Mutex::new(Vec::new()));
	let r = results.clone();
	let guard = controller.on_result(move |target| r.lock().push(target.clone()));
	(results, guard)
}

fn collect_errors(controller: &SessionController) -> (Collected<String>, pickwire::HandlerGuard) {
	let errors: Collected<String> = Arc::new(Mutex::new(Vec::new()));
	let e = errors.clone();
	let guard = controller.on_error(move |message| e.lock().push(message.to_string()));
	(errors, guard)
}

async fn settle(ms: u64) {
	tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_deliveries_on_every_transport_resolve_once() {
	let h = Harness::new(config());
	let controller = h.controller();
	let (results, _r) = collect_results(&controller);
	let (errors, _e) = collect_errors(&controller);

	let id = controller.open(ENTRY, OpenOptions::default()).unwrap();
	assert_eq!(controller.status(), SessionStatus::AwaitingResponse);
	assert_eq!(h.starts(), 3);

	let result = pick(&id, "#add-to-cart");
	h.post_direct(&result);
	h.post_direct(&result);
	h.publish_broadcast(&result);
	h.write_store(&result);
	settle(1_000).await;

	assert_eq!(results.lock().len(), 1);
	assert_eq!(results.lock()[0].selector, "#add-to-cart");
	assert!(errors.lock().is_empty());
	assert_eq!(controller.status(), SessionStatus::Resolved);
	assert_eq!(h.stops(), 3, "all adapters torn down");
	assert_eq!(controller.active_tasks(), 0);

	settle(60_000).await;
	assert_eq!(controller.status(), SessionStatus::Resolved, "timer was cancelled");
	assert!(errors.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn foreign_session_never_triggers_callbacks() {
	let h = Harness::new(config());
	let controller = h.controller();
	let (results, _r) = collect_results(&controller);
	let (errors, _e) = collect_errors(&controller);

	controller.open(ENTRY, OpenOptions::default()).unwrap();
	let foreign = pick(&SessionId::from("someone-else"), "#nope");
	h.post_direct(&foreign);
	h.publish_broadcast(&foreign);
	h.write_store(&foreign);
	settle(2_000).await;

	assert!(results.lock().is_empty());
	assert!(errors.lock().is_empty());
	assert_eq!(controller.status(), SessionStatus::AwaitingResponse);
	let store = h.transports.store().unwrap();
	assert!(store.get(STORE_KEY).unwrap().is_some(), "foreign entry left in place");
}

#[tokio::test(start_paused = true)]
async fn new_session_invalidates_previous_id() {
	let h = Harness::new(config());
	let controller = h.controller();
	let (results, _r) = collect_results(&controller);

	let old = controller.open(ENTRY, OpenOptions::default()).unwrap();
	let first_handle = h.launcher.last().unwrap();
	let new = controller.open(ENTRY, OpenOptions::default()).unwrap();
	assert_ne!(old, new);
	assert_eq!(h.stops(), 3, "old adapters stopped on supersede");
	assert_eq!(first_handle.close_calls(), 1);

	let late = pick(&old, "#old");
	h.post_direct(&late);
	h.publish_broadcast(&late);
	h.write_store(&late);
	settle(1_000).await;
	assert!(results.lock().is_empty());
	assert_eq!(controller.session_id(), Some(new.clone()));
	assert_eq!(controller.status(), SessionStatus::AwaitingResponse);

	h.publish_broadcast(&pick(&new, "#new"));
	settle(10).await;
	assert_eq!(results.lock().len(), 1);
	assert_eq!(results.lock()[0].selector, "#new");
}

#[tokio::test(start_paused = true)]
async fn cancel_twice_tears_down_once() {
	let h = Harness::new(config());
	let controller = h.controller();
	let statuses: Collected<SessionStatus> = Arc::new(Mutex::new(Vec::new()));
	let s = statuses.clone();
	let _s = controller.on_status(move |status| s.lock().push(status));

	let id = controller.open(ENTRY, OpenOptions::default()).unwrap();
	assert!(controller.cancel());
	assert_eq!(h.stops(), 3);
	assert!(!controller.cancel());
	assert_eq!(h.stops(), 3);

	assert_eq!(controller.status(), SessionStatus::Cancelled);
	assert!(controller.error().is_none());
	assert_eq!(h.launcher.last().unwrap().close_calls(), 1);
	assert_eq!(*statuses.lock(), vec![SessionStatus::AwaitingResponse, SessionStatus::Cancelled]);

	h.post_direct(&pick(&id, "#late"));
	settle(100).await;
	assert_eq!(controller.status(), SessionStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn remote_cancellation_via_broadcast_leaves_selection_unset() {
	let h = Harness::new(config());
	let selector = ElementSelector::with_controller(h.ctx.config.clone(), h.controller());

	let id = selector.open_selector().unwrap();
	assert!(selector.is_selecting());

	let mut cancelled = pick(&id, "");
	cancelled.cancelled = true;
	h.publish_broadcast(&cancelled);
	settle(10).await;

	assert_eq!(selector.controller().status(), SessionStatus::Cancelled);
	assert!(selector.selected_element().is_none());
	assert!(selector.error().is_none());
	assert!(!selector.is_selecting());
}

#[tokio::test(start_paused = true)]
async fn store_delivery_wins_over_later_direct_duplicate() {
	let h = Harness::new(config());
	let controller = h.controller();
	let (results, _r) = collect_results(&controller);

	let id = controller.open(ENTRY, OpenOptions::default()).unwrap();
	settle(10).await;

	let result = pick(&id, "main .hero > h1");
	h.write_store(&result);
	settle(500).await;
	assert_eq!(results.lock().len(), 1, "poller tick delivered");

	settle(10).await;
	h.post_direct(&result);
	settle(10).await;

	let results = results.lock();
	assert_eq!(results.len(), 1);
	assert_eq!(results[0].selector, "main .hero > h1");
	assert!(h.transports.store().unwrap().get(STORE_KEY).unwrap().is_none(), "entry consumed");
}

#[tokio::test(start_paused = true)]
async fn blocked_launch_errors_without_starting_anything() {
	let h = Harness::new(config());
	h.launcher.set_blocked(true);
	let controller = h.controller();
	let (errors, _e) = collect_errors(&controller);

	let err = controller.open(ENTRY, OpenOptions::default()).unwrap_err();
	assert!(err.is_retryable());
	assert_eq!(controller.status(), SessionStatus::Error);
	assert!(controller.error().unwrap().contains("Allow pop-ups"));
	assert_eq!(h.starts(), 0);
	assert_eq!(controller.active_tasks(), 0);

	settle(120_000).await;
	assert_eq!(errors.lock().len(), 1, "no timer fired");
	assert_eq!(controller.status(), SessionStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn timeout_leaves_remote_context_open() {
	let h = Harness::new(config());
	let controller = h.controller();
	let (errors, _e) = collect_errors(&controller);

	let id = controller.open(ENTRY, OpenOptions { auto_close: true }).unwrap();
	settle(29_000).await;
	assert_eq!(controller.status(), SessionStatus::AwaitingResponse);

	settle(1_500).await;
	assert_eq!(controller.status(), SessionStatus::TimedOut);
	assert_eq!(errors.lock().len(), 1);
	assert!(errors.lock()[0].contains("30000ms"));
	assert_eq!(h.stops(), 3);
	assert_eq!(h.launcher.last().unwrap().close_calls(), 0);

	h.post_direct(&pick(&id, "#too-late"));
	settle(10).await;
	assert_eq!(controller.status(), SessionStatus::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn close_on_timeout_closes_remote_context() {
	let mut cfg = config();
	cfg.close_on_timeout = true;
	cfg.selection_timeout_ms = 5_000;
	let h = Harness::new(cfg);
	let controller = h.controller();

	controller.open(ENTRY, OpenOptions::default()).unwrap();
	settle(5_100).await;

	assert_eq!(controller.status(), SessionStatus::TimedOut);
	assert_eq!(h.launcher.last().unwrap().close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn delivery_inside_grace_window_still_resolves() {
	let h = Harness::new(config());
	let controller = h.controller();
	let (results, _r) = collect_results(&controller);

	let id = controller.open(ENTRY, OpenOptions::default()).unwrap();
	h.launcher.last().unwrap().close_by_user();
	settle(300).await;
	assert_eq!(controller.status(), SessionStatus::AwaitingResponse);

	h.write_store(&pick(&id, "#racing"));
	settle(400).await;

	assert_eq!(controller.status(), SessionStatus::Resolved);
	assert_eq!(results.lock()[0].selector, "#racing");
}

#[tokio::test(start_paused = true)]
async fn closed_remote_context_cancels_after_grace() {
	let h = Harness::new(config());
	let controller = h.controller();
	let (errors, _e) = collect_errors(&controller);

	controller.open(ENTRY, OpenOptions::default()).unwrap();
	h.launcher.last().unwrap().close_by_user();
	settle(2_000).await;

	assert_eq!(controller.status(), SessionStatus::Cancelled);
	assert!(errors.lock().is_empty());
	assert_eq!(h.stops(), 3);
}

#[tokio::test(start_paused = true)]
async fn auto_close_closes_after_resolution() {
	let h = Harness::new(config());
	let controller = h.controller();

	let id = controller.open(ENTRY, OpenOptions { auto_close: true }).unwrap();
	let handle = h.launcher.last().unwrap();
	let fragment = handle.url().fragment().unwrap().to_string();
	assert!(fragment.contains("pickwire_mode=true"));
	assert!(fragment.contains(&format!("pickwire_session={id}")));
	assert!(fragment.contains("pickwire_auto_close=true"));
	assert!(handle.url().query().is_none());

	h.post_direct(&pick(&id, "#ok"));
	settle(10).await;

	assert_eq!(controller.status(), SessionStatus::Resolved);
	assert_eq!(handle.close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn unavailable_broadcast_is_skipped() {
	let transports = TransportSet::new("pickwire").with_broadcast(BroadcastChannel::unavailable("pickwire"));
	let h = Harness::with_transports(config(), transports);
	let controller = h.controller();
	let (results, _r) = collect_results(&controller);

	let id = controller.open(ENTRY, OpenOptions::default()).unwrap();
	assert_eq!(h.starts(), 2);

	h.post_direct(&pick(&id, "#direct"));
	settle(10).await;
	assert_eq!(results.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_store_still_resolves_over_direct() {
	let transports = TransportSet::new("pickwire").with_store(None);
	let h = Harness::with_transports(config(), transports);
	let controller = h.controller();
	let (results, _r) = collect_results(&controller);

	let id = controller.open(ENTRY, OpenOptions::default()).unwrap();
	assert_eq!(h.starts(), 2);
	h.post_direct(&pick(&id, "#direct"));
	settle(10).await;
	assert_eq!(results.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn selector_without_domain_reports_configuration_error() {
	let h = Harness::new(PickerConfig::default());
	let selector = ElementSelector::with_controller(h.ctx.config.clone(), h.controller());

	let err = selector.open_selector().unwrap_err();
	assert!(matches!(err, pickwire::Error::NotConfigured));
	assert!(selector.error().unwrap().contains("settings"));
	assert!(!selector.is_selecting());
	assert_eq!(h.launcher.launch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn selector_publishes_selection_and_clears() {
	let h = Harness::new(config());
	let selector = ElementSelector::with_controller(h.ctx.config.clone(), h.controller());
	let mut watch = selector.watch_selected_element();

	let id = selector.open_selector().unwrap();
	h.post_direct(&pick(&id, "#picked"));
	watch.changed().await.unwrap();

	assert_eq!(selector.selected_element().unwrap().selector, "#picked");
	assert!(!selector.is_selecting());

	selector.clear_selection();
	assert!(selector.selected_element().is_none());
}

#[tokio::test(start_paused = true)]
async fn snapshot_reports_session_state() {
	let h = Harness::new(config());
	let controller = h.controller();
	assert!(controller.snapshot().is_none());

	let id = controller.open(ENTRY, OpenOptions::default()).unwrap();
	let snapshot = controller.snapshot().unwrap();
	assert_eq!(snapshot.id(), &id);
	assert_eq!(snapshot.status(), SessionStatus::AwaitingResponse);
	assert!(snapshot.error().is_none());
	assert_eq!(*controller.subscribe_status().borrow(), SessionStatus::AwaitingResponse);
}
