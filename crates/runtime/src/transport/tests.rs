use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pickwire_protocol::{Envelope, MessageKind};
use serde_json::{Value, json};

use super::*;
use crate::token::SessionId;

type Received = Arc<Mutex<Vec<(TransportKind, Envelope)>>>;

fn collector() -> (InboundSink, Received) {
	let received: Received = Arc::new(Mutex::new(Vec::new()));
	let sink_received = received.clone();
	let sink: InboundSink = Arc::new(move |kind: TransportKind, envelope: Envelope| sink_received.lock().push((kind, envelope)));
	(sink, received)
}

fn selection(session_id: &str, selector: &str) -> Value {
	json!({
		"type": "pickwire_element_selection",
		"payload": { "sessionId": session_id, "selector": selector, "isFragile": false, "cancelled": false }
	})
}

async fn settle() {
	tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_direct_listener_delivers_matching_session() {
	let channel = DirectChannel::new();
	let listener = channel.listener("pickwire");
	let session = SessionId::from("live");
	let (sink, received) = collector();

	let _sub = listener.start(&session, sink);

	channel.post(json!({ "source": "react-devtools-bridge", "payload": 1 }));
	channel.post(json!("plain string"));
	channel.post(selection("stale", "#old"));
	channel.post(selection("live", "#new"));
	assert!(!channel.post_text("{not json"));
	settle().await;

	let received = received.lock();
	assert_eq!(received.len(), 1);
	assert_eq!(received[0].0, TransportKind::Direct);
	assert_eq!(received[0].1.payload["selector"], "#new");
}

#[tokio::test(start_paused = true)]
async fn test_stopped_listener_receives_nothing() {
	let channel = DirectChannel::new();
	let session = SessionId::from("s");
	let (sink, received) = collector();

	let sub = channel.listener("pickwire").start(&session, sink);
	sub.stop();
	settle().await;

	channel.post(selection("s", "#x"));
	settle().await;

	assert!(received.lock().is_empty());
	assert_eq!(channel.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_listener_filters_namespace() {
	let channel = BroadcastChannel::new("pickwire");
	let session = SessionId::from("s");
	let (sink, received) = collector();

	let _sub = channel.listener("pickwire").start(&session, sink);
	assert!(channel.publish(json!({
		"type": "other_element_selection",
		"payload": { "sessionId": "s" }
	})));
	assert!(channel.publish(Envelope::validation_complete("s").to_value("pickwire")));
	settle().await;

	let received = received.lock();
	assert_eq!(received.len(), 1);
	assert_eq!(received[0].0, TransportKind::Broadcast);
	assert_eq!(received[0].1.kind, MessageKind::ValidationComplete);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_broadcast_never_fires() {
	let channel = BroadcastChannel::unavailable("pickwire");
	let listener = channel.listener("pickwire");
	let (sink, received) = collector();

	assert!(!listener.is_available());
	let sub = listener.start(&SessionId::from("s"), sink);
	assert!(!sub.is_active());
	assert!(!channel.publish(selection("s", "#x")));
	settle().await;

	assert!(received.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_store_poller_consumes_matching_entry_once() {
	let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
	let poller = StorePoller::new(Some(store.clone()), "pickwire", Duration::from_millis(500));
	let (sink, received) = collector();
	let _sub = poller.start(&SessionId::from("live"), sink);

	let entry = json!({ "sessionId": "live", "selector": ".hero", "isFragile": true, "cancelled": false });
	store.set("pickwire_selected_element", &entry.to_string()).unwrap();

	tokio::time::sleep(Duration::from_millis(600)).await;
	assert_eq!(received.lock().len(), 1);
	assert!(store.get("pickwire_selected_element").unwrap().is_none());

	tokio::time::sleep(Duration::from_millis(2_000)).await;
	assert_eq!(received.lock().len(), 1);

	let received = received.lock();
	assert_eq!(received[0].0, TransportKind::SharedStore);
	assert_eq!(received[0].1.kind, MessageKind::ElementSelection);
	assert_eq!(received[0].1.payload["selector"], ".hero");
}

#[tokio::test(start_paused = true)]
async fn test_store_poller_leaves_other_sessions_entries() {
	let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
	let poller = StorePoller::new(Some(store.clone()), "pickwire", Duration::from_millis(500));
	let (sink, received) = collector();
	let _sub = poller.start(&SessionId::from("live"), sink);

	let foreign = json!({ "sessionId": "someone-else", "selector": "#a" }).to_string();
	store.set("pickwire_selected_element", &foreign).unwrap();
	tokio::time::sleep(Duration::from_millis(1_600)).await;

	assert!(received.lock().is_empty());
	assert_eq!(store.get("pickwire_selected_element").unwrap(), Some(foreign));
}

#[tokio::test(start_paused = true)]
async fn test_store_poller_without_store_is_inert() {
	let poller = StorePoller::new(None, "pickwire", DEFAULT_POLL_INTERVAL);
	let (sink, _received) = collector();

	assert!(!poller.is_available());
	assert!(!poller.start(&SessionId::from("s"), sink).is_active());
}

#[test]
fn test_subscription_stop_runs_once() {
	let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
	let c = count.clone();
	let sub = Subscription::from_fn(move || {
		c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
	});
	sub.stop();
	assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);

	let c = count.clone();
	drop(Subscription::from_fn(move || {
		c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
	}));
	assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[test]
fn test_memory_store_take_if_respects_predicate() {
	let store = MemoryStore::new();
	store.set("k", "v1").unwrap();

	assert_eq!(store.take_if("k", &|v| v == "other").unwrap(), None);
	assert_eq!(store.take_if("k", &|v| v == "v1").unwrap(), Some("v1".into()));
	assert_eq!(store.take_if("k", &|_| true).unwrap(), None);
}

#[test]
fn test_file_store_roundtrip_and_consume() {
	let dir = tempfile::tempdir().unwrap();
	let store = FileStore::open(dir.path().join("store")).unwrap();

	assert_eq!(store.get("pickwire_selected_element").unwrap(), None);
	store.set("pickwire_selected_element", r#"{"sessionId":"a"}"#).unwrap();
	assert!(store.dir().join("pickwire_selected_element.json").exists());

	let taken = store.take_if("pickwire_selected_element", &|_| true).unwrap();
	assert_eq!(taken.as_deref(), Some(r#"{"sessionId":"a"}"#));
	assert_eq!(store.get("pickwire_selected_element").unwrap(), None);
	store.remove("pickwire_selected_element").unwrap();
}

#[test]
fn test_file_store_sanitizes_keys() {
	let dir = tempfile::tempdir().unwrap();
	let store = FileStore::open(dir.path()).unwrap();

	store.set("../escape", "x").unwrap();
	assert!(dir.path().join("___escape.json").exists());
	assert_eq!(store.get("../escape").unwrap().as_deref(), Some("x"));
}

#[test]
fn test_transport_set_builds_adapters() {
	let set = TransportSet::new("pickwire").with_broadcast(BroadcastChannel::unavailable("pickwire"));

	let selection = set.selection_adapters();
	let kinds: Vec<_> = selection.iter().map(|t| t.kind()).collect();
	assert_eq!(kinds, vec![TransportKind::Direct, TransportKind::Broadcast, TransportKind::SharedStore]);
	assert!(!selection[1].is_available());

	let validation = set.validation_adapters();
	assert_eq!(validation.len(), 2);
	assert_eq!(set.namespace(), "pickwire");
}
