//! Shared key/value store and the fixed-interval poller that reads results from it.
//!
//! The remote context writes its [`SelectionResult`](pickwire_protocol::SelectionResult)
//! as JSON under `<ns>_selected_element`. The poller consumes the entry (read, then
//! delete) only when it carries the live session id, so entries belonging to other
//! builders sharing the store are left alone.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use pickwire_protocol::{Envelope, MessageKind, selected_element_key};
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::{InboundSink, Subscription, Transport, TransportKind};
use crate::error::{Error, Result};
use crate::token::SessionId;

/// Persistent key/value store shared between same-origin contexts.
pub trait SharedStore: Send + Sync {
	fn get(&self, key: &str) -> Result<Option<String>>;

	fn set(&self, key: &str, value: &str) -> Result<()>;

	fn remove(&self, key: &str) -> Result<()>;

	/// Removes and returns the value under `key` if `accept` approves it.
	///
	/// Only one caller can take a given entry.
	fn take_if(&self, key: &str, accept: &dyn Fn(&str) -> bool) -> Result<Option<String>> {
		match self.get(key)? {
			Some(value) if accept(&value) => {
				self.remove(key)?;
				Ok(Some(value))
			}
			_ => Ok(None),
		}
	}
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: DashMap<String, String>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

impl SharedStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>> {
		Ok(self.entries.get(key).map(|v| v.value().clone()))
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		self.entries.insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<()> {
		self.entries.remove(key);
		Ok(())
	}

	fn take_if(&self, key: &str, accept: &dyn Fn(&str) -> bool) -> Result<Option<String>> {
		Ok(self.entries.remove_if(key, |_, value| accept(value)).map(|(_, value)| value))
	}
}

/// Store backed by one file per key, shared across processes on the same host.
#[derive(Debug, Clone)]
pub struct FileStore {
	dir: PathBuf,
}

impl FileStore {
	/// Opens (and creates) the store directory.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
		let dir = dir.into();
		fs::create_dir_all(&dir)?;
		Ok(Self { dir })
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path_for(&self, key: &str) -> PathBuf {
		let name: String = key
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
			.collect();
		self.dir.join(format!("{name}.json"))
	}
}

impl SharedStore for FileStore {
	fn get(&self, key: &str) -> Result<Option<String>> {
		match fs::read_to_string(self.path_for(key)) {
			Ok(value) => Ok(Some(value)),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
			Err(err) => Err(Error::Store(format!("read {key}: {err}"))),
		}
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		let path = self.path_for(key);
		let tmp = path.with_extension("json.tmp");
		fs::write(&tmp, value)?;
		fs::rename(&tmp, &path)?;
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<()> {
		match fs::remove_file(self.path_for(key)) {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(err) => Err(Error::Store(format!("remove {key}: {err}"))),
		}
	}

	fn take_if(&self, key: &str, accept: &dyn Fn(&str) -> bool) -> Result<Option<String>> {
		let Some(value) = self.get(key)? else {
			return Ok(None);
		};
		if !accept(&value) {
			return Ok(None);
		}
		// Whoever deletes the file owns the entry.
		match fs::remove_file(self.path_for(key)) {
			Ok(()) => Ok(Some(value)),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
			Err(err) => Err(Error::Store(format!("remove {key}: {err}"))),
		}
	}
}

/// [`Transport`] that polls a [`SharedStore`] on a fixed interval.
///
/// A single repeating timer task per session; stopping the subscription aborts it, so
/// there is never a tick racing the teardown.
pub struct StorePoller {
	store: Option<Arc<dyn SharedStore>>,
	key: String,
	interval: Duration,
}

impl StorePoller {
	pub fn new(store: Option<Arc<dyn SharedStore>>, namespace: &str, interval: Duration) -> Self {
		Self {
			store,
			key: selected_element_key(namespace),
			interval,
		}
	}

	pub fn key(&self) -> &str {
		&self.key
	}
}

impl Transport for StorePoller {
	fn kind(&self) -> TransportKind {
		TransportKind::SharedStore
	}

	fn is_available(&self) -> bool {
		self.store.is_some()
	}

	fn start(&self, session_id: &SessionId, sink: InboundSink) -> Subscription {
		let Some(store) = self.store.clone() else {
			debug!(target = "pickwire.transport", "no shared store; poller inert");
			return Subscription::noop();
		};
		let key = self.key.clone();
		let interval = self.interval;
		let session_id = session_id.clone();

		let handle = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			loop {
				ticker.tick().await;
				let accept = |raw: &str| stored_session_id(raw).as_deref() == Some(session_id.as_str());
				match store.take_if(&key, &accept) {
					Ok(Some(raw)) => match envelope_from_entry(&raw) {
						Some(envelope) => sink(TransportKind::SharedStore, envelope),
						None => trace!(target = "pickwire.transport", %key, "consumed unreadable store entry"),
					},
					Ok(None) => {}
					Err(err) => {
						debug!(target = "pickwire.transport", %key, error = %err, "shared store poll failed");
					}
				}
			}
		});
		Subscription::from_task(handle)
	}
}

fn stored_session_id(raw: &str) -> Option<String> {
	let value: Value = serde_json::from_str(raw).ok()?;
	value.get("sessionId")?.as_str().map(str::to_string)
}

fn envelope_from_entry(raw: &str) -> Option<Envelope> {
	let payload: Value = serde_json::from_str(raw).ok()?;
	let session_id = payload.get("sessionId")?.as_str()?.to_string();
	Some(Envelope {
		kind: MessageKind::ElementSelection,
		session_id,
		payload,
	})
}
