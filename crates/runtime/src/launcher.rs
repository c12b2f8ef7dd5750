//! Opening the remote context and observing its lifetime.
//!
//! A [`RemoteLauncher`] turns an entry URL into a [`RemoteHandle`]. Real launchers
//! open a browser tab; [`FakeLauncher`] records launches in memory so sessions can be
//! driven without a browser.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use url::Url;

use crate::error::{Error, Result};

/// Handle on an opened remote context.
pub trait RemoteHandle: Send + Sync {
	/// Returns true once the context has gone away (closed by the user or by us).
	fn is_closed(&self) -> bool;

	/// Asks the context to close. Best effort; no-op when already closed.
	fn close(&self);
}

/// Opens remote contexts.
pub trait RemoteLauncher: Send + Sync {
	/// Opens `url`. Fails with [`Error::LaunchBlocked`] when the host refuses.
	fn launch(&self, url: &Url) -> Result<Arc<dyn RemoteHandle>>;
}

/// In-memory launcher recording every launch.
#[derive(Default)]
pub struct FakeLauncher {
	launches: Mutex<Vec<Arc<FakeHandle>>>,
	blocked: AtomicBool,
}

impl FakeLauncher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes subsequent launches fail as if pop-ups were blocked.
	pub fn set_blocked(&self, blocked: bool) {
		self.blocked.store(blocked, Ordering::SeqCst);
	}

	pub fn launch_count(&self) -> usize {
		self.launches.lock().len()
	}

	/// Most recently opened context.
	pub fn last(&self) -> Option<Arc<FakeHandle>> {
		self.launches.lock().last().cloned()
	}

	pub fn handles(&self) -> Vec<Arc<FakeHandle>> {
		self.launches.lock().clone()
	}
}

impl RemoteLauncher for FakeLauncher {
	fn launch(&self, url: &Url) -> Result<Arc<dyn RemoteHandle>> {
		if self.blocked.load(Ordering::SeqCst) {
			return Err(Error::LaunchBlocked("pop-up blocked".into()));
		}
		let handle = Arc::new(FakeHandle::new(url.clone()));
		self.launches.lock().push(handle.clone());
		Ok(handle)
	}
}

/// Remote context opened by [`FakeLauncher`].
#[derive(Debug)]
pub struct FakeHandle {
	url: Url,
	closed: AtomicBool,
	close_calls: AtomicUsize,
}

impl FakeHandle {
	fn new(url: Url) -> Self {
		Self {
			url,
			closed: AtomicBool::new(false),
			close_calls: AtomicUsize::new(0),
		}
	}

	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Simulates the user closing the tab.
	pub fn close_by_user(&self) {
		self.closed.store(true, Ordering::SeqCst);
	}

	/// Number of times the builder asked this context to close.
	pub fn close_calls(&self) -> usize {
		self.close_calls.load(Ordering::SeqCst)
	}
}

impl RemoteHandle for FakeHandle {
	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn close(&self) {
		self.close_calls.fetch_add(1, Ordering::SeqCst);
		self.closed.store(true, Ordering::SeqCst);
	}
}
