//! Callback registry shared by the controller, orchestrator and surfaces.
//!
//! Handlers live in an [`IndexMap`] keyed by [`HandlerId`], so removal is O(1) and
//! emission follows registration order. Registration returns a [`HandlerGuard`] that
//! unregisters on drop unless [`HandlerGuard::detach`] is called.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for registered handlers.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Synchronous handler: receives each emitted `E` by reference.
pub type HandlerFn<E> = Arc<dyn Fn(&E) + Send + Sync>;

type HandlerMap<E> = Arc<Mutex<IndexMap<HandlerId, HandlerFn<E>>>>;

/// Ordered set of handlers for one event type.
pub struct Handlers<E> {
	map: HandlerMap<E>,
}

impl<E: 'static> Handlers<E> {
	pub fn new() -> Self {
		Self {
			map: Arc::new(Mutex::new(IndexMap::new())),
		}
	}

	/// Registers `handler`; it stays registered while the returned guard lives.
	pub fn register<F>(&self, handler: F) -> HandlerGuard
	where
		F: Fn(&E) + Send + Sync + 'static,
	{
		let id = next_handler_id();
		self.map.lock().insert(id, Arc::new(handler));

		let weak: Weak<Mutex<IndexMap<HandlerId, HandlerFn<E>>>> = Arc::downgrade(&self.map);
		HandlerGuard {
			id,
			dropper: Some(Box::new(move |id| {
				if let Some(map) = weak.upgrade() {
					map.lock().shift_remove(&id);
				}
			})),
		}
	}

	/// Calls every handler with `event`.
	///
	/// Handlers are snapshotted first so a handler may register or unregister others
	/// (or call back into the emitter) without deadlocking.
	pub fn emit(&self, event: &E) {
		let handlers: Vec<HandlerFn<E>> = self.map.lock().values().cloned().collect();
		for handler in handlers {
			handler(event);
		}
	}

	pub fn len(&self) -> usize {
		self.map.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<E: 'static> Default for Handlers<E> {
	fn default() -> Self {
		Self::new()
	}
}

/// RAII handle that unregisters a handler on drop.
///
/// Holds a weak reference to the registry, so dropping it after the owner is gone is
/// a no-op.
#[must_use = "dropping the guard unregisters the handler; call detach() to keep it"]
pub struct HandlerGuard {
	id: HandlerId,
	dropper: Option<Box<dyn FnOnce(HandlerId) + Send + Sync>>,
}

impl HandlerGuard {
	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Keeps the handler registered for the lifetime of the registry.
	pub fn detach(mut self) {
		self.dropper = None;
	}

	/// Explicitly unregisters. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		if let Some(dropper) = self.dropper.take() {
			dropper(self.id);
		}
	}
}

impl Drop for HandlerGuard {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			dropper(self.id);
		}
	}
}

impl std::fmt::Debug for HandlerGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HandlerGuard")
			.field("id", &self.id)
			.field("attached", &self.dropper.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	#[test]
	fn dropping_guard_unregisters() {
		let handlers: Handlers<u32> = Handlers::new();
		let hits = Arc::new(AtomicUsize::new(0));

		let h = hits.clone();
		let guard = handlers.register(move |n| {
			h.fetch_add(*n as usize, Ordering::SeqCst);
		});
		handlers.emit(&2);
		drop(guard);
		handlers.emit(&5);

		assert_eq!(hits.load(Ordering::SeqCst), 2);
		assert!(handlers.is_empty());
	}

	#[test]
	fn detached_handler_stays() {
		let handlers: Handlers<()> = Handlers::new();
		handlers.register(|_| {}).detach();
		assert_eq!(handlers.len(), 1);
	}

	#[test]
	fn emits_in_registration_order() {
		let handlers: Handlers<()> = Handlers::new();
		let order = Arc::new(Mutex::new(Vec::new()));
		for i in 0..3 {
			let order = order.clone();
			handlers.register(move |_| order.lock().push(i)).detach();
		}
		handlers.emit(&());
		assert_eq!(*order.lock(), vec![0, 1, 2]);
	}
}
