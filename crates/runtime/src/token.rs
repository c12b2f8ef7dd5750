//! Correlation token generation.
//!
//! Ids are random v4 UUIDs. They correlate messages and are not secrets.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Opaque correlation id for one session or validation batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
	/// Generates a fresh id.
	pub fn new() -> Self {
		Self(Arc::from(Uuid::new_v4().to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for SessionId {
	fn from(value: &str) -> Self {
		Self(Arc::from(value))
	}
}

impl PartialEq<str> for SessionId {
	fn eq(&self, other: &str) -> bool {
		&*self.0 == other
	}
}

impl PartialEq<&str> for SessionId {
	fn eq(&self, other: &&str) -> bool {
		&*self.0 == *other
	}
}

/// Generates a fresh correlation id.
pub fn new_id() -> SessionId {
	SessionId::new()
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn ids_are_unique_in_tight_loop() {
		let ids: HashSet<SessionId> = (0..10_000).map(|_| new_id()).collect();
		assert_eq!(ids.len(), 10_000);
	}

	#[test]
	fn ids_are_unique_across_threads() {
		let handles: Vec<_> = (0..8)
			.map(|_| std::thread::spawn(|| (0..500).map(|_| new_id()).collect::<Vec<_>>()))
			.collect();
		let mut all = HashSet::new();
		for handle in handles {
			for id in handle.join().unwrap() {
				assert!(all.insert(id));
			}
		}
		assert_eq!(all.len(), 4_000);
	}

	#[test]
	fn ids_are_uuids() {
		let id = new_id();
		assert!(Uuid::parse_str(id.as_str()).is_ok(), "got {id}");
	}

	#[test]
	fn compares_with_str() {
		let id = SessionId::from("abc");
		assert_eq!(id, "abc");
		assert_eq!(id.to_string(), "abc");
	}
}
