//! Namespaced message envelope shared by the direct and broadcast transports.
//!
//! On the wire an envelope looks like:
//!
//! ```text
//! { "type": "<ns>_element_selection", "payload": { "sessionId": "...", ... } }
//! ```
//!
//! The `type` tag is checked before anything else is read, so foreign messages
//! arriving on the same channel are rejected without touching their payload.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

/// Kind of message, encoded as the suffix of the namespaced `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
	/// Payload is a [`SelectionResult`](crate::SelectionResult).
	ElementSelection,
	/// Payload is a [`ValidationOutcome`](crate::ValidationOutcome).
	ValidationResult,
	/// Remote context finished a validation batch; payload carries only the session id.
	ValidationComplete,
}

impl MessageKind {
	const ALL: [MessageKind; 3] = [
		MessageKind::ElementSelection,
		MessageKind::ValidationResult,
		MessageKind::ValidationComplete,
	];

	fn suffix(self) -> &'static str {
		match self {
			MessageKind::ElementSelection => "element_selection",
			MessageKind::ValidationResult => "validation_result",
			MessageKind::ValidationComplete => "validation_complete",
		}
	}

	/// Returns the full `type` tag for this kind, e.g. `pickwire_element_selection`.
	pub fn type_tag(self, namespace: &str) -> String {
		format!("{namespace}_{}", self.suffix())
	}

	/// Resolves a `type` tag back into a kind, [`None`] for foreign tags.
	pub fn from_type_tag(namespace: &str, tag: &str) -> Option<Self> {
		let suffix = tag.strip_prefix(namespace)?.strip_prefix('_')?;
		Self::ALL.into_iter().find(|kind| kind.suffix() == suffix)
	}
}

/// A decoded cross-context message with its correlation id lifted out of the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
	pub kind: MessageKind,
	pub session_id: String,
	pub payload: Value,
}

impl Envelope {
	/// Builds an envelope from a typed payload that carries a `sessionId` field.
	pub fn new<T: Serialize>(kind: MessageKind, payload: &T) -> serde_json::Result<Self> {
		let payload = serde_json::to_value(payload)?;
		let session_id = session_id_of(&payload).unwrap_or_default().to_string();
		Ok(Self {
			kind,
			session_id,
			payload,
		})
	}

	/// Completion marker for a validation batch.
	pub fn validation_complete(session_id: &str) -> Self {
		Self {
			kind: MessageKind::ValidationComplete,
			session_id: session_id.to_string(),
			payload: json!({ "sessionId": session_id }),
		}
	}

	/// Parses an inbound message, [`None`] when it is not a well-formed envelope of
	/// this namespace.
	///
	/// The type tag is matched first; a missing or non-string `sessionId` rejects the
	/// message since it can never be correlated.
	pub fn parse(namespace: &str, value: &Value) -> Option<Self> {
		let tag = value.get("type")?.as_str()?;
		let kind = MessageKind::from_type_tag(namespace, tag)?;
		let payload = value.get("payload")?;
		let session_id = session_id_of(payload)?.to_string();
		Some(Self {
			kind,
			session_id,
			payload: payload.clone(),
		})
	}

	/// Like [`parse`](Self::parse) but starting from raw JSON text.
	pub fn parse_str(namespace: &str, text: &str) -> Option<Self> {
		let value: Value = serde_json::from_str(text).ok()?;
		Self::parse(namespace, &value)
	}

	/// Returns true if this envelope belongs to `session_id`.
	pub fn is_for(&self, session_id: &str) -> bool {
		self.session_id == session_id
	}

	/// Decodes the payload into its typed form.
	pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
		serde_json::from_value(self.payload.clone())
	}

	/// Encodes the envelope into its wire form.
	pub fn to_value(&self, namespace: &str) -> Value {
		let mut obj = Map::new();
		obj.insert("type".into(), Value::String(self.kind.type_tag(namespace)));
		obj.insert("payload".into(), self.payload.clone());
		Value::Object(obj)
	}
}

fn session_id_of(payload: &Value) -> Option<&str> {
	payload.get("sessionId")?.as_str()
}
