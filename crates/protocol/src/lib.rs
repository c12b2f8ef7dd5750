//! Wire types for the pickwire cross-context selection protocol.
//!
//! Everything that crosses between the builder and the remote context lives here:
//!
//! - [`Envelope`] - Namespaced `{ type, payload }` message carried by every transport
//! - [`SelectionResult`] / [`ElementTarget`] - The element picked by the operator
//! - [`ValidationRequest`] / [`ValidationOutcome`] - Bulk selector re-verification
//! - [`EntryParams`] - Parameters encoded into the remote entry URL fragment
//!
//! All message type tags and fragment keys are prefixed with a namespace
//! (default [`DEFAULT_NAMESPACE`]) so unrelated traffic on the same channel can be
//! filtered before the payload is inspected.

pub mod entry_url;
pub mod envelope;
pub mod selection;
pub mod validation;

pub use entry_url::{EntryMode, EntryParams, augment_entry_url, parse_entry_url};
pub use envelope::{Envelope, MessageKind};
pub use selection::{ElementMetadata, ElementTarget, SelectionResult};
pub use validation::{ItemStatus, ValidationItem, ValidationOutcome, ValidationRequest};

/// Namespace used for type tags, fragment keys and store keys unless configured otherwise.
pub const DEFAULT_NAMESPACE: &str = "pickwire";

/// Shared-store key under which the remote context writes its [`SelectionResult`].
pub fn selected_element_key(namespace: &str) -> String {
	format!("{namespace}_selected_element")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn store_key_is_namespaced() {
		assert_eq!(selected_element_key("pickwire"), "pickwire_selected_element");
		assert_eq!(selected_element_key("tour"), "tour_selected_element");
	}
}
