//! Bulk selector validation payloads.

use serde::{Deserialize, Serialize};

/// A recorded selector to re-verify against the remote page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationItem {
	pub item_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub selector: Option<String>,
}

impl ValidationItem {
	pub fn new(item_id: impl Into<String>, selector: Option<String>) -> Self {
		Self {
			item_id: item_id.into(),
			selector,
		}
	}

	/// Returns the selector when present and non-blank.
	pub fn selector(&self) -> Option<&str> {
		self.selector.as_deref().map(str::trim).filter(|s| !s.is_empty())
	}
}

/// One validation batch, sent once to the remote context.
///
/// Only items carrying a selector are included; items without one are classified
/// locally as [`ItemStatus::NoSelector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
	pub session_id: String,
	pub items: Vec<ValidationItem>,
}

/// Result of checking a single selector in the remote context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
	pub session_id: String,
	pub item_id: String,
	pub found: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tested_at_url: Option<String>,
}

/// Per-item validation state tracked by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
	Pending,
	Found,
	NotFound,
	Error,
	NoSelector,
}

impl ItemStatus {
	/// Returns true once the item can no longer change within its batch.
	pub fn is_settled(self) -> bool {
		!matches!(self, ItemStatus::Pending)
	}
}

impl std::fmt::Display for ItemStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			ItemStatus::Pending => "pending",
			ItemStatus::Found => "found",
			ItemStatus::NotFound => "not_found",
			ItemStatus::Error => "error",
			ItemStatus::NoSelector => "no_selector",
		};
		f.write_str(s)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn blank_selector_counts_as_missing() {
		assert_eq!(ValidationItem::new("a", Some("  ".into())).selector(), None);
		assert_eq!(ValidationItem::new("a", None).selector(), None);
		assert_eq!(ValidationItem::new("a", Some(" #x ".into())).selector(), Some("#x"));
	}

	#[test]
	fn outcome_uses_camel_case() {
		let outcome: ValidationOutcome = serde_json::from_value(json!({
			"sessionId": "s",
			"itemId": "banner-1",
			"found": false,
			"testedAtUrl": "https://example.com/pricing"
		}))
		.unwrap();
		assert_eq!(outcome.item_id, "banner-1");
		assert!(!outcome.found);
		assert_eq!(outcome.tested_at_url.as_deref(), Some("https://example.com/pricing"));
	}

	#[test]
	fn status_serializes_snake_case() {
		assert_eq!(serde_json::to_value(ItemStatus::NotFound).unwrap(), json!("not_found"));
		assert_eq!(ItemStatus::NoSelector.to_string(), "no_selector");
		assert!(!ItemStatus::Pending.is_settled());
		assert!(ItemStatus::Error.is_settled());
	}
}
