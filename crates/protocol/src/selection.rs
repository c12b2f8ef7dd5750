//! Element selection payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Element picked by the operator inside the remote context.
///
/// Delivered via any of the transports; the builder consumes it at most once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
	/// Correlation id of the session that requested the pick.
	pub session_id: String,
	/// CSS selector resolving to the picked element.
	#[serde(default)]
	pub selector: String,
	/// Human-friendly label for the element.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	/// Whether the selector relies on unstable attributes (generated classes, indices).
	#[serde(default)]
	pub is_fragile: bool,
	/// URL of the page the element was picked on.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub page_url: Option<String>,
	/// Lower-cased tag name of the element.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tag_name: Option<String>,
	/// Selected attributes captured at pick time.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub attributes: Option<BTreeMap<String, String>>,
	/// Operator dismissed the picker without choosing an element.
	#[serde(default)]
	pub cancelled: bool,
}

impl SelectionResult {
	/// Converts into the caller-facing [`ElementTarget`], [`None`] for cancelled picks.
	pub fn into_target(self) -> Option<ElementTarget> {
		if self.cancelled {
			return None;
		}
		Some(ElementTarget {
			selector: self.selector,
			display_name: self.display_name,
			is_fragile: self.is_fragile,
			page_url: self.page_url,
			metadata: ElementMetadata {
				tag_name: self.tag_name,
				attributes: self.attributes.unwrap_or_default(),
			},
		})
	}
}

/// Descriptive data about the picked element that is not needed to locate it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMetadata {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tag_name: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub attributes: BTreeMap<String, String>,
}

/// Durable element reference handed to the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementTarget {
	pub selector: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	#[serde(default)]
	pub is_fragile: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub page_url: Option<String>,
	#[serde(default)]
	pub metadata: ElementMetadata,
}
