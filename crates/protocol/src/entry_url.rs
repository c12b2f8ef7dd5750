//! Entry URL augmentation for launching the remote context.
//!
//! Selection-mode parameters travel in the URL **fragment**, never the query string:
//! host platforms are known to strip unknown query parameters on redirect but keep
//! the fragment intact.
//!
//! ```text
//! https://shop.example/#pickwire_mode=true&pickwire_session=<id>&pickwire_auto_close=true
//! https://shop.example/#pickwire_validate=true&pickwire_session=<id>&pickwire_items=[...]
//! ```
//!
//! Existing fragment segments that do not belong to the namespace are preserved in
//! front of the namespaced pairs.

use std::collections::HashMap;

use url::{Url, form_urlencoded};

use crate::validation::{ValidationItem, ValidationRequest};

/// What the remote context should do once it loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMode {
	/// Let the operator pick one element.
	Select { session_id: String, auto_close: bool },
	/// Check every selector in the request and report one outcome per item.
	Validate { request: ValidationRequest },
}

impl EntryMode {
	pub fn session_id(&self) -> &str {
		match self {
			EntryMode::Select { session_id, .. } => session_id,
			EntryMode::Validate { request } => &request.session_id,
		}
	}
}

/// Full set of parameters embedded into the entry URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryParams {
	pub mode: EntryMode,
	/// Optional relay endpoint the remote context may deliver to when it cannot reach
	/// the builder through same-origin primitives.
	pub relay_url: Option<String>,
}

impl EntryParams {
	pub fn new(mode: EntryMode) -> Self {
		Self {
			mode,
			relay_url: None,
		}
	}

	pub fn with_relay_url(mut self, relay_url: Option<String>) -> Self {
		self.relay_url = relay_url;
		self
	}
}

/// Returns `base` with the namespaced parameters written into its fragment.
pub fn augment_entry_url(base: &str, namespace: &str, params: &EntryParams) -> Result<Url, url::ParseError> {
	let mut url = Url::parse(base)?;
	let prefix = format!("{namespace}_");

	let mut segments: Vec<String> = url
		.fragment()
		.map(|fragment| {
			fragment
				.split('&')
				.filter(|segment| !segment.is_empty() && !segment.starts_with(&prefix))
				.map(str::to_string)
				.collect()
		})
		.unwrap_or_default();

	let key = |name: &str| format!("{namespace}_{name}");
	let mut pairs = form_urlencoded::Serializer::new(String::new());
	match &params.mode {
		EntryMode::Select { session_id, auto_close } => {
			pairs.append_pair(&key("mode"), "true");
			pairs.append_pair(&key("session"), session_id);
			pairs.append_pair(&key("auto_close"), if *auto_close { "true" } else { "false" });
		}
		EntryMode::Validate { request } => {
			// A Vec of plain structs always serializes.
			let items = serde_json::to_string(&request.items).unwrap_or_else(|_| "[]".to_string());
			pairs.append_pair(&key("validate"), "true");
			pairs.append_pair(&key("session"), &request.session_id);
			pairs.append_pair(&key("items"), &items);
		}
	}
	if let Some(relay) = &params.relay_url {
		pairs.append_pair(&key("relay"), relay);
	}
	segments.push(pairs.finish());

	url.set_fragment(Some(&segments.join("&")));
	Ok(url)
}

/// Reads the namespaced parameters back out of an entry URL, [`None`] when absent or
/// incomplete.
pub fn parse_entry_url(url: &Url, namespace: &str) -> Option<EntryParams> {
	let fragment = url.fragment()?;
	let prefix = format!("{namespace}_");
	let pairs: HashMap<String, String> = form_urlencoded::parse(fragment.as_bytes())
		.filter_map(|(k, v)| k.strip_prefix(prefix.as_str()).map(|name| (name.to_string(), v.into_owned())))
		.collect();

	let session_id = pairs.get("session").filter(|s| !s.is_empty())?.clone();
	let is_true = |name: &str| pairs.get(name).is_some_and(|v| v == "true");

	let mode = if is_true("mode") {
		EntryMode::Select {
			session_id,
			auto_close: is_true("auto_close"),
		}
	} else if is_true("validate") {
		let items: Vec<ValidationItem> = serde_json::from_str(pairs.get("items")?).ok()?;
		EntryMode::Validate {
			request: ValidationRequest { session_id, items },
		}
	} else {
		return None;
	};

	Some(EntryParams {
		mode,
		relay_url: pairs.get("relay").cloned(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn select(session_id: &str, auto_close: bool) -> EntryParams {
		EntryParams::new(EntryMode::Select {
			session_id: session_id.into(),
			auto_close,
		})
	}

	#[test]
	fn selection_params_go_into_fragment_not_query() {
		let url = augment_entry_url("https://shop.example/cart?ref=ad", "pickwire", &select("abc", true)).unwrap();

		assert_eq!(url.query(), Some("ref=ad"));
		assert_eq!(
			url.fragment(),
			Some("pickwire_mode=true&pickwire_session=abc&pickwire_auto_close=true")
		);
	}

	#[test]
	fn existing_fragment_is_preserved_and_stale_keys_replaced() {
		let url = augment_entry_url(
			"https://shop.example/#/pricing&pickwire_session=old",
			"pickwire",
			&select("new", false),
		)
		.unwrap();

		let fragment = url.fragment().unwrap();
		assert!(fragment.starts_with("/pricing&"));
		assert!(!fragment.contains("old"));

		let params = parse_entry_url(&url, "pickwire").unwrap();
		assert_eq!(params.mode.session_id(), "new");
	}

	#[test]
	fn validation_request_survives_the_fragment() {
		let request = ValidationRequest {
			session_id: "batch-1".into(),
			items: vec![
				ValidationItem::new("hero", Some("section.hero > h1".into())),
				ValidationItem::new("cta", Some("a[href=\"/signup\"]".into())),
			],
		};
		let params = EntryParams::new(EntryMode::Validate { request: request.clone() })
			.with_relay_url(Some("http://127.0.0.1:9272".into()));

		let url = augment_entry_url("https://shop.example/", "pickwire", &params).unwrap();
		let parsed = parse_entry_url(&url, "pickwire").unwrap();

		assert_eq!(parsed.mode, EntryMode::Validate { request });
		assert_eq!(parsed.relay_url.as_deref(), Some("http://127.0.0.1:9272"));
	}

	#[test]
	fn missing_session_is_not_an_entry() {
		let url = Url::parse("https://shop.example/#pickwire_mode=true").unwrap();
		assert!(parse_entry_url(&url, "pickwire").is_none());

		let url = Url::parse("https://shop.example/#other_mode=true&other_session=x").unwrap();
		assert!(parse_entry_url(&url, "pickwire").is_none());
	}

	#[test]
	fn invalid_base_url_is_an_error() {
		assert!(augment_entry_url("not a url", "pickwire", &select("a", false)).is_err());
	}
}
