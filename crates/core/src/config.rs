//! Picker configuration.
//!
//! Every field has a default, so a partially written config file still loads.

use std::time::Duration;

use pickwire_protocol::DEFAULT_NAMESPACE;
use pickwire_runtime::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_SELECTION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_VALIDATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 1_000;

/// Settings shared by selection sessions and validation batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PickerConfig {
	/// Prefix for every fragment parameter, envelope type tag and store key.
	pub namespace: String,
	/// Domain (or full origin) of the page the remote context opens.
	pub target_domain: Option<String>,
	/// Path appended to the target domain.
	pub entry_path: String,
	pub selection_timeout_ms: u64,
	pub validation_timeout_ms: u64,
	/// Shared-store poll interval.
	pub poll_interval_ms: u64,
	/// How often the remote context handle is checked for closure.
	pub monitor_interval_ms: u64,
	/// Wait after closure before giving up, so in-flight deliveries can still land.
	pub close_grace_ms: u64,
	/// Ask the remote context to close itself after a successful pick.
	pub auto_close: bool,
	/// Close the remote context when a session times out.
	pub close_on_timeout: bool,
}

impl Default for PickerConfig {
	fn default() -> Self {
		Self {
			namespace: DEFAULT_NAMESPACE.to_string(),
			target_domain: None,
			entry_path: "/".to_string(),
			selection_timeout_ms: DEFAULT_SELECTION_TIMEOUT_MS,
			validation_timeout_ms: DEFAULT_VALIDATION_TIMEOUT_MS,
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
			close_grace_ms: DEFAULT_CLOSE_GRACE_MS,
			auto_close: false,
			close_on_timeout: false,
		}
	}
}

impl PickerConfig {
	pub fn with_target_domain(mut self, domain: impl Into<String>) -> Self {
		self.target_domain = Some(domain.into());
		self
	}

	pub fn selection_timeout(&self) -> Duration {
		Duration::from_millis(self.selection_timeout_ms)
	}

	pub fn validation_timeout(&self) -> Duration {
		Duration::from_millis(self.validation_timeout_ms)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms.max(1))
	}

	pub fn monitor_interval(&self) -> Duration {
		Duration::from_millis(self.monitor_interval_ms.max(1))
	}

	pub fn close_grace(&self) -> Duration {
		Duration::from_millis(self.close_grace_ms)
	}

	/// Target domain, [`None`] when unset or blank.
	pub fn target_domain(&self) -> Option<&str> {
		self.target_domain.as_deref().map(str::trim).filter(|d| !d.is_empty())
	}

	/// Page the remote context is launched on, before augmentation.
	///
	/// A bare domain gets `https://`; a domain that already carries a scheme is used
	/// as the origin. Fails with [`Error::NotConfigured`] when no domain is set.
	pub fn entry_url(&self) -> Result<String> {
		let domain = self.target_domain().ok_or(Error::NotConfigured)?;
		let origin = if domain.contains("://") {
			domain.trim_end_matches('/').to_string()
		} else {
			format!("https://{}", domain.trim_end_matches('/'))
		};
		let path = self.entry_path.trim();
		let url = if path.is_empty() {
			format!("{origin}/")
		} else if path.starts_with('/') {
			format!("{origin}{path}")
		} else {
			format!("{origin}/{path}")
		};

		Url::parse(&url).map_err(|source| Error::InvalidEntryUrl {
			url: url.clone(),
			source,
		})?;
		Ok(url)
	}
}
