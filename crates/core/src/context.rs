//! Everything a controller or orchestrator needs from its environment.

use std::fmt;
use std::sync::Arc;

use pickwire_runtime::{RemoteLauncher, TransportSet};

use crate::config::PickerConfig;

/// Configuration, ambient channels and launcher shared by the selection and
/// validation surfaces of one builder.
#[derive(Clone)]
pub struct PickerContext {
	pub config: PickerConfig,
	pub transports: TransportSet,
	pub launcher: Arc<dyn RemoteLauncher>,
	/// Relay endpoint advertised to the remote context in the entry fragment.
	pub relay_url: Option<String>,
}

impl PickerContext {
	/// In-memory transports for `config.namespace`, polling at `config.poll_interval_ms`.
	pub fn new(config: PickerConfig, launcher: Arc<dyn RemoteLauncher>) -> Self {
		let transports = TransportSet::new(&config.namespace).with_poll_interval(config.poll_interval());
		Self {
			config,
			transports,
			launcher,
			relay_url: None,
		}
	}

	pub fn with_transports(mut self, transports: TransportSet) -> Self {
		self.transports = transports;
		self
	}

	pub fn with_relay_url(mut self, relay_url: impl Into<String>) -> Self {
		self.relay_url = Some(relay_url.into());
		self
	}

	pub fn namespace(&self) -> &str {
		&self.config.namespace
	}
}

impl fmt::Debug for PickerContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PickerContext")
			.field("config", &self.config)
			.field("transports", &self.transports)
			.field("relay_url", &self.relay_url)
			.finish_non_exhaustive()
	}
}
