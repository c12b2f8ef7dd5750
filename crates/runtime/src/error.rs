//! Error types for the pickwire runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by sessions, transports and launchers.
///
/// Foreign or malformed inbound messages are never errors; adapters drop them.
#[derive(Debug, Error)]
pub enum Error {
	/// No target domain configured, so there is no page to open.
	#[error("No target domain configured. Set the target domain in settings before selecting elements.")]
	NotConfigured,

	/// The host refused to open the remote context (typically a pop-up blocker).
	#[error("Could not open the target page: {0}. Allow pop-ups for this site and try again.")]
	LaunchBlocked(String),

	/// The entry URL could not be parsed.
	#[error("Invalid entry URL '{url}': {source}")]
	InvalidEntryUrl {
		url: String,
		#[source]
		source: url::ParseError,
	},

	/// No transport delivered an answer in time.
	#[error("No response from the target page after {ms}ms. Open the selector again to retry.")]
	Timeout { ms: u64 },

	/// Shared store could not be read or written.
	#[error("Shared store error: {0}")]
	Store(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if reopening the selector may succeed without changing anything.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Error::Timeout { .. } | Error::LaunchBlocked(_))
	}

	/// Returns true if the failure happened before any remote context was opened.
	pub fn is_configuration(&self) -> bool {
		matches!(self, Error::NotConfigured | Error::InvalidEntryUrl { .. })
	}
}
