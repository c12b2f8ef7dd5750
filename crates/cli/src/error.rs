use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid config value for '{key}': {message}")]
	ConfigValue { key: String, message: String },

	#[error("unknown config key '{0}' (run `pickwire config show` to list keys)")]
	UnknownConfigKey(String),

	#[error("failed to write config to {path}")]
	ConfigWrite {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid item '{0}': expected ID=SELECTOR or ID")]
	InvalidItem(String),

	#[error("no items to validate")]
	NoItems,

	#[error("selection cancelled")]
	Cancelled,

	#[error("validation did not finish: {0}")]
	Incomplete(String),

	#[error("{0} selector(s) not found on the page")]
	SelectorsMissing(usize),

	#[error(transparent)]
	Picker(#[from] pickwire::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	/// Process exit code for this error.
	///
	/// 2 for problems the user has to fix in configuration or arguments. 3 for
	/// retryable outcomes such as a timeout or a blocked launch. 130 for cancellation.
	/// 1 otherwise, including selectors that were not found.
	pub fn exit_code(&self) -> i32 {
		match self {
			CliError::ConfigValue { .. } | CliError::UnknownConfigKey(_) | CliError::InvalidItem(_) | CliError::NoItems => 2,
			CliError::Picker(err) if err.is_configuration() => 2,
			CliError::Picker(err) if err.is_retryable() => 3,
			CliError::Incomplete(_) => 3,
			CliError::Cancelled => 130,
			_ => 1,
		}
	}
}
