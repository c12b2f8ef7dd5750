//! Persistent CLI configuration.
//!
//! Stored as pretty JSON in `$XDG_CONFIG_HOME/pickwire/config.json` (falling back to
//! the platform config dir). A missing or unreadable file loads as defaults.

use std::fs;
use std::path::{Path, PathBuf};

use pickwire::PickerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CliError, Result};

/// Local relay server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
	pub enabled: bool,
	pub host: String,
	/// 0 picks a free port for every run.
	pub port: u16,
}

impl Default for RelayConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			host: "127.0.0.1".to_string(),
			port: 0,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliConfig {
	#[serde(flatten)]
	pub picker: PickerConfig,
	pub relay: RelayConfig,
}

impl CliConfig {
	/// Sets `key` (camelCase or kebab-case, `relay.` prefix for relay keys) from its
	/// textual form. The value is parsed according to the key's current type.
	pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
		let mut value = serde_json::to_value(&*self)?;
		let slot = key
			.split('.')
			.try_fold(&mut value, |node, segment| node.get_mut(camel_case(segment)))
			.filter(|slot| !slot.is_object())
			.ok_or_else(|| CliError::UnknownConfigKey(key.to_string()))?;

		*slot = parse_like(slot, raw).map_err(|message| CliError::ConfigValue {
			key: key.to_string(),
			message,
		})?;

		*self = serde_json::from_value(value).map_err(|err| CliError::ConfigValue {
			key: key.to_string(),
			message: err.to_string(),
		})?;
		Ok(())
	}

	/// Flattened `key = value` pairs sorted by key, for display.
	pub fn entries(&self) -> Result<Vec<(String, Value)>> {
		let mut out = Vec::new();
		flatten_into(&mut out, "", &serde_json::to_value(self)?);
		Ok(out)
	}
}

fn flatten_into(out: &mut Vec<(String, Value)>, prefix: &str, value: &Value) {
	match value {
		Value::Object(map) => {
			for (key, child) in map {
				let path = if prefix.is_empty() {
					key.clone()
				} else {
					format!("{prefix}.{key}")
				};
				flatten_into(out, &path, child);
			}
		}
		other => out.push((prefix.to_string(), other.clone())),
	}
}

fn camel_case(segment: &str) -> String {
	let mut out = String::with_capacity(segment.len());
	let mut upper = false;
	for c in segment.chars() {
		if c == '-' || c == '_' {
			upper = true;
		} else if upper {
			out.extend(c.to_uppercase());
			upper = false;
		} else {
			out.push(c);
		}
	}
	out
}

fn parse_like(current: &Value, raw: &str) -> std::result::Result<Value, String> {
	let raw = raw.trim();
	match current {
		Value::Bool(_) => match raw {
			"true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
			"false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
			_ => Err(format!("expected true or false, got '{raw}'")),
		},
		Value::Number(_) => raw
			.parse::<u64>()
			.map(Value::from)
			.map_err(|_| format!("expected a non-negative integer, got '{raw}'")),
		_ if raw.is_empty() || raw == "null" => Ok(Value::Null),
		_ => Ok(Value::String(raw.to_string())),
	}
}

/// Where the CLI keeps its files.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
	pub config_file: PathBuf,
	/// Directory backing the shared store, so a remote context on this machine can
	/// write results that any running `pickwire` process picks up.
	pub store_dir: PathBuf,
}

impl ConfigPaths {
	pub fn new() -> Self {
		let config_home = std::env::var_os("XDG_CONFIG_HOME")
			.map(PathBuf::from)
			.or_else(dirs::config_dir)
			.unwrap_or_else(|| PathBuf::from("."));
		let cache_home = std::env::var_os("XDG_CACHE_HOME")
			.map(PathBuf::from)
			.or_else(dirs::cache_dir)
			.unwrap_or_else(|| PathBuf::from("."));

		Self {
			config_file: config_home.join("pickwire/config.json"),
			store_dir: cache_home.join("pickwire/store"),
		}
	}

	/// Uses `config_file` as given, keeping the default store directory.
	pub fn with_config_file(config_file: PathBuf) -> Self {
		Self {
			config_file,
			..Self::new()
		}
	}

	pub fn in_dir(root: &Path) -> Self {
		Self {
			config_file: root.join("config.json"),
			store_dir: root.join("store"),
		}
	}
}

impl Default for ConfigPaths {
	fn default() -> Self {
		Self::new()
	}
}

pub fn load(path: &Path) -> CliConfig {
	match fs::read_to_string(path) {
		Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
			tracing::warn!(target = "pickwire", path = %path.display(), error = %err, "ignoring unreadable config");
			CliConfig::default()
		}),
		Err(_) => CliConfig::default(),
	}
}

pub fn save(path: &Path, config: &CliConfig) -> Result<()> {
	let write = |path: &Path| -> std::io::Result<()> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let mut content = serde_json::to_string_pretty(config)?;
		content.push('\n');
		fs::write(path, content)
	};
	write(path).map_err(|source| CliError::ConfigWrite {
		path: path.to_path_buf(),
		source,
	})
}
