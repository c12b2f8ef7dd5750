use colored::Colorize;
use serde_json::{Map, Value};

use crate::cli::ConfigAction;
use crate::config::{self, CliConfig, ConfigPaths};
use crate::error::Result;

pub fn execute(action: ConfigAction, paths: &ConfigPaths, mut current: CliConfig, json: bool) -> Result<()> {
	match action {
		ConfigAction::Show => show(&current, json),
		ConfigAction::Path => {
			println!("{}", paths.config_file.display());
			Ok(())
		}
		ConfigAction::SetDomain { domain } => {
			current.set("targetDomain", &domain)?;
			current.picker.entry_url()?;
			config::save(&paths.config_file, &current)?;
			println!("{} targetDomain = {domain}", "saved".green().bold());
			Ok(())
		}
		ConfigAction::Set { key, value } => {
			current.set(&key, &value)?;
			config::save(&paths.config_file, &current)?;
			println!("{} {key} = {value}", "saved".green().bold());
			Ok(())
		}
	}
}

fn show(current: &CliConfig, json: bool) -> Result<()> {
	let entries = current.entries()?;
	if json {
		let map: Map<String, Value> = entries.into_iter().collect();
		println!("{}", serde_json::to_string_pretty(&map)?);
		return Ok(());
	}
	for (key, value) in entries {
		let value = match value {
			Value::String(s) => s,
			Value::Null => "(unset)".dimmed().to_string(),
			other => other.to_string(),
		};
		println!("{} = {value}", key.cyan());
	}
	Ok(())
}
