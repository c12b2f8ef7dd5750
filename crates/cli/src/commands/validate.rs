use std::fs;
use std::path::Path;

use colored::Colorize;
use pickwire::{BatchEnd, ElementValidator, ItemResult, ItemStatus, PickerContext, ValidationItem};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CliError, Result};

/// Parses `ID=SELECTOR` (or a bare `ID`, which has no selector).
pub fn parse_item(raw: &str) -> Result<ValidationItem> {
	let (id, selector) = match raw.split_once('=') {
		Some((id, selector)) => (id.trim(), Some(selector.trim().to_string())),
		None => (raw.trim(), None),
	};
	if id.is_empty() {
		return Err(CliError::InvalidItem(raw.to_string()));
	}
	Ok(ValidationItem::new(id, selector.filter(|s| !s.is_empty())))
}

#[derive(Debug, Deserialize)]
struct FileItem {
	#[serde(alias = "itemId")]
	id: String,
	#[serde(default)]
	selector: Option<String>,
}

/// Items from the command line followed by items from `file`.
pub fn collect_items(args: &[String], file: Option<&Path>) -> Result<Vec<ValidationItem>> {
	let mut items = args.iter().map(|raw| parse_item(raw)).collect::<Result<Vec<_>>>()?;

	if let Some(path) = file {
		let parsed: Vec<FileItem> = serde_json::from_str(&fs::read_to_string(path)?)?;
		for item in parsed {
			if item.id.trim().is_empty() {
				return Err(CliError::InvalidItem(item.id));
			}
			items.push(ValidationItem::new(item.id.trim(), item.selector));
		}
	}

	if items.is_empty() {
		return Err(CliError::NoItems);
	}
	Ok(items)
}

/// Outcome of one `validate` run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
	pub items: Vec<ItemResult>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub end: Option<BatchEnd>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl Summary {
	pub fn count(&self, status: ItemStatus) -> usize {
		self.items.iter().filter(|item| item.status == status).count()
	}

	/// A closed page counts as cancellation. Otherwise incomplete runs win over
	/// missing selectors.
	pub fn into_result(self) -> Result<()> {
		if matches!(self.end, Some(BatchEnd::RemoteClosed | BatchEnd::Cancelled)) {
			return Err(CliError::Cancelled);
		}
		if let Some(message) = self.error {
			return Err(CliError::Incomplete(message));
		}
		match self.count(ItemStatus::Error) {
			0 => {}
			unanswered => {
				return Err(CliError::Incomplete(format!(
					"{unanswered} item(s) got no answer before the batch ended ({})",
					self.end.map_or_else(|| "unknown".to_string(), |end| end.to_string())
				)));
			}
		}
		match self.count(ItemStatus::NotFound) {
			0 => Ok(()),
			missing => Err(CliError::SelectorsMissing(missing)),
		}
	}
}

/// Runs the batch (or a single-item re-test) and waits until it has finished.
pub async fn execute(ctx: &PickerContext, items: Vec<ValidationItem>, single: Option<&str>) -> Result<Summary> {
	let validator = ElementValidator::new(ctx);
	let mut validating = validator.watch_is_validating();

	let id = match single {
		Some(item_id) => {
			let item = items
				.iter()
				.find(|item| item.item_id == item_id)
				.ok_or_else(|| CliError::InvalidItem(item_id.to_string()))?;
			validator.test_single_element(&item.item_id, item.selector())?
		}
		None => validator.start_validation(items)?,
	};
	info!(target = "pickwire.validation", session_id = %id, "waiting for validation results");

	tokio::select! {
		_ = validating.wait_for(|running| !*running) => {}
		_ = tokio::signal::ctrl_c() => {
			validator.orchestrator().cancel(&id);
			return Err(CliError::Cancelled);
		}
	}

	Ok(Summary {
		items: validator.results(),
		end: validator.last_end(),
		error: validator.error(),
	})
}

pub fn print(summary: &Summary, json: bool) -> Result<()> {
	if json {
		println!("{}", serde_json::to_string_pretty(summary)?);
		return Ok(());
	}

	let width = summary.items.iter().map(|item| item.item_id.len()).max().unwrap_or(0);
	for item in &summary.items {
		let status = match item.status {
			ItemStatus::Found => "found".green(),
			ItemStatus::NotFound => "not found".red(),
			ItemStatus::Error => "error".red().bold(),
			ItemStatus::NoSelector => "no selector".dimmed(),
			ItemStatus::Pending => "pending".yellow(),
		};
		match &item.tested_at_url {
			Some(url) => println!("{:<width$}  {status}  {}", item.item_id, url.dimmed()),
			None => println!("{:<width$}  {status}", item.item_id),
		}
	}

	println!(
		"\n{} found, {} not found, {} errors, {} without selector",
		summary.count(ItemStatus::Found),
		summary.count(ItemStatus::NotFound),
		summary.count(ItemStatus::Error),
		summary.count(ItemStatus::NoSelector),
	);
	if let Some(message) = &summary.error {
		eprintln!("{} {message}", "warning:".yellow().bold());
	}
	Ok(())
}
