use colored::Colorize;
use pickwire::{ElementSelector, ElementTarget, Error, PickerContext, SessionStatus};
use tracing::info;

use crate::error::{CliError, Result};

/// Opens the selector and waits for the operator, a timeout, or Ctrl-C.
pub async fn execute(ctx: &PickerContext) -> Result<ElementTarget> {
	let selector = ElementSelector::new(ctx);
	let mut status = selector.controller().subscribe_status();
	let mut selected = selector.watch_selected_element();

	let id = selector.open_selector()?;
	info!(target = "pickwire.session", session_id = %id, "waiting for the operator to pick an element");

	let finished = tokio::select! {
		changed = status.wait_for(|status| status.is_terminal()) => changed.ok().map(|status| *status),
		_ = tokio::signal::ctrl_c() => None,
	};

	match finished {
		Some(SessionStatus::Resolved) => {
			// Status is published just before the result handlers run.
			let target = selected.wait_for(Option::is_some).await.ok().and_then(|target| target.clone());
			target.ok_or(CliError::Cancelled)
		}
		Some(SessionStatus::TimedOut) => Err(Error::Timeout {
			ms: ctx.config.selection_timeout_ms,
		}
		.into()),
		Some(SessionStatus::Error) => Err(anyhow::anyhow!(selector.error().unwrap_or_else(|| "selection failed".into())).into()),
		_ => {
			selector.cancel_selection();
			Err(CliError::Cancelled)
		}
	}
}

pub fn print(target: &ElementTarget, json: bool) -> Result<()> {
	if json {
		println!("{}", serde_json::to_string_pretty(target)?);
		return Ok(());
	}

	println!("{} {}", "picked".green().bold(), target.selector.cyan());
	if let Some(name) = &target.display_name {
		println!("  {:<6} {name}", "name".dimmed());
	}
	if let Some(tag) = &target.metadata.tag_name {
		println!("  {:<6} <{tag}>", "tag".dimmed());
	}
	if let Some(page) = &target.page_url {
		println!("  {:<6} {page}", "page".dimmed());
	}
	if target.is_fragile {
		println!("  {}", "selector depends on page structure and may break".yellow());
	}
	Ok(())
}
