//! Selector validation surface for the surrounding application.
//!
//! Keeps one results list covering every item the caller asked about. A batch only
//! writes to the entries it owns: starting a new full validation cancels whatever is
//! still running, and a single-item test takes its item over from any running batch.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use pickwire_protocol::{ItemStatus, ValidationItem};
use pickwire_runtime::{Result, SessionId};
use tokio::sync::watch;

use crate::config::PickerConfig;
use crate::context::PickerContext;
use crate::handlers::HandlerGuard;
use crate::validation::{BatchEnd, BatchReport, ItemResult, ItemUpdate, ValidationOrchestrator};

struct State {
	results: watch::Sender<Vec<ItemResult>>,
	all_tested: watch::Sender<bool>,
	is_validating: watch::Sender<bool>,
	error: watch::Sender<Option<String>>,
	/// How the most recently finished owned batch ended.
	last_end: watch::Sender<Option<BatchEnd>>,
	/// Running batch id -> item ids it may update.
	owned: Mutex<HashMap<SessionId, Vec<String>>>,
}

impl State {
	fn owns(&self, session_id: &SessionId, item_id: &str) -> bool {
		self.owned
			.lock()
			.get(session_id)
			.is_some_and(|items| items.iter().any(|id| id == item_id))
	}

	fn put(&self, item: ItemResult) {
		self.results.send_modify(|results| match results.iter_mut().find(|r| r.item_id == item.item_id) {
			Some(slot) => *slot = item,
			None => results.push(item),
		});
		self.refresh();
	}

	fn refresh(&self) {
		let all_tested = {
			let results = self.results.borrow();
			!results.is_empty() && results.iter().all(|item| item.status.is_settled())
		};
		self.all_tested.send_replace(all_tested);
		self.is_validating.send_replace(!self.owned.lock().is_empty());
	}

	fn on_update(&self, update: &ItemUpdate) {
		if self.owns(&update.session_id, &update.item.item_id) {
			self.put(update.item.clone());
		}
	}

	fn on_complete(&self, report: &BatchReport) {
		let Some(owned) = self.owned.lock().remove(&report.session_id) else {
			return;
		};
		for item in report.items.iter().filter(|item| owned.contains(&item.item_id)) {
			self.put(item.clone());
		}
		if let Some(message) = &report.error {
			self.error.send_replace(Some(message.clone()));
		}
		self.last_end.send_replace(Some(report.end));
		self.refresh();
	}
}

/// Reactive wrapper around a [`ValidationOrchestrator`].
pub struct ElementValidator {
	config: PickerConfig,
	orchestrator: ValidationOrchestrator,
	state: Arc<State>,
	_guards: Vec<HandlerGuard>,
}

impl ElementValidator {
	pub fn new(ctx: &PickerContext) -> Self {
		Self::with_orchestrator(ctx.config.clone(), ValidationOrchestrator::new(ctx))
	}

	pub fn with_orchestrator(config: PickerConfig, orchestrator: ValidationOrchestrator) -> Self {
		let state = Arc::new(State {
			results: watch::channel(Vec::new()).0,
			all_tested: watch::channel(false).0,
			is_validating: watch::channel(false).0,
			error: watch::channel(None).0,
			last_end: watch::channel(None).0,
			owned: Mutex::new(HashMap::new()),
		});

		let on_outcome = {
			let state = state.clone();
			orchestrator.on_outcome(move |update| state.on_update(update))
		};
		let on_complete = {
			let state = state.clone();
			orchestrator.on_complete(move |report| state.on_complete(report))
		};

		Self {
			config,
			orchestrator,
			state,
			_guards: vec![on_outcome, on_complete],
		}
	}

	/// Validates every item in one remote context, replacing the results list.
	///
	/// Batches still running are cancelled first.
	pub fn start_validation(&self, items: Vec<ValidationItem>) -> Result<SessionId> {
		let entry_url = self.entry_url()?;

		let running: Vec<SessionId> = self.state.owned.lock().drain().map(|(id, _)| id).collect();
		for id in running {
			self.orchestrator.cancel(&id);
		}

		let mut results: Vec<ItemResult> = Vec::with_capacity(items.len());
		for item in &items {
			if results.iter().any(|r| r.item_id == item.item_id) {
				continue;
			}
			let status = if item.selector().is_some() {
				ItemStatus::Pending
			} else {
				ItemStatus::NoSelector
			};
			results.push(ItemResult {
				item_id: item.item_id.clone(),
				status,
				tested_at_url: None,
			});
		}

		let id = SessionId::new();
		let owned = results.iter().map(|r| r.item_id.clone()).collect();
		self.state.results.send_replace(results);
		self.state.owned.lock().insert(id.clone(), owned);
		self.state.refresh();

		self.dispatch(id, &entry_url, items)
	}

	/// Re-checks one item in its own remote context.
	pub fn test_single_element(&self, item_id: &str, selector: Option<&str>) -> Result<SessionId> {
		let entry_url = self.entry_url()?;
		let item = ValidationItem::new(item_id, selector.map(str::to_string));

		for items in self.state.owned.lock().values_mut() {
			items.retain(|id| id != item_id);
		}

		let id = SessionId::new();
		self.state.owned.lock().insert(id.clone(), vec![item_id.to_string()]);
		let status = if item.selector().is_some() {
			ItemStatus::Pending
		} else {
			ItemStatus::NoSelector
		};
		self.state.put(ItemResult {
			item_id: item_id.to_string(),
			status,
			tested_at_url: None,
		});

		self.dispatch(id, &entry_url, vec![item])
	}

	fn dispatch(&self, id: SessionId, entry_url: &str, items: Vec<ValidationItem>) -> Result<SessionId> {
		self.state.error.send_replace(None);
		self.state.last_end.send_replace(None);
		match self.orchestrator.start_batch(id.clone(), entry_url, items) {
			Ok(()) => Ok(id),
			Err(err) => {
				self.state.owned.lock().remove(&id);
				self.state.error.send_replace(Some(err.to_string()));
				self.state.refresh();
				Err(err)
			}
		}
	}

	fn entry_url(&self) -> Result<String> {
		self.config.entry_url().inspect_err(|err| {
			self.state.error.send_replace(Some(err.to_string()));
		})
	}

	pub fn results(&self) -> Vec<ItemResult> {
		self.state.results.borrow().clone()
	}

	/// True once every item in the results list has a settled status.
	pub fn all_tested(&self) -> bool {
		*self.state.all_tested.borrow()
	}

	pub fn is_validating(&self) -> bool {
		*self.state.is_validating.borrow()
	}

	pub fn error(&self) -> Option<String> {
		self.state.error.borrow().clone()
	}

	/// End reason of the last batch this validator finished, if any.
	pub fn last_end(&self) -> Option<BatchEnd> {
		*self.state.last_end.borrow()
	}

	pub fn watch_results(&self) -> watch::Receiver<Vec<ItemResult>> {
		self.state.results.subscribe()
	}

	pub fn watch_all_tested(&self) -> watch::Receiver<bool> {
		self.state.all_tested.subscribe()
	}

	/// Flips to false only after the last running batch has published its items and error.
	pub fn watch_is_validating(&self) -> watch::Receiver<bool> {
		self.state.is_validating.subscribe()
	}

	pub fn orchestrator(&self) -> &ValidationOrchestrator {
		&self.orchestrator
	}
}
