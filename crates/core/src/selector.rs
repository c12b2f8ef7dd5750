//! Element selection surface for the surrounding application.

use std::sync::Arc;

use pickwire_protocol::ElementTarget;
use pickwire_runtime::{Result, SessionId};
use tokio::sync::watch;

use crate::config::PickerConfig;
use crate::context::PickerContext;
use crate::controller::{OpenOptions, SessionController};
use crate::handlers::HandlerGuard;

struct Observables {
	is_selecting: watch::Sender<bool>,
	error: watch::Sender<Option<String>>,
	selected: watch::Sender<Option<ElementTarget>>,
}

/// Reactive wrapper around a [`SessionController`]: `is_selecting`, `error` and
/// `selected_element` observables plus open/cancel/clear actions.
pub struct ElementSelector {
	config: PickerConfig,
	controller: SessionController,
	observables: Arc<Observables>,
	_guards: Vec<HandlerGuard>,
}

impl ElementSelector {
	pub fn new(ctx: &PickerContext) -> Self {
		Self::with_controller(ctx.config.clone(), SessionController::new(ctx))
	}

	pub fn with_controller(config: PickerConfig, controller: SessionController) -> Self {
		let observables = Arc::new(Observables {
			is_selecting: watch::channel(false).0,
			error: watch::channel(None).0,
			selected: watch::channel(None).0,
		});

		let on_result = {
			let obs = observables.clone();
			controller.on_result(move |target| {
				obs.selected.send_replace(Some(target.clone()));
				obs.is_selecting.send_replace(false);
			})
		};
		let on_error = {
			let obs = observables.clone();
			controller.on_error(move |message| {
				obs.error.send_replace(Some(message.to_string()));
				obs.is_selecting.send_replace(false);
			})
		};
		let on_status = {
			let obs = observables.clone();
			controller.on_status(move |status| {
				if status.is_terminal() {
					obs.is_selecting.send_replace(false);
				}
			})
		};

		Self {
			config,
			controller,
			observables,
			_guards: vec![on_result, on_error, on_status],
		}
	}

	/// Opens the remote context on the configured target page.
	///
	/// Clears any previous error first. Configuration and launch errors are both
	/// published on the `error` observable and returned.
	pub fn open_selector(&self) -> Result<SessionId> {
		self.observables.error.send_replace(None);

		let opened = self.config.entry_url().and_then(|entry_url| {
			self.observables.is_selecting.send_replace(true);
			self.controller.open(
				&entry_url,
				OpenOptions {
					auto_close: self.config.auto_close,
				},
			)
		});
		if let Err(err) = &opened {
			self.observables.is_selecting.send_replace(false);
			self.observables.error.send_replace(Some(err.to_string()));
		}
		opened
	}

	/// Stops the running selection, if any.
	pub fn cancel_selection(&self) {
		self.controller.cancel();
		self.observables.is_selecting.send_replace(false);
	}

	/// Forgets the selected element and any error.
	pub fn clear_selection(&self) {
		self.observables.selected.send_replace(None);
		self.observables.error.send_replace(None);
	}

	pub fn is_selecting(&self) -> bool {
		*self.observables.is_selecting.borrow()
	}

	pub fn error(&self) -> Option<String> {
		self.observables.error.borrow().clone()
	}

	pub fn selected_element(&self) -> Option<ElementTarget> {
		self.observables.selected.borrow().clone()
	}

	pub fn watch_is_selecting(&self) -> watch::Receiver<bool> {
		self.observables.is_selecting.subscribe()
	}

	pub fn watch_error(&self) -> watch::Receiver<Option<String>> {
		self.observables.error.subscribe()
	}

	pub fn watch_selected_element(&self) -> watch::Receiver<Option<ElementTarget>> {
		self.observables.selected.subscribe()
	}

	pub fn controller(&self) -> &SessionController {
		&self.controller
	}
}
