//! Opens the entry URL in the operator's browser.

use std::ffi::OsString;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pickwire_protocol::parse_entry_url;
use pickwire_runtime::{Error, RemoteHandle, RemoteLauncher, Result};
use tracing::debug;
use url::Url;

use crate::relay::Presence;

/// Launches remote contexts with the platform URL opener.
///
/// The browser tab itself cannot be observed. When a relay [`Presence`] is attached,
/// the tab counts as closed once the page connected to the relay and then dropped all
/// its sockets, and closing it from our side asks the page to close itself.
pub struct SystemBrowserLauncher {
	namespace: String,
	command: Option<(OsString, Vec<OsString>)>,
	presence: Option<Presence>,
}

impl SystemBrowserLauncher {
	/// Finds the platform opener on `PATH`.
	pub fn detect(namespace: &str) -> Self {
		Self {
			namespace: namespace.to_string(),
			command: detect_opener(),
			presence: None,
		}
	}

	/// Uses `program args... <url>` instead of the detected opener.
	pub fn with_command(mut self, program: impl Into<OsString>, args: Vec<OsString>) -> Self {
		self.command = Some((program.into(), args));
		self
	}

	pub fn with_presence(mut self, presence: Presence) -> Self {
		self.presence = Some(presence);
		self
	}

	pub fn has_opener(&self) -> bool {
		self.command.is_some()
	}
}

fn detect_opener() -> Option<(OsString, Vec<OsString>)> {
	let candidates: &[(&str, &[&str])] = if cfg!(target_os = "macos") {
		&[("open", &[])]
	} else if cfg!(windows) {
		&[("cmd", &["/C", "start", ""])]
	} else {
		&[("wslview", &[]), ("xdg-open", &[])]
	};

	candidates.iter().find_map(|(program, args)| {
		which::which(program)
			.ok()
			.map(|path| (path.into_os_string(), args.iter().map(OsString::from).collect()))
	})
}

impl RemoteLauncher for SystemBrowserLauncher {
	fn launch(&self, url: &Url) -> Result<Arc<dyn RemoteHandle>> {
		let Some((program, args)) = &self.command else {
			return Err(Error::LaunchBlocked("no browser opener found on PATH".into()));
		};

		let session_id = parse_entry_url(url, &self.namespace)
			.map(|params| params.mode.session_id().to_string())
			.unwrap_or_default();

		debug!(target = "pickwire.session", program = ?program, %session_id, "opening remote context");

		tokio::process::Command::new(program)
			.args(args)
			.arg(url.as_str())
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.spawn()
			.map_err(|err| Error::LaunchBlocked(format!("failed to start {}: {err}", program.to_string_lossy())))?;

		Ok(Arc::new(BrowserTab {
			session_id,
			presence: self.presence.clone(),
			closed: AtomicBool::new(false),
		}))
	}
}

/// A tab opened by [`SystemBrowserLauncher`].
pub struct BrowserTab {
	session_id: String,
	presence: Option<Presence>,
	closed: AtomicBool,
}

impl RemoteHandle for BrowserTab {
	fn is_closed(&self) -> bool {
		if self.closed.load(Ordering::SeqCst) {
			return true;
		}
		let left = self
			.presence
			.as_ref()
			.is_some_and(|presence| presence.has_left(&self.session_id));
		if left {
			self.closed.store(true, Ordering::SeqCst);
		}
		left
	}

	fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(presence) = &self.presence {
			let told = presence.request_close(&self.session_id);
			debug!(target = "pickwire.session", session_id = %self.session_id, sockets = told, "requested remote close");
		}
	}
}

impl Drop for BrowserTab {
	fn drop(&mut self) {
		if let Some(presence) = &self.presence {
			presence.forget(&self.session_id);
		}
	}
}
