//! Session value object and its state machine.
//!
//! All state changes go through [`Session::transition`]. Terminal states absorb every
//! further event, which is what makes "at most one resolution per session" hold no
//! matter how many transports deliver.

use std::fmt;
use std::time::SystemTime;

use pickwire_protocol::{ElementTarget, SelectionResult};
use pickwire_runtime::{Error, SessionId};

/// Lifecycle of one selection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
	Idle,
	AwaitingResponse,
	Resolved,
	Cancelled,
	TimedOut,
	Error,
}

impl SessionStatus {
	pub fn is_terminal(self) -> bool {
		matches!(
			self,
			SessionStatus::Resolved | SessionStatus::Cancelled | SessionStatus::TimedOut | SessionStatus::Error
		)
	}
}

impl fmt::Display for SessionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			SessionStatus::Idle => "idle",
			SessionStatus::AwaitingResponse => "awaiting_response",
			SessionStatus::Resolved => "resolved",
			SessionStatus::Cancelled => "cancelled",
			SessionStatus::TimedOut => "timed_out",
			SessionStatus::Error => "error",
		})
	}
}

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
	/// Remote context opened.
	Launched,
	/// Remote context could not be opened; carries the user-facing message.
	LaunchFailed(String),
	/// A transport delivered a selection payload.
	Delivered(SelectionResult),
	/// Caller asked to stop waiting.
	Cancel,
	/// Overall timeout elapsed.
	TimerElapsed { ms: u64 },
	/// Remote context was closed and the grace window passed without an answer.
	RemoteClosed,
	/// A newer session replaced this one.
	Superseded,
}

/// Observable effect of applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
	/// Event had no effect (wrong state, stale id or duplicate delivery).
	Ignored,
	Awaiting,
	Resolved(ElementTarget),
	Cancelled,
	TimedOut(String),
	Failed(String),
}

impl Transition {
	/// Returns true if this transition moved the session into a terminal state.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, Transition::Ignored | Transition::Awaiting)
	}

	/// User-facing error message carried by the transition, if any.
	pub fn error_message(&self) -> Option<&str> {
		match self {
			Transition::TimedOut(msg) | Transition::Failed(msg) => Some(msg),
			_ => None,
		}
	}
}

/// One correlated request/response exchange.
#[derive(Debug, Clone)]
pub struct Session {
	id: SessionId,
	status: SessionStatus,
	created_at: SystemTime,
	error: Option<String>,
}

impl Session {
	pub fn new(id: SessionId) -> Self {
		Self {
			id,
			status: SessionStatus::Idle,
			created_at: SystemTime::now(),
			error: None,
		}
	}

	pub fn id(&self) -> &SessionId {
		&self.id
	}

	pub fn status(&self) -> SessionStatus {
		self.status
	}

	pub fn created_at(&self) -> SystemTime {
		self.created_at
	}

	pub fn error(&self) -> Option<&str> {
		self.error.as_deref()
	}

	/// Applies `event`, returning what changed.
	pub fn transition(&mut self, event: SessionEvent) -> Transition {
		use SessionEvent as E;
		use SessionStatus as S;

		match (self.status, event) {
			(S::Idle, E::Launched) => {
				self.status = S::AwaitingResponse;
				Transition::Awaiting
			}
			(S::Idle, E::LaunchFailed(message)) => {
				self.status = S::Error;
				self.error = Some(message.clone());
				Transition::Failed(message)
			}
			(S::AwaitingResponse, E::Delivered(result)) => {
				if result.session_id != self.id.as_str() {
					return Transition::Ignored;
				}
				match result.into_target() {
					Some(target) => {
						self.status = S::Resolved;
						Transition::Resolved(target)
					}
					None => {
						self.status = S::Cancelled;
						Transition::Cancelled
					}
				}
			}
			(S::AwaitingResponse, E::Cancel | E::RemoteClosed) | (S::Idle | S::AwaitingResponse, E::Superseded) => {
				self.status = S::Cancelled;
				Transition::Cancelled
			}
			(S::AwaitingResponse, E::TimerElapsed { ms }) => {
				let message = Error::Timeout { ms }.to_string();
				self.status = S::TimedOut;
				self.error = Some(message.clone());
				Transition::TimedOut(message)
			}
			_ => Transition::Ignored,
		}
	}
}
