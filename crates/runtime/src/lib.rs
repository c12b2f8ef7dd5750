//! pickwire runtime - transports, correlation tokens and remote-context launching
//!
//! This crate provides the infrastructure below the session state machine:
//!
//! - **Tokens**: Correlation ids for sessions and validation batches
//! - **Transports**: Direct channel, same-origin broadcast and shared-store poller,
//!   all behind the [`Transport`] trait
//! - **Launchers**: Opening the remote context and watching it close
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   pickwire   │  Session controller, validation orchestrator
//! └──────┬───────┘
//!        │ starts/stops adapters, owns handles
//! ┌──────▼───────┐
//! │   runtime    │  This crate
//! │  ┌────────┐  │
//! │  │ Trans  │  │  direct / broadcast / store poller
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Launch │  │  RemoteLauncher -> RemoteHandle
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod error;
pub mod launcher;
pub mod token;
pub mod transport;

pub use error::{Error, Result};
pub use launcher::{FakeHandle, FakeLauncher, RemoteHandle, RemoteLauncher};
pub use token::{SessionId, new_id};
pub use transport::{
	BroadcastChannel, BroadcastListener, DEFAULT_POLL_INTERVAL, DirectChannel, DirectChannelListener, FileStore,
	InboundSink, MemoryStore, SharedStore, StorePoller, Subscription, Transport, TransportKind, TransportSet,
};
