//! pickwire - pick DOM elements in a separate, possibly cross-origin browser context
//! and re-verify recorded selectors later.
//!
//! The builder opens a remote context with a session id in the entry URL fragment and
//! listens on three transports at once. The first delivery carrying the live session id
//! wins; everything else is dropped.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pickwire::{ElementSelector, PickerConfig, PickerContext};
//! use pickwire_runtime::FakeLauncher;
//!
//! let config = PickerConfig::default().with_target_domain("shop.example");
//! let ctx = PickerContext::new(config, Arc::new(FakeLauncher::new()));
//! let selector = ElementSelector::new(&ctx);
//! selector.open_selector()?;
//! let mut selected = selector.watch_selected_element();
//! selected.changed().await?;
//! ```

pub mod config;
pub mod context;
pub mod controller;
pub mod handlers;
pub mod monitor;
pub mod selector;
pub mod session;
pub mod validation;
pub mod validator;

pub use config::PickerConfig;
pub use context::PickerContext;
pub use controller::{OpenOptions, SessionController};
pub use handlers::{HandlerGuard, Handlers};
pub use monitor::spawn_monitor;
pub use pickwire_protocol::{ElementMetadata, ElementTarget, ItemStatus, SelectionResult, ValidationItem, ValidationOutcome};
pub use pickwire_runtime::{Error, Result, SessionId};
pub use selector::ElementSelector;
pub use session::{Session, SessionEvent, SessionStatus, Transition};
pub use validation::{BatchEnd, BatchReport, ItemResult, ItemUpdate, ValidationOrchestrator};
pub use validator::ElementValidator;
