//! Terminal front end for pickwire.
//!
//! Serves a local relay so a page opened in the operator's browser can deliver its
//! selection, then drives the `pickwire` session controller and validation
//! orchestrator from the command line.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod relay;
