//! Infrastructure layer providing external service integrations.
//!
//! This module contains the RPC clients for the business backend and the
//! token ledger, the receipt journal, configuration loading, logging setup
//! and clipboard access.

pub mod backend;
pub mod clipboard;
pub mod config;
pub mod ledger;
pub mod persistence;
pub mod rpc;
pub mod telemetry;

pub use backend::*;
pub use clipboard::*;
pub use config::*;
pub use ledger::*;
pub use persistence::*;
pub use rpc::*;
pub use telemetry::*;
