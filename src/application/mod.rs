//! Application layer managing state and business workflows.
//!
//! This module coordinates between the domain layer and presentation layer:
//! the purchase saga sequences the remote calls, and the console state tracks
//! what the operator has typed and what the saga last reported.

pub mod saga;
pub mod state;

pub use saga::*;
pub use state::*;
