//! Plantify admin console library.
//!
//! Coordinates NFT purchases on behalf of investors: eligibility, platform
//! account and price are fetched from the business backend, the payment is
//! made as a single ledger transfer, and the backend is then asked to issue
//! the NFTs against the transfer's block index.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
pub use application::*;
