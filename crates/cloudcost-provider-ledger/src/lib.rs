//! Local ledger provider for cloudcost
//!
//! This crate implements the billing backend trait over a JSON ledger file,
//! served through a paged API so queries exercise the same pagination path as
//! remote billing services.

pub mod api;
pub mod backend;
pub mod ledger;

#[cfg(test)]
pub mod test_utils;

pub use backend::{LedgerBackend, TAG_KIND, ledger_parameters};
pub use ledger::{LEDGER_ENV, Ledger, LineItem};
