//! Core invoice types, tax computation, validation and hash-chain bookkeeping.
//!
//! This module has no XML or crypto dependencies. It models invoices for the
//! Saudi FATOORA e-invoicing platform and computes their VAT totals.

mod builder;
mod chain;
mod error;
mod tax;
mod types;
mod validation;

pub use builder::*;
pub use chain::*;
pub use error::*;
pub use tax::*;
pub use types::*;
pub use validation::*;
