//! # fatoora
//!
//! Saudi e-invoicing (FATOORA phase 2) library: VAT computation, UBL 2.1
//! invoice assembly, the per-device invoice hash chain, XAdES signing, TLV
//! QR codes and the onboarding lifecycle of an EGS unit.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{NaiveDate, NaiveTime};
//! use fatoora::core::*;
//! use fatoora::xml;
//! use rust_decimal_macros::dec;
//!
//! let seller = EgsIdentityBuilder::new("310175397400003", "Maximum Speed Tech Supply LTD")
//!     .crn_number("1010010000")
//!     .build();
//!
//! let mut chain = InvoiceChain::genesis();
//! let link = chain.next_link();
//! let props = InvoiceBuilder::chained(
//!     "SME00001",
//!     &link,
//!     NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
//!     NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
//! )
//! .seller(seller)
//! .add_line(LineItemBuilder::new("1", "Coffee", dec!(2), dec!(10)).build())
//! .simplified(DocumentKind::Invoice(CashDetails::default()))
//! .build()
//! .unwrap();
//!
//! let invoice = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
//! assert_eq!(invoice.computation.totals.tax_inclusive_total, dec!(23.00));
//!
//! let hash = invoice.hash().unwrap().to_base64();
//! chain.record(&link, hash).unwrap();
//! assert_eq!(chain.next_counter(), 2);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` | Invoice types, builders, tax engine, hash-chain bookkeeping |
//! | `xml` | UBL rendering, canonical hashing, QR codes |
//! | `signing` | Certificates, keys and CSRs, XAdES signatures |
//! | `api` | FATOORA gateway HTTP client |
//! | `egs` | EGS onboarding state machine |
//! | `all` (default) | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "xml")]
pub mod xml;

#[cfg(feature = "signing")]
pub mod signing;

#[cfg(feature = "api")]
pub mod api;

#[cfg(feature = "egs")]
pub mod egs;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
