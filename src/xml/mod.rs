//! UBL 2.1 invoice rendering, canonical hashing and QR codes.
//!
//! # Example
//!
//! ```no_run
//! use fatoora::core::*;
//! use fatoora::xml;
//!
//! let props: InvoiceProps = todo!(); // build via InvoiceBuilder
//! let assembled = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
//! let next_previous_hash = assembled.hash().unwrap().to_base64();
//! ```

pub mod c14n;
mod document;
mod hash;
mod invoice;
pub mod qr;
pub(crate) mod xml_utils;

pub use document::{NamespaceScope, UblDocument, XmlDocument, XmlElement, XmlNode};
pub use hash::{InvoiceHash, hash_invoice, pure_invoice_string};
pub use invoice::{AssembledInvoice, assemble};

/// Text the signature extension block replaces.
pub const UBL_EXTENSIONS_PLACEHOLDER: &str = "SET_UBL_EXTENSIONS_STRING";

/// Text the QR payload replaces.
pub const QR_PLACEHOLDER: &str = "SET_QR_CODE_DATA";

/// Document and tax currency.
pub const CURRENCY: &str = "SAR";

/// UBL 2.1 namespace URIs.
pub mod ubl_ns {
    pub const INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
    pub const CAC: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
    pub const CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
    pub const EXT: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
}
