//! Keys, certificates and XAdES-BES enveloped signatures for invoices.
//!
//! A signed invoice carries the ECDSA signature over its hash, a
//! `xades:SignedProperties` block bound to the signing certificate, and a
//! phase-2 QR code with the signature material.

mod certificate;
mod keys;
mod signature;

pub use certificate::{Certificate, CertificateInfo};
pub use keys::{
    INVOICE_TYPE_FLAG, KeyGenerator, NativeKeyGenerator, OID_CERTIFICATE_TEMPLATE, PrivateKey,
    csr_serial_number,
};
pub use signature::{InvoiceSigner, SignedInvoice, XadesSigner};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::core::FatooraError;

pub(crate) fn signing_error(context: &str, e: impl std::fmt::Display) -> FatooraError {
    FatooraError::Signing(format!("{context}: {e}"))
}

/// base64 of the lowercase hex SHA-256 digest.
pub(crate) fn hex_base64_sha256(data: &[u8]) -> String {
    STANDARD.encode(hex::encode(Sha256::digest(data)))
}
