use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use super::c14n;
use super::document::{XmlDocument, XmlElement};
use crate::core::FatooraError;

/// SHA-256 digest of a canonicalized invoice.
///
/// The base64 form is both the invoice's own hash and the previous invoice
/// hash the next invoice in the chain must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvoiceHash([u8; 32]);

impl InvoiceHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl std::fmt::Display for InvoiceHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

fn is_qr_reference(el: &XmlElement) -> bool {
    el.name == "cac:AdditionalDocumentReference"
        && el.child("cbc:ID").is_some_and(|id| id.text().trim() == "QR")
}

/// Canonical bytes that get hashed: the invoice without its signature
/// extension, signature element and QR reference, canonicalized, with the
/// whitespace the platform's verifier expects in front of `cbc:ProfileID`
/// and `cac:AccountingSupplierParty`.
pub fn pure_invoice_string(xml: &str) -> Result<String, FatooraError> {
    let mut doc = XmlDocument::parse(xml)?;
    doc.root
        .remove_children_where(|el| el.name == "ext:UBLExtensions");
    doc.root.remove_children_where(|el| el.name == "cac:Signature");
    doc.root.remove_children_where(is_qr_reference);

    let canonical = c14n::canonicalize(&doc);
    Ok(canonical
        .replacen("<cbc:ProfileID", "\n    <cbc:ProfileID", 1)
        .replacen(
            "<cac:AccountingSupplierParty",
            "\n    \n    <cac:AccountingSupplierParty",
            1,
        ))
}

/// Hash an assembled or signed invoice.
pub fn hash_invoice(xml: &str) -> Result<InvoiceHash, FatooraError> {
    let pure = pure_invoice_string(xml)?;
    Ok(InvoiceHash(Sha256::digest(pure.as_bytes()).into()))
}
