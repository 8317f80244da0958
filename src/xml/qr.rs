use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::document::UblDocument;
use crate::core::QrError;

/// One decoded TLV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvField {
    pub tag: u8,
    pub value: Vec<u8>,
}

impl TlvField {
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Signature material added to the QR code of a signed invoice.
#[derive(Debug, Clone, Copy)]
pub struct SignatureArtifacts<'a> {
    /// Base64 invoice hash.
    pub invoice_hash: &'a str,
    /// Base64 DER ECDSA signature.
    pub signature_value: &'a str,
    /// DER SubjectPublicKeyInfo of the signing key.
    pub public_key: &'a [u8],
    /// Raw signature bytes of the signing certificate.
    pub certificate_signature: &'a [u8],
}

/// Encode values as TLV with sequential tags starting at 1.
pub fn encode_tlv<T: AsRef<[u8]>>(values: &[T]) -> Result<Vec<u8>, QrError> {
    let mut buf = Vec::with_capacity(values.iter().map(|v| v.as_ref().len() + 2).sum());
    for (i, value) in values.iter().enumerate() {
        let value = value.as_ref();
        let tag = u8::try_from(i + 1).map_err(|_| QrError::ValueTooLong {
            tag: u8::MAX,
            len: value.len(),
        })?;
        let len = u8::try_from(value.len()).map_err(|_| QrError::ValueTooLong {
            tag,
            len: value.len(),
        })?;
        buf.push(tag);
        buf.push(len);
        buf.extend_from_slice(value);
    }
    Ok(buf)
}

/// Decode a TLV buffer.
pub fn decode_tlv(bytes: &[u8]) -> Result<Vec<TlvField>, QrError> {
    let mut fields = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let tag = bytes[offset];
        let Some(&len) = bytes.get(offset + 1) else {
            return Err(QrError::Truncated { tag, offset });
        };
        let start = offset + 2;
        let end = start + len as usize;
        let Some(value) = bytes.get(start..end) else {
            return Err(QrError::Truncated { tag, offset });
        };
        fields.push(TlvField {
            tag,
            value: value.to_vec(),
        });
        offset = end;
    }
    Ok(fields)
}

/// Decode a base64 QR payload into its TLV records.
pub fn read_qr(payload: &str) -> Result<Vec<TlvField>, QrError> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| QrError::InvalidBase64(e.to_string()))?;
    decode_tlv(&bytes)
}

fn base_fields(doc: &UblDocument) -> Result<Vec<Vec<u8>>, QrError> {
    let seller_name = doc.seller_name().ok_or(QrError::MissingField("seller name"))?;
    let vat_number = doc
        .seller_vat_number()
        .ok_or(QrError::MissingField("seller VAT number"))?;
    let issue_date = doc.issue_date().ok_or(QrError::MissingField("issue date"))?;
    let issue_time = doc.issue_time().ok_or(QrError::MissingField("issue time"))?;
    let total = doc
        .tax_inclusive_amount()
        .ok_or(QrError::MissingField("tax inclusive amount"))?;
    let vat_total = doc.vat_total().ok_or(QrError::MissingField("VAT total"))?;

    Ok(vec![
        seller_name.into_bytes(),
        vat_number.into_bytes(),
        format!("{issue_date}T{issue_time}Z").into_bytes(),
        total.into_bytes(),
        vat_total.into_bytes(),
    ])
}

/// Phase-1 QR: seller name, VAT number, timestamp, total with VAT, VAT total.
pub fn phase_one(doc: &UblDocument) -> Result<String, QrError> {
    let fields = base_fields(doc)?;
    Ok(STANDARD.encode(encode_tlv(&fields)?))
}

/// Phase-2 QR: the phase-1 tags followed by invoice hash, signature,
/// public key and certificate signature.
pub fn phase_two(doc: &UblDocument, signature: &SignatureArtifacts<'_>) -> Result<String, QrError> {
    let mut fields = base_fields(doc)?;
    fields.push(signature.invoice_hash.as_bytes().to_vec());
    fields.push(signature.signature_value.as_bytes().to_vec());
    fields.push(signature.public_key.to_vec());
    fields.push(signature.certificate_signature.to_vec());
    Ok(STANDARD.encode(encode_tlv(&fields)?))
}
