use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use der::asn1::{Any, ObjectIdentifier};
use der::{Decode, Encode, Tag, Tagged};
use primitive_types::U256;
use x509_cert::name::Name;

use super::{hex_base64_sha256, signing_error};
use crate::core::FatooraError;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// An X.509 signing certificate (CSID) as issued by the platform.
///
/// Keeps the base64 body text verbatim: the certificate hash and the API
/// credentials are computed over that text, not over a re-encoding.
#[derive(Clone)]
pub struct Certificate {
    body: String,
    parsed: x509_cert::Certificate,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("serial_number", &self.serial_number().ok())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl Certificate {
    /// Parse a PEM certificate or its bare base64 body.
    pub fn parse(input: &str) -> Result<Self, FatooraError> {
        let body: String = input
            .replace(PEM_BEGIN, "")
            .replace(PEM_END, "")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let der = STANDARD
            .decode(&body)
            .map_err(|e| signing_error("certificate is not valid base64", e))?;
        let parsed = x509_cert::Certificate::from_der(&der)
            .map_err(|e| signing_error("malformed X.509 certificate", e))?;
        Ok(Self { body, parsed })
    }

    /// Decode the `binarySecurityToken` the platform returns: base64 of the
    /// certificate's base64 body.
    pub fn from_binary_security_token(token: &str) -> Result<Self, FatooraError> {
        let bytes = STANDARD
            .decode(token.trim())
            .map_err(|e| signing_error("security token is not valid base64", e))?;
        let body = String::from_utf8(bytes)
            .map_err(|e| signing_error("security token is not UTF-8", e))?;
        Self::parse(&body)
    }

    /// Base64 DER body, without PEM armor.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Base64 of the body text; the form used in API credentials.
    pub fn binary_security_token(&self) -> String {
        STANDARD.encode(self.body.as_bytes())
    }

    pub fn to_pem(&self) -> String {
        let mut pem = String::from(PEM_BEGIN);
        pem.push('\n');
        for chunk in self.body.as_bytes().chunks(64) {
            pem.push_str(&String::from_utf8_lossy(chunk));
            pem.push('\n');
        }
        pem.push_str(PEM_END);
        pem.push('\n');
        pem
    }

    /// base64(hex(SHA-256(body text))).
    pub fn hash(&self) -> String {
        hex_base64_sha256(self.body.as_bytes())
    }

    /// Issuer DN, most specific RDN first, joined with ", ".
    pub fn issuer(&self) -> String {
        format_name(&self.parsed.tbs_certificate.issuer)
    }

    /// Serial number in decimal.
    pub fn serial_number(&self) -> Result<String, FatooraError> {
        let bytes = self.parsed.tbs_certificate.serial_number.as_bytes();
        if bytes.len() > 32 {
            return Err(FatooraError::Signing(format!(
                "certificate serial number is {} bytes long",
                bytes.len()
            )));
        }
        Ok(U256::from_big_endian(bytes).to_string())
    }

    /// DER SubjectPublicKeyInfo.
    pub fn public_key(&self) -> Result<Vec<u8>, FatooraError> {
        self.parsed
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| signing_error("cannot encode public key", e))
    }

    /// Raw bytes of the certificate's own signature.
    pub fn signature(&self) -> &[u8] {
        self.parsed.signature.raw_bytes()
    }

    /// Everything the signed properties and QR code need, in one go.
    pub fn info(&self) -> Result<CertificateInfo, FatooraError> {
        Ok(CertificateInfo {
            hash: self.hash(),
            issuer: self.issuer(),
            serial_number: self.serial_number()?,
            public_key: self.public_key()?,
            signature: self.signature().to_vec(),
        })
    }
}

/// Certificate metadata embedded in a signed invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub hash: String,
    pub issuer: String,
    pub serial_number: String,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

fn short_name(oid: &ObjectIdentifier) -> Option<&'static str> {
    Some(match oid.to_string().as_str() {
        "2.5.4.3" => "CN",
        "2.5.4.4" => "SN",
        "2.5.4.5" => "SERIALNUMBER",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "2.5.4.12" => "TITLE",
        "0.9.2342.19200300.100.1.25" => "DC",
        "0.9.2342.19200300.100.1.1" => "UID",
        "1.2.840.113549.1.9.1" => "E",
        _ => return None,
    })
}

fn string_value(value: &Any) -> Option<&str> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(value.value()).ok()
        }
        _ => None,
    }
}

pub(crate) fn format_name(name: &Name) -> String {
    name.0
        .iter()
        .rev()
        .flat_map(|rdn| rdn.0.iter())
        .map(|atv| {
            let key = short_name(&atv.oid)
                .map(str::to_string)
                .unwrap_or_else(|| atv.oid.to_string());
            match string_value(&atv.value) {
                Some(v) => format!("{key}={v}"),
                None => format!("{key}=#{}", hex::encode(atv.value.value())),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
