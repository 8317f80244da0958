use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::certificate::Certificate;
use super::hex_base64_sha256;
use super::keys::PrivateKey;
use crate::core::FatooraError;
use crate::xml::qr::{self, SignatureArtifacts};
use crate::xml::{
    QR_PLACEHOLDER, UBL_EXTENSIONS_PLACEHOLDER, UblDocument, XmlDocument, c14n, hash_invoice,
};

const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";
const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const SHA256_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const EXC_C14N_URI: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const ECDSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
const XPATH_URI: &str = "http://www.w3.org/TR/1999/REC-xpath-19991116";

const EXCLUDED_FROM_DIGEST: [&str; 3] = [
    "not(//ancestor-or-self::ext:UBLExtensions)",
    "not(//ancestor-or-self::cac:Signature)",
    "not(//ancestor-or-self::cac:AdditionalDocumentReference[cbc:ID='QR'])",
];

/// Column of `xades:SignedProperties` once the signature is in place.
const SIGNED_PROPERTIES_INDENT: usize = 36;

const SIGNING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Result of signing an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInvoice {
    /// The signed UBL document with signature extension and phase-2 QR.
    pub xml: String,
    /// Base64 invoice hash; the next invoice's previous invoice hash.
    pub invoice_hash: String,
    /// Base64 DER ECDSA signature over the invoice hash bytes.
    pub signature_value: String,
    /// Base64 body of the signing certificate.
    pub signing_certificate: String,
    /// Base64 TLV QR payload embedded in the document.
    pub qr: String,
}

/// Swappable signing capability.
pub trait InvoiceSigner: Send + Sync {
    fn sign(
        &self,
        invoice_xml: &str,
        certificate: &Certificate,
        key: &PrivateKey,
    ) -> Result<SignedInvoice, FatooraError>;
}

/// XAdES-BES enveloped signer.
///
/// Uses the current UTC time as signing time unless one is fixed with
/// [`XadesSigner::at`]. ECDSA nonces are derived per RFC 6979, so with a
/// fixed signing time the output is fully deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct XadesSigner {
    signing_time: Option<NaiveDateTime>,
}

impl XadesSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(signing_time: NaiveDateTime) -> Self {
        Self {
            signing_time: Some(signing_time),
        }
    }
}

impl InvoiceSigner for XadesSigner {
    fn sign(
        &self,
        invoice_xml: &str,
        certificate: &Certificate,
        key: &PrivateKey,
    ) -> Result<SignedInvoice, FatooraError> {
        for placeholder in [UBL_EXTENSIONS_PLACEHOLDER, QR_PLACEHOLDER] {
            if !invoice_xml.contains(placeholder) {
                return Err(FatooraError::Xml(format!(
                    "invoice has no {placeholder} placeholder"
                )));
            }
        }

        let invoice_hash = hash_invoice(invoice_xml)?;
        let cert = certificate.info()?;
        let signature_value = STANDARD.encode(key.sign(invoice_hash.as_bytes())?);
        let signing_time = self
            .signing_time
            .unwrap_or_else(|| Utc::now().naive_utc())
            .format(SIGNING_TIME_FORMAT)
            .to_string();

        let properties = SignedProperties {
            signing_time: &signing_time,
            certificate_hash: &cert.hash,
            issuer: &cert.issuer,
            serial_number: &cert.serial_number,
        };
        let invoice_hash_b64 = invoice_hash.to_base64();
        let extension = extension_block(&SignatureBlock {
            invoice_hash: &invoice_hash_b64,
            properties_hash: &properties.digest()?,
            signature_value: &signature_value,
            certificate: certificate.body(),
            properties: &properties,
        });
        let with_extension = invoice_xml.replacen(UBL_EXTENSIONS_PLACEHOLDER, &extension, 1);

        let qr = qr::phase_two(
            &UblDocument::parse(&with_extension)?,
            &SignatureArtifacts {
                invoice_hash: &invoice_hash_b64,
                signature_value: &signature_value,
                public_key: &cert.public_key,
                certificate_signature: &cert.signature,
            },
        )?;
        let xml = fix_signed_properties_indentation(&with_extension.replacen(QR_PLACEHOLDER, &qr, 1));

        tracing::debug!(invoice_hash = %invoice_hash_b64, "signed invoice");
        Ok(SignedInvoice {
            xml,
            invoice_hash: invoice_hash_b64,
            signature_value,
            signing_certificate: certificate.body().to_string(),
            qr,
        })
    }
}

struct SignedProperties<'a> {
    signing_time: &'a str,
    certificate_hash: &'a str,
    issuer: &'a str,
    serial_number: &'a str,
}

impl SignedProperties<'_> {
    /// Element lines with their nesting depth below `xades:SignedProperties`.
    fn lines(&self, declare_namespaces: bool) -> Vec<(usize, String)> {
        let (xades, ds) = if declare_namespaces {
            (format!(" xmlns:xades=\"{XADES_NS}\""), format!(" xmlns:ds=\"{DSIG_NS}\""))
        } else {
            (String::new(), String::new())
        };
        let issuer = c14n::escape_text(self.issuer);
        vec![
            (0, format!("<xades:SignedProperties{xades} Id=\"xadesSignedProperties\">")),
            (1, "<xades:SignedSignatureProperties>".into()),
            (2, format!("<xades:SigningTime>{}</xades:SigningTime>", self.signing_time)),
            (2, "<xades:SigningCertificate>".into()),
            (3, "<xades:Cert>".into()),
            (4, "<xades:CertDigest>".into()),
            (5, format!("<ds:DigestMethod{ds} Algorithm=\"{SHA256_URI}\"></ds:DigestMethod>")),
            (5, format!("<ds:DigestValue{ds}>{}</ds:DigestValue>", self.certificate_hash)),
            (4, "</xades:CertDigest>".into()),
            (4, "<xades:IssuerSerial>".into()),
            (5, format!("<ds:X509IssuerName{ds}>{issuer}</ds:X509IssuerName>")),
            (5, format!("<ds:X509SerialNumber{ds}>{}</ds:X509SerialNumber>", self.serial_number)),
            (4, "</xades:IssuerSerial>".into()),
            (3, "</xades:Cert>".into()),
            (2, "</xades:SigningCertificate>".into()),
            (1, "</xades:SignedSignatureProperties>".into()),
            (0, "</xades:SignedProperties>".into()),
        ]
    }

    /// The standalone fragment exactly as verifiers canonicalize it out of
    /// the signed document.
    fn fragment(&self) -> String {
        let mut out = String::new();
        for (i, (depth, text)) in self.lines(true).into_iter().enumerate() {
            if i > 0 {
                out.push('\n');
                out.push_str(&" ".repeat(SIGNED_PROPERTIES_INDENT + 4 * depth));
            }
            out.push_str(&text);
        }
        out
    }

    fn digest(&self) -> Result<String, FatooraError> {
        let doc = XmlDocument::parse(&self.fragment())?;
        Ok(hex_base64_sha256(c14n::canonicalize(&doc).as_bytes()))
    }
}

struct SignatureBlock<'a> {
    invoice_hash: &'a str,
    properties_hash: &'a str,
    signature_value: &'a str,
    certificate: &'a str,
    properties: &'a SignedProperties<'a>,
}

#[derive(Default)]
struct Lines(String);

impl Lines {
    fn line(&mut self, indent: usize, text: impl AsRef<str>) -> &mut Self {
        self.0.push('\n');
        self.0.push_str(&" ".repeat(indent));
        self.0.push_str(text.as_ref());
        self
    }
}

/// The `ext:UBLExtension` that replaces the extensions placeholder.
///
/// Everything inside `ds:Object` is written four columns deeper than it
/// ends up; [`fix_signed_properties_indentation`] pulls it back.
fn extension_block(block: &SignatureBlock<'_>) -> String {
    let mut l = Lines::default();
    l.line(8, "<ext:UBLExtension>")
        .line(12, "<ext:ExtensionURI>urn:oasis:names:specification:ubl:dsig:enveloped:xades</ext:ExtensionURI>")
        .line(12, "<ext:ExtensionContent>")
        .line(16, "<sig:UBLDocumentSignatures xmlns:sig=\"urn:oasis:names:specification:ubl:schema:xsd:CommonSignatureComponents-2\" xmlns:sac=\"urn:oasis:names:specification:ubl:schema:xsd:SignatureAggregateComponents-2\" xmlns:sbc=\"urn:oasis:names:specification:ubl:schema:xsd:SignatureBasicComponents-2\">")
        .line(20, "<sac:SignatureInformation>")
        .line(24, "<cbc:ID>urn:oasis:names:specification:ubl:signature:1</cbc:ID>")
        .line(24, "<sbc:ReferencedSignatureID>urn:oasis:names:specification:ubl:signature:Invoice</sbc:ReferencedSignatureID>")
        .line(24, format!("<ds:Signature xmlns:ds=\"{DSIG_NS}\" Id=\"signature\">"))
        .line(28, "<ds:SignedInfo>")
        .line(32, format!("<ds:CanonicalizationMethod Algorithm=\"{EXC_C14N_URI}\"/>"))
        .line(32, format!("<ds:SignatureMethod Algorithm=\"{ECDSA_SHA256_URI}\"/>"))
        .line(32, "<ds:Reference Id=\"invoiceSignedData\" URI=\"\">")
        .line(36, "<ds:Transforms>");
    for xpath in EXCLUDED_FROM_DIGEST {
        l.line(40, format!("<ds:Transform Algorithm=\"{XPATH_URI}\">"))
            .line(44, format!("<ds:XPath>{xpath}</ds:XPath>"))
            .line(40, "</ds:Transform>");
    }
    l.line(40, format!("<ds:Transform Algorithm=\"{EXC_C14N_URI}\"/>"))
        .line(36, "</ds:Transforms>")
        .line(36, format!("<ds:DigestMethod Algorithm=\"{SHA256_URI}\"/>"))
        .line(36, format!("<ds:DigestValue>{}</ds:DigestValue>", block.invoice_hash))
        .line(32, "</ds:Reference>")
        .line(32, "<ds:Reference Type=\"http://www.w3.org/2000/09/xmldsig#SignatureProperties\" URI=\"#xadesSignedProperties\">")
        .line(36, format!("<ds:DigestMethod Algorithm=\"{SHA256_URI}\"/>"))
        .line(36, format!("<ds:DigestValue>{}</ds:DigestValue>", block.properties_hash))
        .line(32, "</ds:Reference>")
        .line(28, "</ds:SignedInfo>")
        .line(28, format!("<ds:SignatureValue>{}</ds:SignatureValue>", block.signature_value))
        .line(28, "<ds:KeyInfo>")
        .line(32, "<ds:X509Data>")
        .line(36, format!("<ds:X509Certificate>{}</ds:X509Certificate>", block.certificate))
        .line(32, "</ds:X509Data>")
        .line(28, "</ds:KeyInfo>")
        .line(28, "<ds:Object>")
        .line(36, format!("<xades:QualifyingProperties xmlns:xades=\"{XADES_NS}\" Target=\"signature\">"));
    for (depth, text) in block.properties.lines(false) {
        l.line(SIGNED_PROPERTIES_INDENT + 4 + 4 * depth, text);
    }
    l.line(36, "</xades:QualifyingProperties>")
        .line(28, "</ds:Object>")
        .line(24, "</ds:Signature>")
        .line(20, "</sac:SignatureInformation>")
        .line(16, "</sig:UBLDocumentSignatures>")
        .line(12, "</ext:ExtensionContent>")
        .line(8, "</ext:UBLExtension>");
    l.0.push_str("\n    ");
    l.0
}

/// Shift every line strictly between `<ds:Object>` and `</ds:Object>` left
/// by up to four spaces.
fn fix_signed_properties_indentation(xml: &str) -> String {
    let Some(start) = xml.find("<ds:Object>") else {
        return xml.to_string();
    };
    let Some(close) = xml[start..].find("</ds:Object>") else {
        return xml.to_string();
    };
    let end = start + close + "</ds:Object>".len();

    let lines: Vec<&str> = xml[start..end].split('\n').collect();
    let last = lines.len() - 1;
    let fixed: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || i == last {
                return *line;
            }
            let spaces = line.len() - line.trim_start_matches(' ').len();
            &line[spaces.min(4)..]
        })
        .collect();

    let mut out = String::with_capacity(xml.len());
    out.push_str(&xml[..start]);
    out.push_str(&fixed.join("\n"));
    out.push_str(&xml[end..]);
    out
}
