use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{CertificatePhase, CertificateState, ComplianceStep};

/// Errors that can occur while computing, assembling, signing or submitting invoices.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FatooraError {
    /// One or more structural validation rules failed.
    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// Monetary computation rejected its input.
    #[error("computation error: {0}")]
    Computation(#[from] ComputationError),

    /// Lifecycle operation attempted in the wrong certificate/hash-chain state.
    #[error("chain state error: {0}")]
    ChainState(#[from] ChainStateError),

    /// Cryptographic primitive failure (key, certificate or signature).
    #[error("signing error: {0}")]
    Signing(String),

    /// XML parsing, canonicalization or splicing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// QR payload could not be built.
    #[error("QR error: {0}")]
    Qr(#[from] QrError),

    /// Tax-authority API failure.
    #[cfg(feature = "api")]
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),
}

impl FatooraError {
    /// Validation errors carried by this error, if any.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Path to the invalid field (e.g. "line_items[2].name").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
    /// Business rule ID if applicable (e.g. "BR-KSA-08").
    pub rule: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "[{}] {}: {}", rule, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl ValidationError {
    /// Create a validation error without a rule ID.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Create a validation error with a business rule ID.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}

/// Rejected input to the tax computation. Values are never clamped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputationError {
    #[error("{field} must not be negative (got {value})")]
    Negative { field: String, value: Decimal },

    #[error("{field}: zero-rated line requires a VAT category (O, Z or E)")]
    MissingVatCategory { field: String },

    #[error("{field}: unsupported VAT rate {value} (expected 0, 0.05 or 0.15)")]
    UnsupportedVatRate { field: String, value: Decimal },

    #[error("{field}: amount exceeds the representable decimal range")]
    Overflow { field: String },
}

/// Operation attempted before the certificate, key or chain state allows it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainStateError {
    #[error("cannot {operation} while in state {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: CertificateState,
    },

    #[error("no CSR has been generated; call generate_identity first")]
    MissingCsr,

    #[error("{phase} certificate is present but the private key is missing")]
    MissingPrivateKey { phase: CertificatePhase },

    #[error("{phase} certificate has not been issued yet")]
    CertificateNotIssued { phase: CertificatePhase },

    #[error("missing compliance steps: {}", format_steps(.0))]
    MissingComplianceSteps(Vec<ComplianceStep>),

    #[error("hash chain broken at {step}: {reason}")]
    BrokenChain { step: ComplianceStep, reason: String },

    #[error("invoice counter {got} does not follow {expected}")]
    CounterOutOfSequence { expected: u64, got: u64 },

    #[error("invoice {counter} references previous hash {found}, expected {expected}")]
    PreviousHashMismatch {
        counter: u64,
        expected: String,
        found: String,
    },
}

fn format_steps(steps: &[ComplianceStep]) -> String {
    steps
        .iter()
        .map(|s| s.key())
        .collect::<Vec<_>>()
        .join(", ")
}

/// QR payload construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QrError {
    #[error("invoice is missing {0}")]
    MissingField(&'static str),

    #[error("TLV tag {tag} value is {len} bytes and exceeds 255 bytes")]
    ValueTooLong { tag: u8, len: usize },

    #[error("QR payload is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("TLV record for tag {tag} is truncated at byte {offset}")]
    Truncated { tag: u8, offset: usize },
}
