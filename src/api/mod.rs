//! Tax-authority (FATOORA gateway) HTTP API.
//!
//! [`ComplianceApi`] is the seam the onboarding lifecycle talks to;
//! [`FatooraClient`] implements it with reqwest. Nothing here retries.

mod client;
mod config;
mod error;

pub use client::{
    ComplianceApi, Credentials, CsidResponse, FatooraClient, InvoiceSubmission,
    SubmissionResponse, ValidationMessage, ValidationResults,
};
pub use config::{ApiConfig, ConfigError};
pub use error::ApiError;
