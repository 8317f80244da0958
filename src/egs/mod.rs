//! EGS unit onboarding: keys and CSR, compliance CSID, the six compliance
//! checks, production CSID, and reporting/clearance afterwards.
//!
//! ```no_run
//! # async fn onboard(
//! #     identity: fatoora::core::EgsIdentity,
//! #     invoices: fatoora::egs::ComplianceInvoices,
//! # ) -> Result<(), fatoora::core::FatooraError> {
//! use fatoora::api::{ApiConfig, FatooraClient};
//! use fatoora::core::Environment;
//! use fatoora::egs::EgsLifecycle;
//!
//! let client = FatooraClient::new(ApiConfig::for_environment(Environment::Simulation).map_err(fatoora::api::ApiError::from)?)?;
//! let mut egs = EgsLifecycle::new(identity, Environment::Simulation, client);
//! egs.generate_identity()?;
//! egs.request_compliance_certificate("123345").await?;
//! egs.run_compliance_checks(&invoices).await?;
//! let request_id = egs.compliance_request_id().unwrap_or_default().to_string();
//! egs.request_production_certificate(&request_id).await?;
//! let snapshot = egs.export()?;
//! # Ok(())
//! # }
//! ```

mod lifecycle;
mod snapshot;

pub use lifecycle::{
    ComplianceCheckRecord, ComplianceInvoices, EgsLifecycle, LifecycleOptions,
    verify_compliance_chain,
};
pub use snapshot::{CsidRecord, LifecycleSnapshot};
