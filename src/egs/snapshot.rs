use serde::{Deserialize, Serialize};

use crate::core::{CertificateState, ComplianceStep, EgsIdentity, Environment};

/// Issued CSID as persisted: the token exactly as the platform returned it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsidRecord {
    pub binary_security_token: String,
    pub secret: String,
    pub request_id: String,
}

impl std::fmt::Debug for CsidRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsidRecord")
            .field("request_id", &self.request_id)
            .field("secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Exported onboarding state of one EGS unit.
///
/// Restoring a snapshot resumes onboarding where it stopped. The private key
/// is optional so that a unit can be restored for reporting on a machine
/// that holds only the certificate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    pub identity: EgsIdentity,
    pub environment: Environment,
    pub state: CertificateState,
    /// SEC1 PEM.
    pub private_key: Option<String>,
    pub csr: Option<String>,
    pub compliance: Option<CsidRecord>,
    pub production: Option<CsidRecord>,
    #[serde(default)]
    pub completed_steps: Vec<ComplianceStep>,
}

impl std::fmt::Debug for LifecycleSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleSnapshot")
            .field("identity", &self.identity)
            .field("environment", &self.environment)
            .field("state", &self.state)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("csr", &self.csr.is_some())
            .field("compliance", &self.compliance)
            .field("production", &self.production)
            .field("completed_steps", &self.completed_steps)
            .finish()
    }
}

impl LifecycleSnapshot {
    /// Whether the recorded state is backed by the artifacts it implies.
    pub fn is_consistent(&self) -> bool {
        use CertificateState::*;
        let all_steps = ComplianceStep::ORDER
            .iter()
            .all(|step| self.completed_steps.contains(step));
        match self.state {
            Uninitialized => self.csr.is_none() && self.compliance.is_none(),
            KeysGenerated => self.csr.is_some() && self.compliance.is_none(),
            ComplianceCertIssued => self.compliance.is_some() && self.production.is_none(),
            ComplianceVerified => self.compliance.is_some() && all_steps && self.production.is_none(),
            ProductionCertIssued => self.compliance.is_some() && self.production.is_some(),
        }
    }
}
