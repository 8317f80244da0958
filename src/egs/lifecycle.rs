use std::collections::BTreeMap;

use crate::api::{ComplianceApi, Credentials, CsidResponse, InvoiceSubmission, SubmissionResponse};
use crate::core::*;
use crate::signing::{
    Certificate, InvoiceSigner, KeyGenerator, NativeKeyGenerator, PrivateKey, SignedInvoice,
    XadesSigner,
};
use crate::xml::{UblDocument, hash_invoice};

use super::snapshot::{CsidRecord, LifecycleSnapshot};

/// Signed compliance invoices keyed by the step they are submitted for.
pub type ComplianceInvoices = BTreeMap<ComplianceStep, SignedInvoice>;

/// Tunables of [`EgsLifecycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Check ICV/PIH continuity of the six compliance invoices before
    /// submitting any of them.
    pub verify_chain: bool,
    /// Solution name written into the CSR serial number.
    pub solution_name: String,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            verify_chain: true,
            solution_name: "fatoora".into(),
        }
    }
}

/// Outcome of one accepted compliance step.
///
/// Keeps the exact signed bytes that were submitted; a retry must resend
/// them unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceCheckRecord {
    pub step: ComplianceStep,
    pub signed: SignedInvoice,
    pub response: SubmissionResponse,
}

impl ComplianceCheckRecord {
    pub fn invoice_hash(&self) -> &str {
        &self.signed.invoice_hash
    }
}

#[derive(Clone)]
struct IssuedCsid {
    certificate: Certificate,
    record: CsidRecord,
}

impl IssuedCsid {
    fn from_record(record: CsidRecord) -> Result<Self, FatooraError> {
        let certificate = Certificate::from_binary_security_token(&record.binary_security_token)?;
        Ok(Self {
            certificate,
            record,
        })
    }

    fn from_response(response: CsidResponse) -> Result<Self, FatooraError> {
        Self::from_record(CsidRecord {
            binary_security_token: response.binary_security_token,
            secret: response.secret,
            request_id: response.request_id,
        })
    }

    fn credentials(&self) -> Credentials {
        Credentials::new(
            self.record.binary_security_token.clone(),
            self.record.secret.clone(),
        )
    }
}

/// Onboarding state machine of one EGS unit.
///
/// `Uninitialized → KeysGenerated → ComplianceCertIssued →
/// ComplianceVerified → ProductionCertIssued`. Operations take `&mut self`;
/// a lifecycle must not be driven from two tasks at once.
pub struct EgsLifecycle<A: ComplianceApi> {
    identity: EgsIdentity,
    environment: Environment,
    api: A,
    key_generator: Box<dyn KeyGenerator>,
    signer: Box<dyn InvoiceSigner>,
    options: LifecycleOptions,
    state: CertificateState,
    private_key: Option<PrivateKey>,
    csr: Option<String>,
    compliance: Option<IssuedCsid>,
    production: Option<IssuedCsid>,
    completed_steps: Vec<ComplianceStep>,
}

impl<A: ComplianceApi> EgsLifecycle<A> {
    pub fn new(identity: EgsIdentity, environment: Environment, api: A) -> Self {
        Self {
            identity,
            environment,
            api,
            key_generator: Box::new(NativeKeyGenerator),
            signer: Box::new(XadesSigner::new()),
            options: LifecycleOptions::default(),
            state: CertificateState::Uninitialized,
            private_key: None,
            csr: None,
            compliance: None,
            production: None,
            completed_steps: Vec::new(),
        }
    }

    pub fn with_key_generator(mut self, key_generator: Box<dyn KeyGenerator>) -> Self {
        self.key_generator = key_generator;
        self
    }

    pub fn with_signer(mut self, signer: Box<dyn InvoiceSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> CertificateState {
        self.state
    }

    pub fn identity(&self) -> &EgsIdentity {
        &self.identity
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn csr(&self) -> Option<&str> {
        self.csr.as_deref()
    }

    pub fn certificate(&self, phase: CertificatePhase) -> Option<&Certificate> {
        self.issued(phase).map(|csid| &csid.certificate)
    }

    /// Request id of the compliance CSID, needed for production issuance.
    pub fn compliance_request_id(&self) -> Option<&str> {
        self.compliance.as_ref().map(|c| c.record.request_id.as_str())
    }

    pub fn completed_steps(&self) -> &[ComplianceStep] {
        &self.completed_steps
    }

    fn issued(&self, phase: CertificatePhase) -> Option<&IssuedCsid> {
        match phase {
            CertificatePhase::Compliance => self.compliance.as_ref(),
            CertificatePhase::Production => self.production.as_ref(),
        }
    }

    fn transition(&mut self, to: CertificateState) {
        tracing::info!(
            egs = %self.identity.custom_id,
            from = ?self.state,
            to = ?to,
            "certificate state changed"
        );
        self.state = to;
    }

    /// Generate the unit's key pair and CSR.
    pub fn generate_identity(&mut self) -> Result<(), FatooraError> {
        if self.state != CertificateState::Uninitialized {
            return Err(ChainStateError::InvalidTransition {
                operation: "generate identity",
                state: self.state,
            }
            .into());
        }
        let key = self.key_generator.generate_key()?;
        let csr = self.key_generator.generate_csr(
            &self.identity,
            &key,
            self.environment,
            &self.options.solution_name,
        )?;
        self.private_key = Some(key);
        self.csr = Some(csr);
        self.transition(CertificateState::KeysGenerated);
        Ok(())
    }

    /// Exchange the CSR and a portal OTP for the compliance CSID.
    pub async fn request_compliance_certificate(&mut self, otp: &str) -> Result<(), FatooraError> {
        let Some(csr) = self.csr.as_deref() else {
            return Err(ChainStateError::MissingCsr.into());
        };
        if self.state != CertificateState::KeysGenerated {
            return Err(ChainStateError::InvalidTransition {
                operation: "request compliance certificate",
                state: self.state,
            }
            .into());
        }

        let response = self.api.issue_compliance_csid(csr, otp).await?;
        self.compliance = Some(IssuedCsid::from_response(response)?);
        self.transition(CertificateState::ComplianceCertIssued);
        Ok(())
    }

    /// Submit the six compliance invoices, one at a time in
    /// [`ComplianceStep::ORDER`], stopping at the first failure.
    ///
    /// Missing steps are reported before anything is sent. The state only
    /// advances once every step has been accepted.
    pub async fn run_compliance_checks(
        &mut self,
        invoices: &ComplianceInvoices,
    ) -> Result<Vec<ComplianceCheckRecord>, FatooraError> {
        match self.state {
            CertificateState::Uninitialized | CertificateState::KeysGenerated => {
                return Err(ChainStateError::CertificateNotIssued {
                    phase: CertificatePhase::Compliance,
                }
                .into());
            }
            CertificateState::ComplianceCertIssued => {}
            state => {
                return Err(ChainStateError::InvalidTransition {
                    operation: "run compliance checks",
                    state,
                }
                .into());
            }
        }

        let missing: Vec<ComplianceStep> = ComplianceStep::ORDER
            .into_iter()
            .filter(|step| !invoices.contains_key(step))
            .collect();
        if !missing.is_empty() {
            return Err(ChainStateError::MissingComplianceSteps(missing).into());
        }
        if self.options.verify_chain {
            verify_compliance_chain(invoices)?;
        }

        let credentials = self.credentials(CertificatePhase::Compliance)?;

        self.completed_steps.clear();
        let mut records = Vec::with_capacity(ComplianceStep::ORDER.len());
        for step in ComplianceStep::ORDER {
            let Some(signed) = invoices.get(&step) else {
                return Err(ChainStateError::MissingComplianceSteps(vec![step]).into());
            };
            let submission = self.submission(signed)?;
            let response = self
                .api
                .check_compliance_invoice(&credentials, &submission)
                .await?;
            tracing::info!(step = %step, invoice_hash = %signed.invoice_hash, "compliance step accepted");
            self.completed_steps.push(step);
            records.push(ComplianceCheckRecord {
                step,
                signed: signed.clone(),
                response,
            });
        }

        self.transition(CertificateState::ComplianceVerified);
        Ok(records)
    }

    /// Exchange the verified compliance CSID for the production CSID.
    pub async fn request_production_certificate(
        &mut self,
        compliance_request_id: &str,
    ) -> Result<(), FatooraError> {
        match self.state {
            CertificateState::ComplianceVerified => {}
            CertificateState::ProductionCertIssued => {
                return Err(ChainStateError::InvalidTransition {
                    operation: "request production certificate",
                    state: self.state,
                }
                .into());
            }
            _ => {
                let missing = ComplianceStep::ORDER
                    .into_iter()
                    .filter(|step| !self.completed_steps.contains(step))
                    .collect();
                return Err(ChainStateError::MissingComplianceSteps(missing).into());
            }
        }

        let credentials = self.credentials(CertificatePhase::Compliance)?;
        let response = self
            .api
            .issue_production_csid(&credentials, compliance_request_id)
            .await?;
        self.production = Some(IssuedCsid::from_response(response)?);
        self.transition(CertificateState::ProductionCertIssued);
        Ok(())
    }

    /// API credentials of the `phase` CSID.
    fn credentials(&self, phase: CertificatePhase) -> Result<Credentials, ChainStateError> {
        self.issued(phase)
            .map(IssuedCsid::credentials)
            .ok_or(ChainStateError::CertificateNotIssued { phase })
    }

    /// Certificate and key for `phase`, both required.
    fn signing_material(
        &self,
        phase: CertificatePhase,
    ) -> Result<(&IssuedCsid, &PrivateKey), ChainStateError> {
        match (self.issued(phase), self.private_key.as_ref()) {
            (Some(csid), Some(key)) => Ok((csid, key)),
            (Some(_), None) => Err(ChainStateError::MissingPrivateKey { phase }),
            (None, _) => Err(ChainStateError::CertificateNotIssued { phase }),
        }
    }

    /// Sign an assembled invoice with the `phase` certificate.
    pub fn sign_invoice(
        &self,
        invoice_xml: &str,
        phase: CertificatePhase,
    ) -> Result<SignedInvoice, FatooraError> {
        let (csid, key) = self.signing_material(phase)?;
        self.signer.sign(invoice_xml, &csid.certificate, key)
    }

    /// Report a signed simplified invoice. Needs the production certificate
    /// and the private key.
    pub async fn report_invoice(
        &self,
        signed: &SignedInvoice,
    ) -> Result<SubmissionResponse, FatooraError> {
        let (csid, _) = self.signing_material(CertificatePhase::Production)?;
        let credentials = csid.credentials();
        let submission = self.submission(signed)?;
        Ok(self.api.report_invoice(&credentials, &submission).await?)
    }

    /// Submit a signed standard invoice for clearance.
    pub async fn clear_invoice(
        &self,
        signed: &SignedInvoice,
    ) -> Result<SubmissionResponse, FatooraError> {
        let (csid, _) = self.signing_material(CertificatePhase::Production)?;
        let credentials = csid.credentials();
        let submission = self.submission(signed)?;
        Ok(self.api.clear_invoice(&credentials, &submission).await?)
    }

    fn submission(&self, signed: &SignedInvoice) -> Result<InvoiceSubmission, FatooraError> {
        let uuid = UblDocument::parse(&signed.xml)?
            .uuid()
            .unwrap_or_else(|| self.identity.uuid.to_string());
        Ok(InvoiceSubmission::new(
            &signed.xml,
            signed.invoice_hash.clone(),
            uuid,
        ))
    }

    pub fn export(&self) -> Result<LifecycleSnapshot, FatooraError> {
        Ok(LifecycleSnapshot {
            identity: self.identity.clone(),
            environment: self.environment,
            state: self.state,
            private_key: self.private_key.as_ref().map(PrivateKey::to_pem).transpose()?,
            csr: self.csr.clone(),
            compliance: self.compliance.as_ref().map(|c| c.record.clone()),
            production: self.production.as_ref().map(|c| c.record.clone()),
            completed_steps: self.completed_steps.clone(),
        })
    }

    /// Resume from a snapshot with the default key generator and signer.
    pub fn restore(snapshot: LifecycleSnapshot, api: A) -> Result<Self, FatooraError> {
        if !snapshot.is_consistent() {
            return Err(ChainStateError::InvalidTransition {
                operation: "restore snapshot",
                state: snapshot.state,
            }
            .into());
        }
        let private_key = snapshot
            .private_key
            .as_deref()
            .map(PrivateKey::parse)
            .transpose()?;
        let compliance = snapshot.compliance.map(IssuedCsid::from_record).transpose()?;
        let production = snapshot.production.map(IssuedCsid::from_record).transpose()?;

        tracing::info!(
            egs = %snapshot.identity.custom_id,
            state = ?snapshot.state,
            "restored lifecycle"
        );
        Ok(Self {
            state: snapshot.state,
            private_key,
            csr: snapshot.csr,
            compliance,
            production,
            completed_steps: snapshot.completed_steps,
            ..Self::new(snapshot.identity, snapshot.environment, api)
        })
    }
}

/// Reject compliance invoices whose ICV/PIH do not form one chain in
/// submission order, or whose recorded hash does not match the document.
pub fn verify_compliance_chain(invoices: &ComplianceInvoices) -> Result<(), FatooraError> {
    let mut links: Vec<(ComplianceStep, HashChainLink)> = Vec::new();
    for step in ComplianceStep::ORDER {
        let Some(signed) = invoices.get(&step) else {
            continue;
        };
        let broken = |reason: String| ChainStateError::BrokenChain { step, reason };

        let doc = UblDocument::parse(&signed.xml)?;
        let counter = doc
            .counter()
            .ok_or_else(|| broken("invoice has no counter (ICV)".into()))?;
        let previous_invoice_hash = doc
            .previous_invoice_hash()
            .ok_or_else(|| broken("invoice has no previous invoice hash (PIH)".into()))?;
        if hash_invoice(&signed.xml)?.to_base64() != signed.invoice_hash {
            return Err(broken("recorded invoice hash does not match the document".into()).into());
        }

        let link = HashChainLink {
            counter,
            previous_invoice_hash,
            invoice_hash: signed.invoice_hash.clone(),
        };
        if let Some((_, prev)) = links.last() {
            verify_chain(&[prev.clone(), link.clone()]).map_err(|e| broken(e.to_string()))?;
        }
        links.push((step, link));
    }
    Ok(())
}
