use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::config::{ApiConfig, ConfigError};
use super::error::ApiError;

const ACCEPT_VERSION: &str = "V2";

/// HTTP Basic credentials derived from an issued CSID.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// base64 of the certificate's base64 body, as issued.
    pub binary_security_token: String,
    secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("binary_security_token", &self.binary_security_token)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    pub fn new(binary_security_token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            binary_security_token: binary_security_token.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// `Authorization` header value.
    pub fn basic_auth(&self) -> String {
        let pair = format!("{}:{}", self.binary_security_token, self.secret);
        format!("Basic {}", STANDARD.encode(pair))
    }
}

/// Certificate issuance response (compliance or production CSID).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsidResponse {
    #[serde(rename = "binarySecurityToken")]
    pub binary_security_token: String,
    pub secret: String,
    #[serde(rename = "requestID", deserialize_with = "string_or_number")]
    pub request_id: String,
    #[serde(
        rename = "dispositionMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub disposition_message: Option<String>,
}

impl std::fmt::Debug for CsidResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsidResponse")
            .field("request_id", &self.request_id)
            .field("disposition_message", &self.disposition_message)
            .field("secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl CsidResponse {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.binary_security_token.clone(), self.secret.clone())
    }
}

/// Signed invoice as submitted for compliance check, reporting or clearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSubmission {
    pub invoice_hash: String,
    pub uuid: String,
    /// base64 of the signed XML.
    pub invoice: String,
}

impl InvoiceSubmission {
    pub fn new(signed_xml: &str, invoice_hash: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            invoice_hash: invoice_hash.into(),
            uuid: uuid.into(),
            invoice: STANDARD.encode(signed_xml),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationMessage {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub message: Option<String>,
    pub status: Option<String>,
}

impl std::fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = self.message.as_deref().unwrap_or("no message");
        match &self.code {
            Some(code) => write!(f, "[{code}] {message}"),
            None => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationResults {
    #[serde(deserialize_with = "one_or_many")]
    pub info_messages: Vec<ValidationMessage>,
    #[serde(deserialize_with = "one_or_many")]
    pub warning_messages: Vec<ValidationMessage>,
    #[serde(deserialize_with = "one_or_many")]
    pub error_messages: Vec<ValidationMessage>,
    pub status: Option<String>,
}

/// Compliance check, reporting or clearance result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    #[serde(default)]
    pub validation_results: ValidationResults,
    #[serde(default)]
    pub reporting_status: Option<String>,
    #[serde(default)]
    pub clearance_status: Option<String>,
    /// base64 of the cleared invoice XML (clearance only).
    #[serde(default)]
    pub cleared_invoice: Option<String>,
}

impl SubmissionResponse {
    pub fn is_rejected(&self) -> bool {
        self.validation_results.status.as_deref() == Some("ERROR")
            || self.reporting_status.as_deref() == Some("NOT_REPORTED")
            || self.clearance_status.as_deref() == Some("NOT_CLEARED")
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.validation_results
            .error_messages
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

/// Calls the onboarding lifecycle makes against the platform.
#[async_trait]
pub trait ComplianceApi: Send + Sync {
    /// `POST /compliance`: exchange a CSR and OTP for a compliance CSID.
    async fn issue_compliance_csid(&self, csr_pem: &str, otp: &str)
    -> Result<CsidResponse, ApiError>;

    /// `POST /compliance/invoices`
    async fn check_compliance_invoice(
        &self,
        credentials: &Credentials,
        invoice: &InvoiceSubmission,
    ) -> Result<SubmissionResponse, ApiError>;

    /// `POST /production/csids`, authenticated with the compliance CSID.
    async fn issue_production_csid(
        &self,
        credentials: &Credentials,
        compliance_request_id: &str,
    ) -> Result<CsidResponse, ApiError>;

    /// `POST /invoices/reporting/single` (simplified invoices).
    async fn report_invoice(
        &self,
        credentials: &Credentials,
        invoice: &InvoiceSubmission,
    ) -> Result<SubmissionResponse, ApiError>;

    /// `POST /invoices/clearance/single` (standard invoices).
    async fn clear_invoice(
        &self,
        credentials: &Credentials,
        invoice: &InvoiceSubmission,
    ) -> Result<SubmissionResponse, ApiError>;
}

/// reqwest-backed [`ComplianceApi`].
#[derive(Debug, Clone)]
pub struct FatooraClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl FatooraClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("accept-version", HeaderValue::from_static(ACCEPT_VERSION));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|_| ConfigError::InvalidLanguage(config.accept_language.clone()))?,
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|source| ApiError::Network {
                endpoint: config.base_url.to_string(),
                source,
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Send and read the whole body, bounded by the configured timeout.
    async fn send(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, String), ApiError> {
        tracing::debug!(endpoint, environment = ?self.config.environment, "sending request");
        let timeout_secs = self.config.timeout_secs;
        let timeout = || ApiError::Timeout {
            endpoint: endpoint.to_string(),
            timeout_secs,
        };

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };
        match tokio::time::timeout(Duration::from_secs(timeout_secs), exchange).await {
            Err(_) => Err(timeout()),
            Ok(Err(e)) if e.is_timeout() => Err(timeout()),
            Ok(Err(source)) => Err(ApiError::Network {
                endpoint: endpoint.to_string(),
                source,
            }),
            Ok(Ok(pair)) => Ok(pair),
        }
    }

    async fn request_csid(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<CsidResponse, ApiError> {
        let (status, body) = self.send(endpoint, request).await?;
        if status != StatusCode::OK {
            tracing::warn!(endpoint, status = status.as_u16(), "certificate request refused");
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        parse_body(endpoint, &body)
    }

    async fn submit(
        &self,
        path: &str,
        credentials: &Credentials,
        invoice: &InvoiceSubmission,
        clearance_status: Option<&'static str>,
    ) -> Result<SubmissionResponse, ApiError> {
        let endpoint = self.config.endpoint(path);
        let mut request = self
            .client
            .post(&endpoint)
            .header(AUTHORIZATION, credentials.basic_auth())
            .json(invoice);
        if let Some(flag) = clearance_status {
            request = request.header("Clearance-Status", flag);
        }
        let (status, body) = self.send(&endpoint, request).await?;
        classify_submission(&endpoint, status.as_u16(), body)
    }
}

#[async_trait]
impl ComplianceApi for FatooraClient {
    async fn issue_compliance_csid(
        &self,
        csr_pem: &str,
        otp: &str,
    ) -> Result<CsidResponse, ApiError> {
        let endpoint = self.config.endpoint("/compliance");
        let request = self
            .client
            .post(&endpoint)
            .header("OTP", otp)
            .json(&serde_json::json!({ "csr": STANDARD.encode(csr_pem) }));
        self.request_csid(&endpoint, request).await
    }

    async fn check_compliance_invoice(
        &self,
        credentials: &Credentials,
        invoice: &InvoiceSubmission,
    ) -> Result<SubmissionResponse, ApiError> {
        self.submit("/compliance/invoices", credentials, invoice, None)
            .await
    }

    async fn issue_production_csid(
        &self,
        credentials: &Credentials,
        compliance_request_id: &str,
    ) -> Result<CsidResponse, ApiError> {
        let endpoint = self.config.endpoint("/production/csids");
        let request = self
            .client
            .post(&endpoint)
            .header(AUTHORIZATION, credentials.basic_auth())
            .json(&serde_json::json!({ "compliance_request_id": compliance_request_id }));
        self.request_csid(&endpoint, request).await
    }

    async fn report_invoice(
        &self,
        credentials: &Credentials,
        invoice: &InvoiceSubmission,
    ) -> Result<SubmissionResponse, ApiError> {
        self.submit("/invoices/reporting/single", credentials, invoice, Some("0"))
            .await
    }

    async fn clear_invoice(
        &self,
        credentials: &Credentials,
        invoice: &InvoiceSubmission,
    ) -> Result<SubmissionResponse, ApiError> {
        self.submit("/invoices/clearance/single", credentials, invoice, Some("1"))
            .await
    }
}

fn parse_body<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Deserialization {
        endpoint: endpoint.to_string(),
        body: body.to_string(),
        source,
    })
}

/// 200 and 202 succeed unless the report itself says the invoice was
/// refused; other statuses become `Rejected` when they carry a report.
fn classify_submission(
    endpoint: &str,
    status: u16,
    body: String,
) -> Result<SubmissionResponse, ApiError> {
    let rejected = |response: &SubmissionResponse, body: String| ApiError::Rejected {
        endpoint: endpoint.to_string(),
        status,
        messages: response.error_messages(),
        body,
    };

    if matches!(status, 200 | 202) {
        let response: SubmissionResponse = parse_body(endpoint, &body)?;
        if response.is_rejected() {
            tracing::warn!(endpoint, status, "submission rejected");
            return Err(rejected(&response, body));
        }
        if !response.validation_results.warning_messages.is_empty() {
            tracing::debug!(
                endpoint,
                warnings = response.validation_results.warning_messages.len(),
                "submission accepted with warnings"
            );
        }
        return Ok(response);
    }

    tracing::warn!(endpoint, status, "submission failed");
    match serde_json::from_str::<SubmissionResponse>(&body) {
        Ok(response)
            if response.is_rejected() || !response.validation_results.error_messages.is_empty() =>
        {
            Err(rejected(&response, body))
        }
        _ => Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status,
            body,
        }),
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

/// The gateway sends a bare object instead of a one-element array at times.
fn one_or_many<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<ValidationMessage>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<ValidationMessage>),
        One(ValidationMessage),
        Null(()),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(v) => v,
        OneOrMany::One(m) => vec![m],
        OneOrMany::Null(()) => Vec::new(),
    })
}
