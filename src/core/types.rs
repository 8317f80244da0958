use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invoice line item as supplied by the caller.
///
/// Either `vat_percent` is 0.05 or 0.15, or it is zero and `vat_category`
/// names the zero-rate reason (O, Z or E). The tax engine enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// Line identifier, unique within the invoice.
    pub id: String,
    /// Item name.
    pub name: String,
    /// Invoiced quantity.
    pub quantity: Decimal,
    /// Unit price excluding VAT.
    pub tax_exclusive_price: Decimal,
    /// Per-unit discounts.
    pub discounts: Vec<Discount>,
    /// Additional taxes levied on the line extension amount.
    pub other_taxes: Vec<OtherTax>,
    /// VAT rate as a fraction (0.15 for 15%).
    pub vat_percent: Decimal,
    /// Zero-rate category, required when `vat_percent` is zero.
    pub vat_category: Option<VatCategory>,
    /// Exemption reason code (e.g. "VATEX-SA-29").
    pub exemption_reason_code: Option<String>,
    /// Exemption reason text.
    pub exemption_reason: Option<String>,
}

/// Price discount applied to a line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discount {
    pub amount: Decimal,
    pub reason: String,
}

/// Non-VAT tax applied to a line, as a fraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherTax {
    pub percent_amount: Decimal,
}

/// UNTDID 5305 tax category codes accepted by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VatCategory {
    /// S: Standard rate (5% or 15%).
    StandardRate,
    /// Z: Zero rated goods.
    ZeroRated,
    /// E: Exempt from tax.
    Exempt,
    /// O: Services outside scope of tax.
    NotSubjectToVat,
}

impl VatCategory {
    /// UNTDID 5305 code letter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StandardRate => "S",
            Self::ZeroRated => "Z",
            Self::Exempt => "E",
            Self::NotSubjectToVat => "O",
        }
    }

    /// Parse from UNTDID 5305 code string.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "S" => Some(Self::StandardRate),
            "Z" => Some(Self::ZeroRated),
            "E" => Some(Self::Exempt),
            "O" => Some(Self::NotSubjectToVat),
            _ => None,
        }
    }
}

/// Payment means codes (UNTDID 4461 subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// 10: Cash.
    Cash,
    /// 30: Credit.
    Credit,
    /// 42: Payment to bank account.
    BankAccount,
    /// 48: Bank card.
    BankCard,
}

impl PaymentMethod {
    pub fn code(&self) -> u16 {
        match self {
            Self::Cash => 10,
            Self::Credit => 30,
            Self::BankAccount => 42,
            Self::BankCard => 48,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            10 => Some(Self::Cash),
            30 => Some(Self::Credit),
            42 => Some(Self::BankAccount),
            48 => Some(Self::BankCard),
            _ => None,
        }
    }
}

/// Reference to the invoice a credit or debit note corrects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancelation {
    /// Serial number of the referenced invoice.
    pub canceled_serial_invoice_number: String,
    pub payment_method: PaymentMethod,
    /// Reason for issuing the note.
    pub reason: String,
}

/// Optional delivery and payment details on a plain invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashDetails {
    pub actual_delivery_date: Option<NaiveDate>,
    pub latest_delivery_date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
}

/// Invoice, credit note or debit note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocumentKind {
    Invoice(CashDetails),
    CreditNote(Cancelation),
    DebitNote(Cancelation),
}

impl DocumentKind {
    /// UNTDID 1001 code used in `cbc:InvoiceTypeCode`.
    pub fn type_code(&self) -> u16 {
        match self {
            Self::Invoice(_) => 388,
            Self::CreditNote(_) => 381,
            Self::DebitNote(_) => 383,
        }
    }

    pub fn cancelation(&self) -> Option<&Cancelation> {
        match self {
            Self::Invoice(_) => None,
            Self::CreditNote(c) | Self::DebitNote(c) => Some(c),
        }
    }
}

/// Buyer details, mandatory on standard (B2B) invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub buyer_name: String,
    pub vat_number: String,
    pub street: String,
    pub building_number: String,
    pub city_subdivision: Option<String>,
    pub city: String,
    pub postal_zone: String,
    /// ISO 3166-1 alpha-2.
    pub country_code: String,
}

/// Simplified (B2C) or standard (B2B) invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InvoiceVariant {
    Simplified(DocumentKind),
    Standard {
        customer: CustomerInfo,
        kind: DocumentKind,
    },
}

impl InvoiceVariant {
    pub fn kind(&self) -> &DocumentKind {
        match self {
            Self::Simplified(kind) | Self::Standard { kind, .. } => kind,
        }
    }

    pub fn customer(&self) -> Option<&CustomerInfo> {
        match self {
            Self::Simplified(_) => None,
            Self::Standard { customer, .. } => Some(customer),
        }
    }

    pub fn is_simplified(&self) -> bool {
        matches!(self, Self::Simplified(_))
    }

    /// Seven-character `name` attribute of `cbc:InvoiceTypeCode`.
    pub fn transaction_code(&self) -> &'static str {
        match self {
            Self::Simplified(_) => "0200000",
            Self::Standard { .. } => "0100000",
        }
    }
}

/// Everything needed to assemble one invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceProps {
    /// Invoice serial number (e.g. "SME00023").
    pub serial_number: String,
    /// Invoice counter value (ICV), strictly increasing per device.
    pub counter: u64,
    pub issue_date: NaiveDate,
    pub issue_time: NaiveTime,
    /// Previous invoice hash (PIH).
    pub previous_invoice_hash: String,
    pub seller: EgsIdentity,
    pub line_items: Vec<LineItem>,
    pub variant: InvoiceVariant,
}

/// Branch address of the EGS unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub city_subdivision: String,
    pub street: String,
    pub plot_identification: String,
    pub building: String,
    pub postal_zone: String,
}

/// Identity of the e-invoicing generation solution (EGS) unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgsIdentity {
    /// Device UUID.
    pub uuid: Uuid,
    /// Common name used in the CSR subject.
    pub custom_id: String,
    /// Model or version of the solution.
    pub model: String,
    /// Commercial registration number.
    pub crn_number: String,
    /// Registered taxpayer name.
    pub vat_name: String,
    /// 15-digit VAT registration number.
    pub vat_number: String,
    pub branch_name: String,
    pub branch_industry: String,
    pub location: Location,
}

/// Platform environment the EGS unit talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Simulation,
    Production,
}

impl Environment {
    /// Certificate template name carried in the CSR.
    pub fn certificate_template(&self) -> &'static str {
        match self {
            Self::Development => "TSTZATCA-Code-Signing",
            Self::Simulation => "PREZATCA-Code-Signing",
            Self::Production => "ZATCA-Code-Signing",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Development => "https://gw-fatoora.zatca.gov.sa/e-invoicing/developer-portal",
            Self::Simulation => "https://gw-fatoora.zatca.gov.sa/e-invoicing/simulation",
            Self::Production => "https://gw-fatoora.zatca.gov.sa/e-invoicing/core",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "development" | "sandbox" => Some(Self::Development),
            "simulation" => Some(Self::Simulation),
            "production" => Some(Self::Production),
            _ => None,
        }
    }
}

/// Onboarding state of an EGS unit. Transitions are monotonic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum CertificateState {
    #[default]
    Uninitialized,
    KeysGenerated,
    ComplianceCertIssued,
    ComplianceVerified,
    ProductionCertIssued,
}

/// Which certificate an operation signs or authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificatePhase {
    Compliance,
    Production,
}

impl std::fmt::Display for CertificatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compliance => write!(f, "compliance"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// The six compliance-check invoices, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComplianceStep {
    StandardDebit,
    StandardInvoice,
    StandardCredit,
    SimplifiedDebit,
    SimplifiedInvoice,
    SimplifiedCredit,
}

impl ComplianceStep {
    /// All steps in the fixed submission order.
    pub const ORDER: [ComplianceStep; 6] = [
        Self::StandardDebit,
        Self::StandardInvoice,
        Self::StandardCredit,
        Self::SimplifiedDebit,
        Self::SimplifiedInvoice,
        Self::SimplifiedCredit,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::StandardDebit => "standard-debit",
            Self::StandardInvoice => "standard-invoice",
            Self::StandardCredit => "standard-credit",
            Self::SimplifiedDebit => "simplified-debit",
            Self::SimplifiedInvoice => "simplified-invoice",
            Self::SimplifiedCredit => "simplified-credit",
        }
    }
}

impl std::fmt::Display for ComplianceStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
