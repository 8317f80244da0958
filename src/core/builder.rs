use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::{FatooraError, ValidationError};
use super::types::*;
use super::validation;

/// Builder for [`InvoiceProps`].
///
/// ```
/// use chrono::{NaiveDate, NaiveTime};
/// use fatoora::core::*;
/// use rust_decimal_macros::dec;
///
/// let seller = EgsIdentityBuilder::new("310175397400003", "Maximum Speed Tech Supply LTD")
///     .crn_number("1010010000")
///     .location(Location {
///         city: "Riyadh".into(),
///         city_subdivision: "Al Olaya".into(),
///         street: "Prince Sultan".into(),
///         plot_identification: "2322".into(),
///         building: "2322".into(),
///         postal_zone: "23333".into(),
///     })
///     .build();
///
/// let props = InvoiceBuilder::new(
///     "SME00001",
///     1,
///     NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
///     NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
/// )
/// .seller(seller)
/// .add_line(LineItemBuilder::new("1", "Coffee", dec!(2), dec!(10)).vat(dec!(0.15)).build())
/// .simplified(DocumentKind::Invoice(CashDetails::default()))
/// .build()
/// .unwrap();
///
/// assert_eq!(props.previous_invoice_hash, GENESIS_PREVIOUS_INVOICE_HASH);
/// ```
pub struct InvoiceBuilder {
    serial_number: String,
    counter: u64,
    issue_date: NaiveDate,
    issue_time: NaiveTime,
    previous_invoice_hash: String,
    seller: Option<EgsIdentity>,
    line_items: Vec<LineItem>,
    variant: Option<InvoiceVariant>,
}

impl InvoiceBuilder {
    /// Start an invoice. The previous invoice hash defaults to the genesis value.
    pub fn new(
        serial_number: impl Into<String>,
        counter: u64,
        issue_date: NaiveDate,
        issue_time: NaiveTime,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            counter,
            issue_date,
            issue_time,
            previous_invoice_hash: super::chain::GENESIS_PREVIOUS_INVOICE_HASH.to_string(),
            seller: None,
            line_items: Vec::new(),
            variant: None,
        }
    }

    /// Take counter and previous hash from a chain link.
    pub fn chained(
        serial_number: impl Into<String>,
        link: &super::chain::ChainLink,
        issue_date: NaiveDate,
        issue_time: NaiveTime,
    ) -> Self {
        Self::new(serial_number, link.counter, issue_date, issue_time)
            .previous_invoice_hash(link.previous_invoice_hash.clone())
    }

    pub fn previous_invoice_hash(mut self, hash: impl Into<String>) -> Self {
        self.previous_invoice_hash = hash.into();
        self
    }

    pub fn seller(mut self, seller: EgsIdentity) -> Self {
        self.seller = Some(seller);
        self
    }

    pub fn add_line(mut self, line: LineItem) -> Self {
        self.line_items.push(line);
        self
    }

    pub fn simplified(mut self, kind: DocumentKind) -> Self {
        self.variant = Some(InvoiceVariant::Simplified(kind));
        self
    }

    pub fn standard(mut self, customer: CustomerInfo, kind: DocumentKind) -> Self {
        self.variant = Some(InvoiceVariant::Standard { customer, kind });
        self
    }

    /// Build and validate the invoice properties.
    /// Returns all validation errors (not just the first).
    pub fn build(self) -> Result<InvoiceProps, FatooraError> {
        let props = self.build_unchecked()?;
        let errors = validation::validate_invoice_props(&props);
        if !errors.is_empty() {
            return Err(FatooraError::Validation(errors));
        }
        Ok(props)
    }

    /// Build without structural validation. Seller and variant are still required.
    pub fn build_unchecked(self) -> Result<InvoiceProps, FatooraError> {
        let mut missing = Vec::new();
        if self.seller.is_none() {
            missing.push(ValidationError::new("seller", "seller is required"));
        }
        if self.variant.is_none() {
            missing.push(ValidationError::new(
                "variant",
                "invoice must be simplified or standard",
            ));
        }
        let (Some(seller), Some(variant)) = (self.seller, self.variant) else {
            return Err(FatooraError::Validation(missing));
        };

        Ok(InvoiceProps {
            serial_number: self.serial_number,
            counter: self.counter,
            issue_date: self.issue_date,
            issue_time: self.issue_time,
            previous_invoice_hash: self.previous_invoice_hash,
            seller,
            line_items: self.line_items,
            variant,
        })
    }
}

/// Builder for LineItem.
pub struct LineItemBuilder {
    id: String,
    name: String,
    quantity: Decimal,
    tax_exclusive_price: Decimal,
    discounts: Vec<Discount>,
    other_taxes: Vec<OtherTax>,
    vat_percent: Decimal,
    vat_category: Option<VatCategory>,
    exemption_reason_code: Option<String>,
    exemption_reason: Option<String>,
}

impl LineItemBuilder {
    /// New line at the standard 15% rate.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        quantity: Decimal,
        tax_exclusive_price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quantity,
            tax_exclusive_price,
            discounts: Vec::new(),
            other_taxes: Vec::new(),
            vat_percent: Decimal::new(15, 2),
            vat_category: None,
            exemption_reason_code: None,
            exemption_reason: None,
        }
    }

    /// VAT rate as a fraction (0.15, 0.05).
    pub fn vat(mut self, percent: Decimal) -> Self {
        self.vat_percent = percent;
        self
    }

    /// Zero-rated line with its category and optional exemption reason.
    pub fn zero_rated(
        mut self,
        category: VatCategory,
        reason_code: Option<&str>,
        reason: Option<&str>,
    ) -> Self {
        self.vat_percent = Decimal::ZERO;
        self.vat_category = Some(category);
        self.exemption_reason_code = reason_code.map(String::from);
        self.exemption_reason = reason.map(String::from);
        self
    }

    pub fn discount(mut self, amount: Decimal, reason: impl Into<String>) -> Self {
        self.discounts.push(Discount {
            amount,
            reason: reason.into(),
        });
        self
    }

    pub fn other_tax(mut self, percent_amount: Decimal) -> Self {
        self.other_taxes.push(OtherTax { percent_amount });
        self
    }

    pub fn build(self) -> LineItem {
        LineItem {
            id: self.id,
            name: self.name,
            quantity: self.quantity,
            tax_exclusive_price: self.tax_exclusive_price,
            discounts: self.discounts,
            other_taxes: self.other_taxes,
            vat_percent: self.vat_percent,
            vat_category: self.vat_category,
            exemption_reason_code: self.exemption_reason_code,
            exemption_reason: self.exemption_reason,
        }
    }
}

/// Builder for EgsIdentity.
pub struct EgsIdentityBuilder {
    uuid: Uuid,
    custom_id: String,
    model: String,
    crn_number: String,
    vat_name: String,
    vat_number: String,
    branch_name: String,
    branch_industry: String,
    location: Option<Location>,
}

impl EgsIdentityBuilder {
    /// New identity with a random device UUID.
    pub fn new(vat_number: impl Into<String>, vat_name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            custom_id: "EGS1".to_string(),
            model: "IOS".to_string(),
            crn_number: String::new(),
            vat_name: vat_name.into(),
            vat_number: vat_number.into(),
            branch_name: "Main Branch".to_string(),
            branch_industry: "Retail".to_string(),
            location: None,
        }
    }

    pub fn uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn custom_id(mut self, id: impl Into<String>) -> Self {
        self.custom_id = id.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn crn_number(mut self, crn: impl Into<String>) -> Self {
        self.crn_number = crn.into();
        self
    }

    pub fn branch(mut self, name: impl Into<String>, industry: impl Into<String>) -> Self {
        self.branch_name = name.into();
        self.branch_industry = industry.into();
        self
    }

    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn build(self) -> EgsIdentity {
        EgsIdentity {
            uuid: self.uuid,
            custom_id: self.custom_id,
            model: self.model,
            crn_number: self.crn_number,
            vat_name: self.vat_name,
            vat_number: self.vat_number,
            branch_name: self.branch_name,
            branch_industry: self.branch_industry,
            location: self.location.unwrap_or_else(|| Location {
                city: String::new(),
                city_subdivision: String::new(),
                street: String::new(),
                plot_identification: String::new(),
                building: String::new(),
                postal_zone: String::new(),
            }),
        }
    }
}
