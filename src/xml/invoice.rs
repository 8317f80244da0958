use rust_decimal::Decimal;

use super::document::UblDocument;
use super::hash::{InvoiceHash, hash_invoice};
use super::xml_utils::{XmlWriter, format_amount, format_decimal, format_percent};
use super::{CURRENCY, QR_PLACEHOLDER, UBL_EXTENSIONS_PLACEHOLDER, qr, ubl_ns};
use crate::core::*;

/// An unsigned invoice: rendered UBL with signature and QR placeholders,
/// plus the tax computation it was rendered from.
#[derive(Debug, Clone)]
pub struct AssembledInvoice {
    pub xml: String,
    pub computation: TaxComputation,
}

impl AssembledInvoice {
    /// Hash of the invoice; stays the same after signing.
    pub fn hash(&self) -> Result<InvoiceHash, FatooraError> {
        hash_invoice(&self.xml)
    }

    pub fn document(&self) -> Result<UblDocument, FatooraError> {
        UblDocument::parse(&self.xml)
    }

    /// The invoice with its QR placeholder replaced by a phase-1 QR code.
    pub fn with_phase_one_qr(&self) -> Result<String, FatooraError> {
        let code = qr::phase_one(&self.document()?)?;
        Ok(self.xml.replacen(QR_PLACEHOLDER, &code, 1))
    }
}

/// Validate, compute taxes and render an unsigned UBL 2.1 invoice.
///
/// All structural problems are reported together as
/// [`FatooraError::Validation`]; monetary input problems as
/// [`FatooraError::Computation`].
pub fn assemble(
    props: &InvoiceProps,
    policy: RoundingPolicy,
) -> Result<AssembledInvoice, FatooraError> {
    let errors = validate_invoice_props(props);
    if !errors.is_empty() {
        return Err(FatooraError::Validation(errors));
    }
    let computation = compute_taxes(&props.line_items, policy)?;
    let xml = render(props, &computation)?;

    tracing::debug!(
        serial = %props.serial_number,
        counter = props.counter,
        type_code = props.variant.kind().type_code(),
        "assembled invoice"
    );
    Ok(AssembledInvoice { xml, computation })
}

fn render(props: &InvoiceProps, calc: &TaxComputation) -> Result<String, FatooraError> {
    let mut w = XmlWriter::new()?;
    let kind = props.variant.kind();

    w.start_element_with_attrs(
        "Invoice",
        &[
            ("xmlns", ubl_ns::INVOICE),
            ("xmlns:cac", ubl_ns::CAC),
            ("xmlns:cbc", ubl_ns::CBC),
            ("xmlns:ext", ubl_ns::EXT),
        ],
    )?;
    w.text_element("ext:UBLExtensions", UBL_EXTENSIONS_PLACEHOLDER)?;

    w.text_element("cbc:ProfileID", "reporting:1.0")?;
    w.text_element("cbc:ID", &props.serial_number)?;
    w.text_element("cbc:UUID", &props.seller.uuid.to_string())?;
    w.text_element("cbc:IssueDate", &props.issue_date.format("%Y-%m-%d").to_string())?;
    w.text_element("cbc:IssueTime", &props.issue_time.format("%H:%M:%S").to_string())?;
    w.text_element_with_attrs(
        "cbc:InvoiceTypeCode",
        &kind.type_code().to_string(),
        &[("name", props.variant.transaction_code())],
    )?;
    w.text_element("cbc:DocumentCurrencyCode", CURRENCY)?;
    w.text_element("cbc:TaxCurrencyCode", CURRENCY)?;

    // Credit and debit notes reference the corrected invoice
    if let Some(cancelation) = kind.cancelation() {
        w.start_element("cac:BillingReference")?;
        w.start_element("cac:InvoiceDocumentReference")?;
        w.text_element("cbc:ID", &cancelation.canceled_serial_invoice_number)?;
        w.end_element("cac:InvoiceDocumentReference")?;
        w.end_element("cac:BillingReference")?;
    }

    // Invoice counter value
    w.start_element("cac:AdditionalDocumentReference")?;
    w.text_element("cbc:ID", "ICV")?;
    w.text_element("cbc:UUID", &props.counter.to_string())?;
    w.end_element("cac:AdditionalDocumentReference")?;

    write_attachment_reference(&mut w, "PIH", &props.previous_invoice_hash)?;
    write_attachment_reference(&mut w, "QR", QR_PLACEHOLDER)?;

    w.start_element("cac:Signature")?;
    w.text_element("cbc:ID", "urn:oasis:names:specification:ubl:signature:Invoice")?;
    w.text_element(
        "cbc:SignatureMethod",
        "urn:oasis:names:specification:ubl:dsig:enveloped:xades",
    )?;
    w.end_element("cac:Signature")?;

    write_supplier(&mut w, &props.seller)?;
    match props.variant.customer() {
        Some(customer) => write_customer(&mut w, customer)?,
        None => {
            w.empty_element("cac:AccountingCustomerParty")?;
        }
    }

    match kind {
        DocumentKind::Invoice(cash) => {
            if cash.actual_delivery_date.is_some() || cash.latest_delivery_date.is_some() {
                w.start_element("cac:Delivery")?;
                if let Some(d) = cash.actual_delivery_date {
                    w.text_element("cbc:ActualDeliveryDate", &d.format("%Y-%m-%d").to_string())?;
                }
                if let Some(d) = cash.latest_delivery_date {
                    w.text_element("cbc:LatestDeliveryDate", &d.format("%Y-%m-%d").to_string())?;
                }
                w.end_element("cac:Delivery")?;
            }
            if let Some(method) = cash.payment_method {
                w.start_element("cac:PaymentMeans")?;
                w.text_element("cbc:PaymentMeansCode", &method.code().to_string())?;
                w.end_element("cac:PaymentMeans")?;
            }
        }
        DocumentKind::CreditNote(c) | DocumentKind::DebitNote(c) => {
            w.start_element("cac:PaymentMeans")?;
            w.text_element("cbc:PaymentMeansCode", &c.payment_method.code().to_string())?;
            w.text_element("cbc:InstructionNote", &c.reason)?;
            w.end_element("cac:PaymentMeans")?;
        }
    }

    write_tax_totals(&mut w, calc)?;
    write_monetary_total(&mut w, &calc.totals)?;

    for (item, line) in props.line_items.iter().zip(&calc.lines) {
        write_line(&mut w, item, line)?;
    }

    w.end_element("Invoice")?;
    w.into_string()
}

fn write_attachment_reference(w: &mut XmlWriter, id: &str, content: &str) -> Result<(), FatooraError> {
    w.start_element("cac:AdditionalDocumentReference")?;
    w.text_element("cbc:ID", id)?;
    w.start_element("cac:Attachment")?;
    w.text_element_with_attrs(
        "cbc:EmbeddedDocumentBinaryObject",
        content,
        &[("mimeCode", "text/plain")],
    )?;
    w.end_element("cac:Attachment")?;
    w.end_element("cac:AdditionalDocumentReference")?;
    Ok(())
}

fn write_vat_scheme(w: &mut XmlWriter) -> Result<(), FatooraError> {
    w.start_element("cac:TaxScheme")?;
    w.text_element("cbc:ID", "VAT")?;
    w.end_element("cac:TaxScheme")?;
    Ok(())
}

fn write_supplier(w: &mut XmlWriter, seller: &EgsIdentity) -> Result<(), FatooraError> {
    let loc = &seller.location;
    w.start_element("cac:AccountingSupplierParty")?;
    w.start_element("cac:Party")?;

    w.start_element("cac:PartyIdentification")?;
    w.text_element_with_attrs("cbc:ID", &seller.crn_number, &[("schemeID", "CRN")])?;
    w.end_element("cac:PartyIdentification")?;

    w.start_element("cac:PostalAddress")?;
    w.text_element("cbc:StreetName", &loc.street)?;
    w.text_element("cbc:BuildingNumber", &loc.building)?;
    w.text_element("cbc:PlotIdentification", &loc.plot_identification)?;
    w.text_element("cbc:CitySubdivisionName", &loc.city_subdivision)?;
    w.text_element("cbc:CityName", &loc.city)?;
    w.text_element("cbc:PostalZone", &loc.postal_zone)?;
    w.start_element("cac:Country")?;
    w.text_element("cbc:IdentificationCode", "SA")?;
    w.end_element("cac:Country")?;
    w.end_element("cac:PostalAddress")?;

    w.start_element("cac:PartyTaxScheme")?;
    w.text_element("cbc:CompanyID", &seller.vat_number)?;
    write_vat_scheme(w)?;
    w.end_element("cac:PartyTaxScheme")?;

    w.start_element("cac:PartyLegalEntity")?;
    w.text_element("cbc:RegistrationName", &seller.vat_name)?;
    w.end_element("cac:PartyLegalEntity")?;

    w.end_element("cac:Party")?;
    w.end_element("cac:AccountingSupplierParty")?;
    Ok(())
}

fn write_customer(w: &mut XmlWriter, customer: &CustomerInfo) -> Result<(), FatooraError> {
    w.start_element("cac:AccountingCustomerParty")?;
    w.start_element("cac:Party")?;

    w.start_element("cac:PostalAddress")?;
    w.text_element("cbc:StreetName", &customer.street)?;
    w.text_element("cbc:BuildingNumber", &customer.building_number)?;
    if let Some(sub) = &customer.city_subdivision {
        w.text_element("cbc:CitySubdivisionName", sub)?;
    }
    w.text_element("cbc:CityName", &customer.city)?;
    w.text_element("cbc:PostalZone", &customer.postal_zone)?;
    w.start_element("cac:Country")?;
    w.text_element("cbc:IdentificationCode", &customer.country_code)?;
    w.end_element("cac:Country")?;
    w.end_element("cac:PostalAddress")?;

    w.start_element("cac:PartyTaxScheme")?;
    w.text_element("cbc:CompanyID", &customer.vat_number)?;
    write_vat_scheme(w)?;
    w.end_element("cac:PartyTaxScheme")?;

    w.start_element("cac:PartyLegalEntity")?;
    w.text_element("cbc:RegistrationName", &customer.buyer_name)?;
    w.end_element("cac:PartyLegalEntity")?;

    w.end_element("cac:Party")?;
    w.end_element("cac:AccountingCustomerParty")?;
    Ok(())
}

fn write_tax_totals(w: &mut XmlWriter, calc: &TaxComputation) -> Result<(), FatooraError> {
    w.start_element("cac:TaxTotal")?;
    w.amount_element("cbc:TaxAmount", calc.totals.tax_total, CURRENCY)?;
    for sub in &calc.subtotals {
        w.start_element("cac:TaxSubtotal")?;
        w.amount_element("cbc:TaxableAmount", sub.taxable_amount, CURRENCY)?;
        w.amount_element("cbc:TaxAmount", sub.tax_amount, CURRENCY)?;
        w.start_element("cac:TaxCategory")?;
        w.text_element_with_attrs(
            "cbc:ID",
            sub.category.code(),
            &[("schemeAgencyID", "6"), ("schemeID", "UN/ECE 5305")],
        )?;
        w.text_element("cbc:Percent", &format_percent(sub.percent))?;
        if let Some(code) = &sub.exemption_reason_code {
            w.text_element("cbc:TaxExemptionReasonCode", code)?;
        }
        if let Some(reason) = &sub.exemption_reason {
            w.text_element("cbc:TaxExemptionReason", reason)?;
        }
        w.start_element("cac:TaxScheme")?;
        w.text_element_with_attrs(
            "cbc:ID",
            "VAT",
            &[("schemeAgencyID", "6"), ("schemeID", "UN/ECE 5153")],
        )?;
        w.end_element("cac:TaxScheme")?;
        w.end_element("cac:TaxCategory")?;
        w.end_element("cac:TaxSubtotal")?;
    }
    w.end_element("cac:TaxTotal")?;

    // Second TaxTotal carries the amount in accounting currency
    w.start_element("cac:TaxTotal")?;
    w.amount_element("cbc:TaxAmount", calc.totals.tax_total, CURRENCY)?;
    w.end_element("cac:TaxTotal")?;
    Ok(())
}

fn write_monetary_total(w: &mut XmlWriter, totals: &DocumentTotals) -> Result<(), FatooraError> {
    w.start_element("cac:LegalMonetaryTotal")?;
    w.amount_element("cbc:LineExtensionAmount", totals.line_extension_total, CURRENCY)?;
    w.amount_element("cbc:TaxExclusiveAmount", totals.tax_exclusive_total, CURRENCY)?;
    w.amount_element("cbc:TaxInclusiveAmount", totals.tax_inclusive_total, CURRENCY)?;
    w.amount_element("cbc:AllowanceTotalAmount", totals.allowance_total, CURRENCY)?;
    w.amount_element("cbc:PrepaidAmount", totals.prepaid, CURRENCY)?;
    w.amount_element("cbc:PayableAmount", totals.payable_total, CURRENCY)?;
    w.end_element("cac:LegalMonetaryTotal")?;
    Ok(())
}

fn write_classified_category(
    w: &mut XmlWriter,
    category: VatCategory,
    percent: Decimal,
) -> Result<(), FatooraError> {
    w.start_element("cac:ClassifiedTaxCategory")?;
    w.text_element("cbc:ID", category.code())?;
    w.text_element("cbc:Percent", &format_percent(percent))?;
    write_vat_scheme(w)?;
    w.end_element("cac:ClassifiedTaxCategory")?;
    Ok(())
}

fn write_line(w: &mut XmlWriter, item: &LineItem, line: &LineTotals) -> Result<(), FatooraError> {
    w.start_element("cac:InvoiceLine")?;
    w.text_element("cbc:ID", &item.id)?;
    w.quantity_element("cbc:InvoicedQuantity", item.quantity, "PCE")?;
    w.amount_element("cbc:LineExtensionAmount", line.line_extension, CURRENCY)?;

    w.start_element("cac:TaxTotal")?;
    w.amount_element("cbc:TaxAmount", line.tax_amount, CURRENCY)?;
    w.amount_element("cbc:RoundingAmount", line.tax_inclusive, CURRENCY)?;
    w.end_element("cac:TaxTotal")?;

    w.start_element("cac:Item")?;
    w.text_element("cbc:Name", &item.name)?;
    write_classified_category(w, line.vat.category(), line.vat.percent())?;
    for other in &item.other_taxes {
        write_classified_category(w, VatCategory::StandardRate, other.percent_amount)?;
    }
    w.end_element("cac:Item")?;

    w.start_element("cac:Price")?;
    w.text_element_with_attrs(
        "cbc:PriceAmount",
        &format_decimal(item.tax_exclusive_price),
        &[("currencyID", CURRENCY)],
    )?;
    for discount in &item.discounts {
        w.start_element("cac:AllowanceCharge")?;
        w.text_element("cbc:ChargeIndicator", "false")?;
        w.text_element("cbc:AllowanceChargeReason", &discount.reason)?;
        w.amount_element("cbc:Amount", discount.amount, CURRENCY)?;
        w.end_element("cac:AllowanceCharge")?;
    }
    w.end_element("cac:Price")?;

    w.end_element("cac:InvoiceLine")?;
    Ok(())
}
