use std::collections::HashSet;

use super::error::ValidationError;
use super::types::*;

/// Structural checks run before an invoice is assembled.
/// Returns all validation errors found (not just the first).
///
/// Monetary inputs (negative amounts, VAT categories) are the tax engine's
/// concern and reported as [`ComputationError`](super::ComputationError).
pub fn validate_invoice_props(props: &InvoiceProps) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // BR-02: An Invoice shall have an Invoice number
    if props.serial_number.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "serial_number",
            "invoice serial number must not be empty",
            "BR-02",
        ));
    }

    if props.counter == 0 {
        errors.push(ValidationError::new(
            "counter",
            "invoice counter value starts at 1",
        ));
    }

    if props.previous_invoice_hash.trim().is_empty() {
        errors.push(ValidationError::new(
            "previous_invoice_hash",
            "previous invoice hash must not be empty (use the genesis hash for the first invoice)",
        ));
    }

    validate_seller(&props.seller, &mut errors);

    // BR-16: An Invoice shall have at least one Invoice line
    if props.line_items.is_empty() {
        errors.push(ValidationError::with_rule(
            "line_items",
            "invoice must have at least one line item",
            "BR-16",
        ));
    }

    let mut seen = HashSet::new();
    for (i, line) in props.line_items.iter().enumerate() {
        validate_line(line, i, &mut seen, &mut errors);
    }

    if let Some(customer) = props.variant.customer() {
        validate_customer(customer, &mut errors);
    }

    if let Some(cancelation) = props.variant.kind().cancelation() {
        validate_cancelation(cancelation, &mut errors);
    }

    errors
}

fn validate_seller(seller: &EgsIdentity, errors: &mut Vec<ValidationError>) {
    if seller.vat_name.trim().is_empty() {
        errors.push(ValidationError::new(
            "seller.vat_name",
            "seller name must not be empty",
        ));
    }

    if !is_valid_vat_number(&seller.vat_number) {
        errors.push(ValidationError::with_rule(
            "seller.vat_number",
            format!(
                "VAT number '{}' must be 15 digits starting and ending with 3",
                seller.vat_number
            ),
            "BR-KSA-39",
        ));
    }
}

fn validate_line(
    line: &LineItem,
    index: usize,
    seen: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    let prefix = format!("line_items[{index}]");

    if line.id.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.id"),
            "line identifier must not be empty",
            "BR-21",
        ));
    } else if !seen.insert(line.id.clone()) {
        errors.push(ValidationError::new(
            format!("{prefix}.id"),
            format!("duplicate line identifier '{}'", line.id),
        ));
    }

    if line.name.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.name"),
            "item name must not be empty",
            "BR-25",
        ));
    }
}

fn validate_customer(customer: &CustomerInfo, errors: &mut Vec<ValidationError>) {
    if customer.buyer_name.trim().is_empty() {
        errors.push(ValidationError::new(
            "customer.buyer_name",
            "standard invoices require the buyer name",
        ));
    }
    if customer.vat_number.trim().is_empty() {
        errors.push(ValidationError::new(
            "customer.vat_number",
            "standard invoices require the buyer VAT number",
        ));
    }
}

fn validate_cancelation(cancelation: &Cancelation, errors: &mut Vec<ValidationError>) {
    // BR-KSA-56: credit and debit notes reference the original invoice
    if cancelation.canceled_serial_invoice_number.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "cancelation.canceled_serial_invoice_number",
            "credit/debit note must reference the original invoice serial",
            "BR-KSA-56",
        ));
    }
    // BR-KSA-17: reason for issuing the note
    if cancelation.reason.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "cancelation.reason",
            "credit/debit note must state a reason",
            "BR-KSA-17",
        ));
    }
}

/// Saudi VAT registration number: 15 digits, first and last digit `3`.
pub fn is_valid_vat_number(vat: &str) -> bool {
    vat.len() == 15
        && vat.bytes().all(|b| b.is_ascii_digit())
        && vat.starts_with('3')
        && vat.ends_with('3')
}
