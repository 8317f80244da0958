//! Fixtures shared by the signing and onboarding tests.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use fatoora::core::*;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Self-signed secp256k1 certificate whose key is [`TEST_KEY`].
pub const TEST_CERTIFICATE: &str = include_str!("../fixtures/egs_certificate.pem");

pub const TEST_KEY: &str = include_str!("../fixtures/egs_key.pem");

pub fn seller() -> EgsIdentity {
    EgsIdentityBuilder::new("310175397400003", "Maximum Speed Tech Supply LTD")
        .uuid(Uuid::parse_str("6f4d20e0-6bfe-4a80-9389-7dabe6620f12").unwrap())
        .custom_id("EGS1-886431145")
        .crn_number("1010010000")
        .branch("Riyad Branch", "Supply activities")
        .location(Location {
            city: "Khobar".into(),
            city_subdivision: "West".into(),
            street: "King Fahahd st".into(),
            plot_identification: "0000".into(),
            building: "0000".into(),
            postal_zone: "31952".into(),
        })
        .build()
}

pub fn customer() -> CustomerInfo {
    CustomerInfo {
        buyer_name: "Fatoora Samples LTD".into(),
        vat_number: "399999999800003".into(),
        street: "Salah Al-Din".into(),
        building_number: "1111".into(),
        city_subdivision: Some("Al-Murabba".into()),
        city: "Riyadh".into(),
        postal_zone: "12222".into(),
        country_code: "SA".into(),
    }
}

pub fn issue_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
}

pub fn issue_time() -> NaiveTime {
    NaiveTime::from_hms_opt(11, 40, 40).unwrap()
}

pub fn signing_time() -> NaiveDateTime {
    issue_date().and_hms_opt(11, 41, 0).unwrap()
}

fn note(kind: &str) -> Cancelation {
    Cancelation {
        canceled_serial_invoice_number: "SME00000".into(),
        payment_method: PaymentMethod::Cash,
        reason: format!("{kind} for returned goods"),
    }
}

/// The document kind and variant a compliance step submits.
pub fn props_for_step(step: ComplianceStep, identity: &EgsIdentity, link: &ChainLink) -> InvoiceProps {
    let kind = match step {
        ComplianceStep::StandardInvoice | ComplianceStep::SimplifiedInvoice => {
            DocumentKind::Invoice(CashDetails::default())
        }
        ComplianceStep::StandardCredit | ComplianceStep::SimplifiedCredit => {
            DocumentKind::CreditNote(note("credit"))
        }
        ComplianceStep::StandardDebit | ComplianceStep::SimplifiedDebit => {
            DocumentKind::DebitNote(note("debit"))
        }
    };
    let builder = InvoiceBuilder::chained(
        format!("SME{:05}", link.counter),
        link,
        issue_date(),
        issue_time(),
    )
    .seller(identity.clone())
    .add_line(
        LineItemBuilder::new("1", "TEST NAME", dec!(44), dec!(22))
            .discount(dec!(1), "A discount")
            .build(),
    );
    let builder = match step {
        ComplianceStep::StandardDebit
        | ComplianceStep::StandardInvoice
        | ComplianceStep::StandardCredit => builder.standard(customer(), kind),
        _ => builder.simplified(kind),
    };
    builder.build().unwrap()
}
