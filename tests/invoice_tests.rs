//! Invoice assembly, hash chain and phase-1 QR tests.
//!
//! Run with: `cargo test --test invoice_tests`

#![cfg(feature = "xml")]

mod common;

use chrono::NaiveDate;
use common::*;
use fatoora::core::*;
use fatoora::xml::{self, QR_PLACEHOLDER, qr};
use rust_decimal_macros::dec;

fn note(serial: &str) -> Cancelation {
    Cancelation {
        canceled_serial_invoice_number: serial.into(),
        payment_method: PaymentMethod::Cash,
        reason: "Goods returned".into(),
    }
}

fn builder(link: &ChainLink) -> InvoiceBuilder {
    InvoiceBuilder::chained(format!("SME{:05}", link.counter), link, issue_date(), issue_time())
        .seller(seller())
        .add_line(
            LineItemBuilder::new("1", "TEST NAME", dec!(44), dec!(22))
                .discount(dec!(1), "A discount")
                .build(),
        )
}

fn position(xml: &str, needle: &str) -> usize {
    xml.find(needle)
        .unwrap_or_else(|| panic!("{needle} not found in invoice"))
}

// --- Assembly ---

#[test]
fn header_elements_in_platform_order() {
    let link = InvoiceChain::genesis().next_link();
    let props = builder(&link)
        .standard(customer(), DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let xml = xml::assemble(&props, RoundingPolicy::Strict).unwrap().xml;

    let order = [
        "<ext:UBLExtensions>",
        "<cbc:ProfileID>",
        "<cbc:ID>SME00001</cbc:ID>",
        "<cbc:UUID>",
        "<cbc:IssueDate>2024-02-29</cbc:IssueDate>",
        "<cbc:IssueTime>11:40:40</cbc:IssueTime>",
        "<cbc:InvoiceTypeCode name=\"0100000\">388</cbc:InvoiceTypeCode>",
        "<cbc:DocumentCurrencyCode>SAR</cbc:DocumentCurrencyCode>",
        "<cbc:TaxCurrencyCode>SAR</cbc:TaxCurrencyCode>",
        "<cbc:ID>ICV</cbc:ID>",
        "<cbc:ID>PIH</cbc:ID>",
        "<cbc:ID>QR</cbc:ID>",
        "<cac:Signature>",
        "<cac:AccountingSupplierParty>",
        "<cac:AccountingCustomerParty>",
        "<cac:TaxTotal>",
        "<cac:LegalMonetaryTotal>",
        "<cac:InvoiceLine>",
    ];
    let positions: Vec<usize> = order.iter().map(|n| position(&xml, n)).collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "elements out of order: {positions:?}"
    );
    assert!(xml.contains("<cbc:RegistrationName>Fatoora Samples LTD</cbc:RegistrationName>"));
    assert!(xml.contains("<cbc:CitySubdivisionName>Al-Murabba</cbc:CitySubdivisionName>"));
}

#[test]
fn credit_and_debit_notes_reference_original() {
    let link = InvoiceChain::genesis().next_link();
    for (kind, code) in [
        (DocumentKind::CreditNote(note("SME00002")), "381"),
        (DocumentKind::DebitNote(note("SME00002")), "383"),
    ] {
        let props = builder(&link).simplified(kind).build().unwrap();
        let xml = xml::assemble(&props, RoundingPolicy::Strict).unwrap().xml;

        assert!(xml.contains(&format!(
            "<cbc:InvoiceTypeCode name=\"0200000\">{code}</cbc:InvoiceTypeCode>"
        )));
        let billing = position(&xml, "<cac:BillingReference>");
        assert!(billing > position(&xml, "<cbc:TaxCurrencyCode>"));
        assert!(billing < position(&xml, "<cbc:ID>ICV</cbc:ID>"));
        assert!(xml.contains("<cbc:ID>SME00002</cbc:ID>"));
        assert!(xml.contains("<cbc:InstructionNote>Goods returned</cbc:InstructionNote>"));
        assert!(xml.contains("<cbc:PaymentMeansCode>10</cbc:PaymentMeansCode>"));
    }
}

#[test]
fn cash_invoice_delivery_and_payment_means() {
    let link = InvoiceChain::genesis().next_link();
    let details = CashDetails {
        actual_delivery_date: Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        latest_delivery_date: None,
        payment_method: Some(PaymentMethod::BankCard),
    };
    let props = builder(&link)
        .simplified(DocumentKind::Invoice(details))
        .build()
        .unwrap();
    let xml = xml::assemble(&props, RoundingPolicy::Strict).unwrap().xml;
    assert!(xml.contains("<cbc:ActualDeliveryDate>2024-03-01</cbc:ActualDeliveryDate>"));
    assert!(!xml.contains("LatestDeliveryDate"));
    assert!(xml.contains("<cbc:PaymentMeansCode>48</cbc:PaymentMeansCode>"));
}

#[test]
fn line_carries_price_discount_and_rounding_amount() {
    let link = InvoiceChain::genesis().next_link();
    let props = builder(&link)
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let assembled = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
    let xml = &assembled.xml;
    assert!(xml.contains("<cbc:InvoicedQuantity unitCode=\"PCE\">44.00</cbc:InvoicedQuantity>"));
    assert!(xml.contains("<cbc:LineExtensionAmount currencyID=\"SAR\">924.00</cbc:LineExtensionAmount>"));
    assert!(xml.contains("<cbc:RoundingAmount currencyID=\"SAR\">1062.60</cbc:RoundingAmount>"));
    assert!(xml.contains("<cbc:PriceAmount currencyID=\"SAR\">22.00</cbc:PriceAmount>"));
    assert!(xml.contains("<cbc:AllowanceChargeReason>A discount</cbc:AllowanceChargeReason>"));
    assert_eq!(assembled.computation.totals.tax_total, dec!(138.60));
}

#[test]
fn exempt_line_renders_reason() {
    let link = InvoiceChain::genesis().next_link();
    let props = builder(&link)
        .add_line(
            LineItemBuilder::new("2", "Insurance", dec!(1), dec!(50))
                .zero_rated(VatCategory::Exempt, Some("VATEX-SA-29"), Some("Financial services"))
                .build(),
        )
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let xml = xml::assemble(&props, RoundingPolicy::Strict).unwrap().xml;
    assert!(xml.contains("<cbc:TaxExemptionReasonCode>VATEX-SA-29</cbc:TaxExemptionReasonCode>"));
    assert!(xml.contains("<cbc:TaxExemptionReason>Financial services</cbc:TaxExemptionReason>"));
    assert!(xml.contains("<cbc:TaxInclusiveAmount currencyID=\"SAR\">1112.60</cbc:TaxInclusiveAmount>"));
}

#[test]
fn special_characters_are_escaped() {
    let link = InvoiceChain::genesis().next_link();
    let props = builder(&link)
        .add_line(LineItemBuilder::new("2", "Salt & <Pepper>", dec!(1), dec!(1)).build())
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let assembled = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
    assert!(assembled.xml.contains("<cbc:Name>Salt &amp; &lt;Pepper&gt;</cbc:Name>"));
    assert!(assembled.hash().is_ok());
}

// --- Validation ---

#[test]
fn validation_errors_are_reported_together() {
    let props = InvoiceBuilder::new("", 0, issue_date(), issue_time())
        .seller(EgsIdentityBuilder::new("12345", "").build())
        .add_line(LineItemBuilder::new("1", "", dec!(1), dec!(1)).build())
        .simplified(DocumentKind::DebitNote(Cancelation {
            canceled_serial_invoice_number: String::new(),
            payment_method: PaymentMethod::Cash,
            reason: String::new(),
        }))
        .build_unchecked()
        .unwrap();

    let err = xml::assemble(&props, RoundingPolicy::Strict).unwrap_err();
    let fields: Vec<&str> = err
        .validation_errors()
        .iter()
        .map(|e| e.field.as_str())
        .collect();
    assert_eq!(
        fields,
        [
            "serial_number",
            "counter",
            "seller.vat_name",
            "seller.vat_number",
            "line_items[0].name",
            "cancelation.canceled_serial_invoice_number",
            "cancelation.reason",
        ]
    );
    assert!(err.to_string().starts_with("validation failed: [BR-02] serial_number"));
}

#[test]
fn builder_requires_seller_and_variant() {
    let err = InvoiceBuilder::new("SME1", 1, issue_date(), issue_time())
        .build()
        .unwrap_err();
    assert_eq!(err.validation_errors().len(), 2);
}

#[test]
fn negative_amount_is_a_computation_error() {
    let link = InvoiceChain::genesis().next_link();
    let props = builder(&link)
        .add_line(LineItemBuilder::new("2", "Refund", dec!(1), dec!(-5)).build())
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    assert!(matches!(
        xml::assemble(&props, RoundingPolicy::Strict),
        Err(FatooraError::Computation(ComputationError::Negative { .. }))
    ));
}

// --- Hashing and the chain ---

#[test]
fn hash_is_deterministic_and_ignores_placeholders() {
    let link = InvoiceChain::genesis().next_link();
    let props = builder(&link)
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let a = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
    let b = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
    assert_eq!(a.xml, b.xml);
    assert_eq!(a.hash().unwrap(), b.hash().unwrap());

    let with_qr = a.with_phase_one_qr().unwrap();
    assert_ne!(with_qr, a.xml);
    assert_eq!(xml::hash_invoice(&with_qr).unwrap(), a.hash().unwrap());
}

#[test]
fn hash_changes_with_any_business_field() {
    let link = InvoiceChain::genesis().next_link();
    let base = builder(&link).simplified(DocumentKind::Invoice(CashDetails::default()));
    let other = builder(&link)
        .add_line(LineItemBuilder::new("2", "Extra", dec!(1), dec!(1)).build())
        .simplified(DocumentKind::Invoice(CashDetails::default()));
    let h1 = xml::assemble(&base.build().unwrap(), RoundingPolicy::Strict)
        .unwrap()
        .hash()
        .unwrap();
    let h2 = xml::assemble(&other.build().unwrap(), RoundingPolicy::Strict)
        .unwrap()
        .hash()
        .unwrap();
    assert_ne!(h1, h2);
}

#[test]
fn pure_invoice_string_drops_signature_parts() {
    let link = InvoiceChain::genesis().next_link();
    let props = builder(&link)
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let assembled = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
    let pure = xml::pure_invoice_string(&assembled.xml).unwrap();

    assert!(!pure.starts_with("<?xml"));
    assert!(!pure.contains("UBLExtensions"));
    assert!(!pure.contains("cac:Signature"));
    assert!(!pure.contains(QR_PLACEHOLDER));
    assert!(pure.contains(">PIH</cbc:ID>"));
    assert!(pure.contains("\n    \n    <cac:AccountingSupplierParty"));
}

#[test]
fn three_invoices_form_a_chain() {
    let mut chain = InvoiceChain::genesis();
    let mut issued = Vec::new();

    for _ in 0..3 {
        let link = chain.next_link();
        let props = builder(&link)
            .simplified(DocumentKind::Invoice(CashDetails::default()))
            .build()
            .unwrap();
        let assembled = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
        let hash = assembled.hash().unwrap().to_base64();
        issued.push(chain.record(&link, hash).unwrap());

        let doc = assembled.document().unwrap();
        assert_eq!(doc.counter(), Some(link.counter));
        assert_eq!(doc.previous_invoice_hash(), Some(link.previous_invoice_hash));
    }

    assert_eq!(issued[0].previous_invoice_hash, GENESIS_PREVIOUS_INVOICE_HASH);
    assert_eq!(issued[1].previous_invoice_hash, issued[0].invoice_hash);
    assert_eq!(issued[2].previous_invoice_hash, issued[1].invoice_hash);
    assert_eq!(chain.next_counter(), 4);
    verify_chain(&issued).unwrap();
}

#[test]
fn resumed_chain_continues_counter_and_hash() {
    let chain = InvoiceChain::resume(41, "bGFzdA==");
    let link = chain.next_link();
    let props = builder(&link)
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let doc = xml::assemble(&props, RoundingPolicy::Strict)
        .unwrap()
        .document()
        .unwrap();
    assert_eq!(doc.counter(), Some(42));
    assert_eq!(doc.serial_number().as_deref(), Some("SME00042"));
    assert_eq!(doc.previous_invoice_hash().as_deref(), Some("bGFzdA=="));
}

// --- QR ---

#[test]
fn phase_one_qr_has_five_tags() {
    let link = InvoiceChain::genesis().next_link();
    let props = builder(&link)
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let assembled = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
    let with_qr = assembled.with_phase_one_qr().unwrap();
    let payload = xml::UblDocument::parse(&with_qr).unwrap().qr().unwrap();

    let fields = qr::read_qr(&payload).unwrap();
    let values: Vec<(u8, &str)> = fields
        .iter()
        .map(|f| (f.tag, f.as_str().unwrap()))
        .collect();
    assert_eq!(
        values,
        [
            (1, "Maximum Speed Tech Supply LTD"),
            (2, "310175397400003"),
            (3, "2024-02-29T11:40:40Z"),
            (4, "1062.60"),
            (5, "138.60"),
        ]
    );
}

#[test]
fn arabic_seller_name_counts_bytes() {
    let arabic = "شركة توريد التكنولوجيا بأقصى سرعة المحدودة";
    let identity = EgsIdentityBuilder::new("310175397400003", arabic).build();
    let link = InvoiceChain::genesis().next_link();
    let props = InvoiceBuilder::chained("SME00001", &link, issue_date(), issue_time())
        .seller(identity)
        .add_line(LineItemBuilder::new("1", "قهوة", dec!(1), dec!(10)).build())
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let doc = xml::assemble(&props, RoundingPolicy::Strict)
        .unwrap()
        .document()
        .unwrap();
    let payload = qr::phase_one(&doc).unwrap();
    let fields = qr::read_qr(&payload).unwrap();
    assert_eq!(fields[0].value.len(), arabic.len());
    assert_eq!(fields[0].as_str(), Some(arabic));
}

#[test]
fn seller_name_over_255_bytes_fails_qr() {
    // 128 two-byte characters: 256 bytes
    let long_name = "ب".repeat(128);
    let identity = EgsIdentityBuilder::new("310175397400003", long_name).build();
    let link = InvoiceChain::genesis().next_link();
    let props = InvoiceBuilder::chained("SME00001", &link, issue_date(), issue_time())
        .seller(identity)
        .add_line(LineItemBuilder::new("1", "Tea", dec!(1), dec!(10)).build())
        .simplified(DocumentKind::Invoice(CashDetails::default()))
        .build()
        .unwrap();
    let assembled = xml::assemble(&props, RoundingPolicy::Strict).unwrap();
    assert!(matches!(
        assembled.with_phase_one_qr(),
        Err(FatooraError::Qr(QrError::ValueTooLong { tag: 1, len: 256 }))
    ));

    let just_fits = "ب".repeat(127) + "a";
    assert_eq!(just_fits.len(), 255);
    assert!(qr::encode_tlv(&[just_fits]).is_ok());
}
