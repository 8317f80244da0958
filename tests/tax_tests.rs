//! Tax engine tests: worked examples and property-based invariants.
//!
//! Run with: `cargo test --test tax_tests`

#![cfg(feature = "core")]

use fatoora::core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn line(id: &str, qty: Decimal, price: Decimal) -> LineItemBuilder {
    LineItemBuilder::new(id, format!("Item {id}"), qty, price)
}

// --- Worked examples ---

#[test]
fn one_unit_at_fifteen_percent() {
    let calc = compute_taxes(&[line("1", dec!(1), dec!(100)).build()], RoundingPolicy::Strict)
        .unwrap();
    let l = &calc.lines[0];
    assert_eq!(l.line_extension, dec!(100.00));
    assert_eq!(l.tax_amount, dec!(15.00));
    assert_eq!(l.tax_inclusive, dec!(115.00));
}

#[test]
fn two_units_at_fifteen_percent() {
    let calc = compute_taxes(&[line("1", dec!(2), dec!(100)).build()], RoundingPolicy::Strict)
        .unwrap();
    assert_eq!(calc.lines[0].line_extension, dec!(200.00));
    assert_eq!(calc.lines[0].tax_amount, dec!(30.00));
    assert_eq!(calc.totals.tax_inclusive_total, dec!(230.00));
    assert_eq!(calc.totals.payable_total, dec!(230.00));
    assert_eq!(calc.totals.prepaid, Decimal::ZERO);
}

#[test]
fn discount_is_per_unit() {
    let item = line("1", dec!(44), dec!(22))
        .discount(dec!(1), "A discount")
        .build();
    let calc = compute_taxes(&[item], RoundingPolicy::Strict).unwrap();
    assert_eq!(calc.lines[0].line_extension, dec!(924.00));
    assert_eq!(calc.lines[0].tax_amount, dec!(138.60));
}

#[test]
fn mixed_rates_and_zero_rated_groups() {
    let items = vec![
        line("1", dec!(1), dec!(100)).build(),
        line("2", dec!(1), dec!(50)).vat(dec!(0.05)).build(),
        line("3", dec!(1), dec!(30))
            .zero_rated(VatCategory::Exempt, Some("VATEX-SA-29"), Some("Financial services"))
            .build(),
        line("4", dec!(1), dec!(20))
            .zero_rated(VatCategory::Exempt, None, Some("ignored, first reason wins"))
            .build(),
        line("5", dec!(1), dec!(10))
            .zero_rated(VatCategory::ZeroRated, Some("VATEX-SA-32"), Some("Export"))
            .build(),
    ];
    let calc = compute_taxes(&items, RoundingPolicy::Strict).unwrap();

    let rows: Vec<(&str, Decimal, Decimal, Decimal)> = calc
        .subtotals
        .iter()
        .map(|s| (s.category.code(), s.percent, s.taxable_amount, s.tax_amount))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("E", dec!(0), dec!(50.00), dec!(0.00)),
            ("S", dec!(0.05), dec!(50.00), dec!(2.50)),
            ("S", dec!(0.15), dec!(100.00), dec!(15.00)),
            ("Z", dec!(0), dec!(10.00), dec!(0.00)),
        ]
    );
    let exempt = &calc.subtotals[0];
    assert_eq!(exempt.exemption_reason_code.as_deref(), Some("VATEX-SA-29"));
    assert_eq!(exempt.exemption_reason.as_deref(), Some("Financial services"));
    assert_eq!(calc.totals.tax_total, dec!(17.50));
    assert_eq!(calc.totals.tax_inclusive_total, dec!(227.50));
}

#[test]
fn other_tax_at_vat_rate_folds_into_vat_row() {
    let item = line("1", dec!(1), dec!(100)).other_tax(dec!(0.05)).build();
    let vat5 = line("2", dec!(1), dec!(40)).vat(dec!(0.05)).build();
    let calc = compute_taxes(&[item, vat5], RoundingPolicy::Strict).unwrap();

    let five = calc
        .subtotals
        .iter()
        .find(|s| s.percent == dec!(0.05))
        .unwrap();
    // 100 from the other tax plus 40 from the 5% line
    assert_eq!(five.taxable_amount, dec!(140.00));
    assert_eq!(five.tax_amount, dec!(7.00));
    assert_eq!(calc.lines[0].tax_amount, dec!(20.00));
}

#[test]
fn tax_total_is_rounded_once() {
    // Each line: 0.03 * 0.15 = 0.0045, which rounds to 0.00 on its own.
    let items: Vec<LineItem> = (1..=3)
        .map(|i| line(&i.to_string(), dec!(1), dec!(0.03)).build())
        .collect();
    let calc = compute_taxes(&items, RoundingPolicy::Relaxed).unwrap();
    assert_eq!(calc.totals.tax_total, dec!(0.01));
    assert_eq!(calc.subtotals[0].exact_tax_amount, dec!(0.0135));
}

#[test]
fn tax_total_never_disagrees_with_rows() {
    // Both rows hold 0.0045 of exact tax and render as 0.00.
    let items = [
        line("1", dec!(1), dec!(0.03)).build(),
        line("2", dec!(1), dec!(0.09)).vat(dec!(0.05)).build(),
    ];
    let calc = compute_taxes(&items, RoundingPolicy::Strict).unwrap();
    let rows: Vec<Decimal> = calc.subtotals.iter().map(|s| s.tax_amount).collect();
    assert_eq!(rows, [dec!(0.00), dec!(0.00)]);
    assert_eq!(calc.totals.tax_total, dec!(0.00));
}

#[test]
fn huge_amounts_fail_instead_of_panicking() {
    let item = line("1", Decimal::MAX, dec!(10)).build();
    assert!(matches!(
        compute_taxes(&[item], RoundingPolicy::Strict),
        Err(ComputationError::Overflow { ref field }) if field == "line_items[0]"
    ));
}

#[test]
fn zero_vat_without_category_fails() {
    let item = line("1", dec!(1), dec!(10)).vat(Decimal::ZERO).build();
    let err = compute_taxes(&[item], RoundingPolicy::Strict).unwrap_err();
    assert_eq!(
        err,
        ComputationError::MissingVatCategory {
            field: "line_items[0].vat_category".into()
        }
    );
}

#[test]
fn zero_vat_with_each_category_succeeds() {
    for category in [
        VatCategory::NotSubjectToVat,
        VatCategory::ZeroRated,
        VatCategory::Exempt,
    ] {
        let item = line("1", dec!(3), dec!(10))
            .zero_rated(category, None, None)
            .build();
        let calc = compute_taxes(&[item], RoundingPolicy::Strict).unwrap();
        assert_eq!(calc.lines[0].tax_amount, Decimal::ZERO);
        assert_eq!(calc.lines[0].line_extension, dec!(30));
    }
}

#[test]
fn negative_inputs_name_field_and_value() {
    let cases = [
        (
            line("1", dec!(-1), dec!(10)).build(),
            "line_items[0].quantity",
            dec!(-1),
        ),
        (
            line("1", dec!(1), dec!(-10)).build(),
            "line_items[0].tax_exclusive_price",
            dec!(-10),
        ),
        (
            line("1", dec!(1), dec!(10)).discount(dec!(-2), "x").build(),
            "line_items[0].discounts[0].amount",
            dec!(-2),
        ),
    ];
    for (item, field, value) in cases {
        let err = compute_taxes(&[item], RoundingPolicy::Strict).unwrap_err();
        assert_eq!(
            err,
            ComputationError::Negative {
                field: field.into(),
                value
            }
        );
        assert!(err.to_string().contains(&value.to_string()));
    }
}

#[test]
fn unsupported_rate_is_rejected() {
    let item = line("1", dec!(1), dec!(10)).vat(dec!(0.10)).build();
    assert!(matches!(
        compute_taxes(&[item], RoundingPolicy::Strict),
        Err(ComputationError::UnsupportedVatRate { .. })
    ));
}

// ── Proptest Strategies ─────────────────────────────────────────────────────

/// 0.01 to 99999.99
fn arb_price() -> impl Strategy<Value = Decimal> {
    (1u64..10_000_000u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// 0.001 to 999.999
fn arb_quantity() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000u64).prop_map(|milli| Decimal::new(milli as i64, 3))
}

fn arb_rate() -> impl Strategy<Value = Decimal> {
    prop_oneof![Just(dec!(0.15)), Just(dec!(0.05))]
}

fn arb_item() -> impl Strategy<Value = LineItem> {
    (arb_quantity(), arb_price(), arb_rate())
        .prop_map(|(qty, price, rate)| line("x", qty, price).vat(rate).build())
}

proptest! {
    #[test]
    fn strict_line_totals_add_up(item in arb_item()) {
        let calc = compute_taxes(&[item], RoundingPolicy::Strict).unwrap();
        let l = &calc.lines[0];
        prop_assert_eq!(l.line_extension + l.tax_amount, l.tax_inclusive);
        prop_assert!(l.line_extension.scale() <= 2);
        prop_assert!(l.tax_amount.scale() <= 2);
    }

    #[test]
    fn document_tax_equals_sum_of_subtotal_rows(
        items in prop::collection::vec(arb_item(), 1..12),
        strict in any::<bool>(),
    ) {
        let policy = if strict { RoundingPolicy::Strict } else { RoundingPolicy::Relaxed };
        let calc = compute_taxes(&items, policy).unwrap();
        let rows: Decimal = calc.subtotals.iter().map(|s| s.tax_amount).sum();
        prop_assert_eq!(calc.totals.tax_total, rows);
        for row in &calc.subtotals {
            prop_assert_eq!(row.tax_amount, round_half_up(row.exact_tax_amount, 2));
        }
        prop_assert_eq!(
            calc.totals.tax_inclusive_total,
            calc.totals.tax_exclusive_total + calc.totals.tax_total
        );
        prop_assert_eq!(calc.totals.payable_total, calc.totals.tax_inclusive_total);
    }

    #[test]
    fn subtotal_rows_sum_to_line_extension(items in prop::collection::vec(arb_item(), 1..12)) {
        let calc = compute_taxes(&items, RoundingPolicy::Strict).unwrap();
        let taxable: Decimal = calc.subtotals.iter().map(|s| s.taxable_amount).sum();
        prop_assert_eq!(taxable, calc.totals.line_extension_total);
        prop_assert!(calc.subtotals.len() <= 2);
    }

    #[test]
    fn negative_quantity_never_clamped(cents in 1i64..1_000_000) {
        let qty = Decimal::new(-cents, 2);
        let err = compute_taxes(&[line("1", qty, dec!(10)).build()], RoundingPolicy::Strict)
            .unwrap_err();
        prop_assert_eq!(err, ComputationError::Negative { field: "line_items[0].quantity".into(), value: qty });
    }
}
