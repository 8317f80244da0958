use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::error::ComputationError;
use super::types::*;

/// How line-level amounts are rounded before they feed the document totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundingPolicy {
    /// Line extension and line tax are rounded to 2 decimals on each line.
    #[default]
    Strict,
    /// Line amounts keep full precision; rounding happens only on output.
    Relaxed,
}

impl RoundingPolicy {
    fn line(&self, value: Decimal) -> Decimal {
        match self {
            Self::Strict => round_half_up(value, 2),
            Self::Relaxed => value,
        }
    }
}

/// Resolved VAT treatment of a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineVat {
    /// 5% or 15%.
    Rate(Decimal),
    /// Zero rate with category code and optional exemption reason.
    ZeroRate {
        category: VatCategory,
        reason_code: Option<String>,
        reason: Option<String>,
    },
}

impl LineVat {
    pub fn category(&self) -> VatCategory {
        match self {
            Self::Rate(_) => VatCategory::StandardRate,
            Self::ZeroRate { category, .. } => *category,
        }
    }

    pub fn percent(&self) -> Decimal {
        match self {
            Self::Rate(rate) => *rate,
            Self::ZeroRate { .. } => Decimal::ZERO,
        }
    }
}

/// Computed amounts for one line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineTotals {
    pub id: String,
    /// Sum of per-unit discounts.
    pub discount_total: Decimal,
    /// quantity × (price − discounts).
    pub line_extension: Decimal,
    /// VAT plus other taxes on the line.
    pub tax_amount: Decimal,
    /// line_extension + tax_amount (`cbc:RoundingAmount`).
    pub tax_inclusive: Decimal,
    pub vat: LineVat,
}

/// One row of the document-level tax breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxSubtotal {
    pub category: VatCategory,
    /// Rate as a fraction (0 for zero-rate categories).
    pub percent: Decimal,
    pub taxable_amount: Decimal,
    /// Rounded once from `exact_tax_amount`.
    pub tax_amount: Decimal,
    /// Unrounded sum of the tax contributions in this row.
    pub exact_tax_amount: Decimal,
    pub exemption_reason_code: Option<String>,
    pub exemption_reason: Option<String>,
}

/// Document-level monetary totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub line_extension_total: Decimal,
    pub tax_exclusive_total: Decimal,
    pub tax_total: Decimal,
    pub tax_inclusive_total: Decimal,
    pub allowance_total: Decimal,
    pub prepaid: Decimal,
    pub payable_total: Decimal,
}

/// Output of [`compute_taxes`], ready to be spliced into the invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxComputation {
    pub lines: Vec<LineTotals>,
    pub subtotals: Vec<TaxSubtotal>,
    pub totals: DocumentTotals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BucketKey {
    /// Zero-rate lines grouped by category code.
    Zero(VatCategory),
    /// Rate-bearing lines and other taxes grouped by numeric rate.
    Rate(Decimal),
}

#[derive(Debug, Default)]
struct Bucket {
    taxable: Decimal,
    tax: Decimal,
    reason_code: Option<String>,
    reason: Option<String>,
}

const VAT_RATES: [Decimal; 2] = [dec!(0.05), dec!(0.15)];

/// Compute line, subtotal and document amounts for the given line items.
///
/// Other taxes whose rate equals 5% or 15% land in the VAT bucket of the same
/// rate, so they add to that row's taxable amount as well as its tax.
pub fn compute_taxes(
    items: &[LineItem],
    policy: RoundingPolicy,
) -> Result<TaxComputation, ComputationError> {
    let mut lines = Vec::with_capacity(items.len());
    let mut buckets: Vec<(BucketKey, Bucket)> = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        check_inputs(item, &prefix)?;
        let vat = resolve_vat(item, &prefix)?;

        let discount_total = item
            .discounts
            .iter()
            .try_fold(Decimal::ZERO, |acc, d| add(acc, d.amount, &prefix))?;
        let net_price = item.tax_exclusive_price - discount_total;
        let line_extension = policy.line(mul(item.quantity, net_price, &prefix)?);

        let vat_contribution = mul(line_extension, vat.percent(), &prefix)?;
        let mut tax_amount = policy.line(vat_contribution);

        let bucket = match &vat {
            LineVat::Rate(rate) => bucket_for(&mut buckets, BucketKey::Rate(*rate)),
            LineVat::ZeroRate { category, .. } => {
                bucket_for(&mut buckets, BucketKey::Zero(*category))
            }
        };
        bucket.taxable = add(bucket.taxable, line_extension, &prefix)?;
        bucket.tax = add(bucket.tax, vat_contribution, &prefix)?;
        if let LineVat::ZeroRate {
            reason_code,
            reason,
            ..
        } = &vat
        {
            if bucket.reason_code.is_none() {
                bucket.reason_code = reason_code.clone().filter(|s| !s.is_empty());
            }
            if bucket.reason.is_none() {
                bucket.reason = reason.clone().filter(|s| !s.is_empty());
            }
        }

        for other in &item.other_taxes {
            let contribution = mul(line_extension, other.percent_amount, &prefix)?;
            tax_amount = add(tax_amount, policy.line(contribution), &prefix)?;

            let bucket = bucket_for(&mut buckets, BucketKey::Rate(other.percent_amount));
            bucket.taxable = add(bucket.taxable, line_extension, &prefix)?;
            bucket.tax = add(bucket.tax, contribution, &prefix)?;
        }

        lines.push(LineTotals {
            id: item.id.clone(),
            discount_total,
            line_extension,
            tax_amount,
            tax_inclusive: add(line_extension, tax_amount, &prefix)?,
            vat,
        });
    }

    let mut subtotals = buckets
        .into_iter()
        .map(|(key, bucket)| {
            let (category, percent) = match key {
                BucketKey::Zero(category) => (category, Decimal::ZERO),
                BucketKey::Rate(rate) => (VatCategory::StandardRate, rate),
            };
            TaxSubtotal {
                category,
                percent,
                taxable_amount: round_half_up(bucket.taxable, 2),
                tax_amount: round_half_up(bucket.tax, 2),
                exact_tax_amount: bucket.tax,
                exemption_reason_code: bucket.reason_code,
                exemption_reason: bucket.reason,
            }
        })
        .collect::<Vec<_>>();

    // Sort breakdown for deterministic output
    subtotals.sort_by(|a, b| {
        a.category
            .code()
            .cmp(b.category.code())
            .then(a.percent.cmp(&b.percent))
    });

    let line_extension_total = round_half_up(
        lines
            .iter()
            .try_fold(Decimal::ZERO, |acc, l| add(acc, l.line_extension, "line_items"))?,
        2,
    );
    // Each row is rounded once from its exact sum; the total adds the rows.
    let tax_total = subtotals
        .iter()
        .try_fold(Decimal::ZERO, |acc, s| add(acc, s.tax_amount, "subtotals"))?;
    let tax_inclusive_total = add(line_extension_total, tax_total, "totals")?;

    Ok(TaxComputation {
        lines,
        subtotals,
        totals: DocumentTotals {
            line_extension_total,
            tax_exclusive_total: line_extension_total,
            tax_total,
            tax_inclusive_total,
            allowance_total: Decimal::ZERO,
            prepaid: Decimal::ZERO,
            payable_total: tax_inclusive_total,
        },
    })
}

fn bucket_for(buckets: &mut Vec<(BucketKey, Bucket)>, key: BucketKey) -> &mut Bucket {
    let idx = match buckets.iter().position(|(k, _)| *k == key) {
        Some(idx) => idx,
        None => {
            buckets.push((key, Bucket::default()));
            buckets.len() - 1
        }
    };
    &mut buckets[idx].1
}

fn check_inputs(item: &LineItem, prefix: &str) -> Result<(), ComputationError> {
    non_negative(item.quantity, format!("{prefix}.quantity"))?;
    non_negative(
        item.tax_exclusive_price,
        format!("{prefix}.tax_exclusive_price"),
    )?;
    for (j, discount) in item.discounts.iter().enumerate() {
        non_negative(discount.amount, format!("{prefix}.discounts[{j}].amount"))?;
    }
    for (j, tax) in item.other_taxes.iter().enumerate() {
        non_negative(
            tax.percent_amount,
            format!("{prefix}.other_taxes[{j}].percent_amount"),
        )?;
    }
    Ok(())
}

fn mul(a: Decimal, b: Decimal, field: &str) -> Result<Decimal, ComputationError> {
    a.checked_mul(b).ok_or_else(|| ComputationError::Overflow {
        field: field.to_string(),
    })
}

fn add(a: Decimal, b: Decimal, field: &str) -> Result<Decimal, ComputationError> {
    a.checked_add(b).ok_or_else(|| ComputationError::Overflow {
        field: field.to_string(),
    })
}

fn non_negative(value: Decimal, field: String) -> Result<(), ComputationError> {
    if value < Decimal::ZERO {
        return Err(ComputationError::Negative { field, value });
    }
    Ok(())
}

fn resolve_vat(item: &LineItem, prefix: &str) -> Result<LineVat, ComputationError> {
    if item.vat_percent.is_zero() {
        return match item.vat_category {
            Some(category) if category != VatCategory::StandardRate => Ok(LineVat::ZeroRate {
                category,
                reason_code: item.exemption_reason_code.clone(),
                reason: item.exemption_reason.clone(),
            }),
            _ => Err(ComputationError::MissingVatCategory {
                field: format!("{prefix}.vat_category"),
            }),
        };
    }

    let category_conflicts = item
        .vat_category
        .is_some_and(|c| c != VatCategory::StandardRate);
    if !VAT_RATES.contains(&item.vat_percent) || category_conflicts {
        return Err(ComputationError::UnsupportedVatRate {
            field: format!("{prefix}.vat_percent"),
            value: item.vat_percent,
        });
    }
    Ok(LineVat::Rate(item.vat_percent))
}

/// Round a Decimal to `dp` decimal places using half-up (commercial rounding).
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LineItemBuilder;

    fn line(qty: Decimal, price: Decimal) -> LineItem {
        LineItemBuilder::new("1", "Widget", qty, price)
            .vat(dec!(0.15))
            .build()
    }

    #[test]
    fn single_line_fifteen_percent() {
        let calc = compute_taxes(&[line(dec!(1), dec!(100))], RoundingPolicy::Strict).unwrap();
        let l = &calc.lines[0];
        assert_eq!(l.line_extension, dec!(100.00));
        assert_eq!(l.tax_amount, dec!(15.00));
        assert_eq!(l.tax_inclusive, dec!(115.00));
        assert_eq!(calc.totals.tax_inclusive_total, dec!(115.00));
        assert_eq!(calc.totals.payable_total, dec!(115.00));
        assert_eq!(calc.totals.prepaid, Decimal::ZERO);
    }

    #[test]
    fn quantity_two_doubles_amounts() {
        let calc = compute_taxes(&[line(dec!(2), dec!(100))], RoundingPolicy::Strict).unwrap();
        assert_eq!(calc.lines[0].line_extension, dec!(200.00));
        assert_eq!(calc.lines[0].tax_amount, dec!(30.00));
    }

    #[test]
    fn discounts_apply_per_unit() {
        let item = LineItemBuilder::new("1", "Widget", dec!(3), dec!(10))
            .vat(dec!(0.15))
            .discount(dec!(2), "promo")
            .build();
        let calc = compute_taxes(&[item], RoundingPolicy::Strict).unwrap();
        assert_eq!(calc.lines[0].discount_total, dec!(2));
        assert_eq!(calc.lines[0].line_extension, dec!(24.00));
        assert_eq!(calc.lines[0].tax_amount, dec!(3.60));
    }

    #[test]
    fn negative_quantity_names_field_and_value() {
        let err = compute_taxes(&[line(dec!(-1), dec!(10))], RoundingPolicy::Strict).unwrap_err();
        assert_eq!(
            err,
            ComputationError::Negative {
                field: "line_items[0].quantity".into(),
                value: dec!(-1),
            }
        );
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn negative_discount_is_not_clamped() {
        let item = LineItemBuilder::new("7", "Widget", dec!(1), dec!(10))
            .vat(dec!(0.15))
            .discount(dec!(-0.5), "bogus")
            .build();
        let err = compute_taxes(&[item], RoundingPolicy::Strict).unwrap_err();
        assert!(matches!(
            err,
            ComputationError::Negative { ref field, value }
                if field == "line_items[0].discounts[0].amount" && value == dec!(-0.5)
        ));
    }

    #[test]
    fn zero_rate_without_category_fails() {
        let item = LineItemBuilder::new("1", "Bread", dec!(1), dec!(5))
            .vat(Decimal::ZERO)
            .build();
        let err = compute_taxes(&[item], RoundingPolicy::Strict).unwrap_err();
        assert!(matches!(err, ComputationError::MissingVatCategory { .. }));
    }

    #[test]
    fn zero_rate_categories_accumulate_with_first_reason() {
        let a = LineItemBuilder::new("1", "Export", dec!(1), dec!(50))
            .zero_rated(VatCategory::ZeroRated, Some("VATEX-SA-32"), Some("Export of goods"))
            .build();
        let b = LineItemBuilder::new("2", "Export 2", dec!(2), dec!(25))
            .zero_rated(VatCategory::ZeroRated, Some("VATEX-SA-33"), None)
            .build();
        let calc = compute_taxes(&[a, b], RoundingPolicy::Strict).unwrap();
        assert_eq!(calc.subtotals.len(), 1);
        let zero = &calc.subtotals[0];
        assert_eq!(zero.category, VatCategory::ZeroRated);
        assert_eq!(zero.taxable_amount, dec!(100.00));
        assert_eq!(zero.tax_amount, Decimal::ZERO);
        assert_eq!(zero.exemption_reason_code.as_deref(), Some("VATEX-SA-32"));
        assert_eq!(zero.exemption_reason.as_deref(), Some("Export of goods"));
    }

    #[test]
    fn other_tax_at_vat_rate_folds_into_vat_bucket() {
        let item = LineItemBuilder::new("1", "Tobacco", dec!(1), dec!(100))
            .vat(dec!(0.15))
            .other_tax(dec!(0.150))
            .build();
        let calc = compute_taxes(&[item], RoundingPolicy::Strict).unwrap();
        assert_eq!(calc.subtotals.len(), 1);
        assert_eq!(calc.subtotals[0].taxable_amount, dec!(200.00));
        assert_eq!(calc.subtotals[0].tax_amount, dec!(30.00));
        assert_eq!(calc.lines[0].tax_amount, dec!(30.00));
    }

    #[test]
    fn other_tax_at_distinct_rate_gets_own_row() {
        let item = LineItemBuilder::new("1", "Drink", dec!(1), dec!(10))
            .vat(dec!(0.15))
            .other_tax(dec!(0.5))
            .build();
        let calc = compute_taxes(&[item], RoundingPolicy::Strict).unwrap();
        assert_eq!(calc.subtotals.len(), 2);
        assert_eq!(calc.totals.tax_total, dec!(6.50));
    }

    #[test]
    fn document_tax_is_rounded_once() {
        // 3 × 0.03 at 15% → 0.0045 each; summed exactly then rounded.
        let items: Vec<_> = (1..=3)
            .map(|i| {
                LineItemBuilder::new(i.to_string(), "Bolt", dec!(1), dec!(0.03))
                    .vat(dec!(0.15))
                    .build()
            })
            .collect();
        let calc = compute_taxes(&items, RoundingPolicy::Strict).unwrap();
        assert_eq!(calc.totals.tax_total, dec!(0.01));
        // Per-line rounding would give 3 × 0.00 = 0.00.
        assert!(calc.lines.iter().all(|l| l.tax_amount.is_zero()));
    }

    #[test]
    fn tax_total_matches_subtotal_rows() {
        // 0.0045 at 15% and 0.0045 at 5% each round to 0.00 on their own row.
        let a = LineItemBuilder::new("1", "Bolt", dec!(1), dec!(0.03))
            .vat(dec!(0.15))
            .build();
        let b = LineItemBuilder::new("2", "Nut", dec!(1), dec!(0.09))
            .vat(dec!(0.05))
            .build();
        let calc = compute_taxes(&[a, b], RoundingPolicy::Strict).unwrap();
        assert!(calc.subtotals.iter().all(|s| s.tax_amount.is_zero()));
        assert_eq!(calc.totals.tax_total, dec!(0.00));
        assert_eq!(calc.totals.tax_inclusive_total, dec!(0.12));
    }

    #[test]
    fn overflowing_line_is_an_error() {
        let item = line(Decimal::MAX, dec!(2));
        let err = compute_taxes(&[item], RoundingPolicy::Strict).unwrap_err();
        assert_eq!(
            err,
            ComputationError::Overflow {
                field: "line_items[0]".into()
            }
        );
    }

    #[test]
    fn relaxed_policy_keeps_line_precision() {
        let item = LineItemBuilder::new("1", "Fuel", dec!(1.333), dec!(2.5))
            .vat(dec!(0.15))
            .build();
        let calc = compute_taxes(&[item], RoundingPolicy::Relaxed).unwrap();
        assert_eq!(calc.lines[0].line_extension, dec!(3.3325));
        assert_eq!(calc.totals.line_extension_total, dec!(3.33));
        assert_eq!(calc.totals.tax_total, dec!(0.50));
    }

    #[test]
    fn unsupported_rate_rejected() {
        let item = LineItemBuilder::new("1", "X", dec!(1), dec!(1))
            .vat(dec!(0.10))
            .build();
        assert!(matches!(
            compute_taxes(&[item], RoundingPolicy::Strict),
            Err(ComputationError::UnsupportedVatRate { .. })
        ));
    }

    #[test]
    fn round_half_up_cases() {
        assert_eq!(round_half_up(dec!(0.005), 2), dec!(0.01));
        assert_eq!(round_half_up(dec!(2.675), 2), dec!(2.68));
        assert_eq!(round_half_up(dec!(-0.005), 2), dec!(-0.01));
    }
}
