use crate::diagnostics::{RowError, RowWarning};
use crate::tax::disposal::Disposal;
use crate::tax::income::IncomeEvent;
use crate::tax::lots::{Method, TaxLot};
use crate::utils::{format_quantity, serialize_usd};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One Form-8949-style row for a disposal in the target year.
#[derive(Debug, Clone, Serialize)]
pub struct Form8949Row {
    /// `"<amount> <asset>"`, amount formatted to 8 decimal places with
    /// trailing zeros trimmed.
    pub description: String,
    pub date_acquired: DateTime<Utc>,
    pub date_sold: DateTime<Utc>,
    #[serde(serialize_with = "serialize_usd")]
    pub proceeds: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub cost_basis: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub gain: Decimal,
    pub long_term: bool,
    pub days_held: i64,
}

impl Form8949Row {
    fn from_disposal(disposal: &Disposal) -> Self {
        Form8949Row {
            description: format!(
                "{} {}",
                format_quantity(disposal.amount),
                disposal.asset
            ),
            date_acquired: disposal.acquired_at,
            date_sold: disposal.disposed_at,
            proceeds: disposal.proceeds,
            cost_basis: disposal.cost_basis,
            gain: disposal.gain,
            long_term: disposal.long_term,
            days_held: disposal.days_held,
        }
    }
}

/// Schedule-D-style totals. Losses are stored as non-positive values so
/// the nets are plain sums.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    #[serde(serialize_with = "serialize_usd")]
    pub short_term_gains: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub short_term_losses: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub long_term_gains: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub long_term_losses: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub net_short_term: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub net_long_term: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub total: Decimal,
}

impl ScheduleSummary {
    pub fn from_disposals<'a>(disposals: impl IntoIterator<Item = &'a Disposal>) -> Self {
        let mut summary = ScheduleSummary::default();
        for disposal in disposals {
            match (disposal.long_term, disposal.gain >= Decimal::ZERO) {
                (false, true) => summary.short_term_gains += disposal.gain,
                (false, false) => summary.short_term_losses += disposal.gain,
                (true, true) => summary.long_term_gains += disposal.gain,
                (true, false) => summary.long_term_losses += disposal.gain,
            }
        }
        summary.net_short_term = summary.short_term_gains + summary.short_term_losses;
        summary.net_long_term = summary.long_term_gains + summary.long_term_losses;
        summary.total = summary.net_short_term + summary.net_long_term;
        summary
    }
}

/// The full report for one tax year. Residual lots are not filtered by
/// year so the report doubles as a carry-forward inventory snapshot.
#[derive(Debug, Serialize)]
pub struct TaxReport {
    pub year: i32,
    pub method: Method,
    pub rows: Vec<Form8949Row>,
    pub income_events: Vec<IncomeEvent>,
    #[serde(serialize_with = "serialize_usd")]
    pub total_income: Decimal,
    pub summary: ScheduleSummary,
    pub remaining_lots: Vec<TaxLot>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<RowWarning>,
}

/// Filter realized events to `year` (UTC) and aggregate.
pub fn generate_report(
    disposals: &[Disposal],
    income_events: &[IncomeEvent],
    remaining_lots: &[TaxLot],
    year: i32,
    method: Method,
    pre_errors: Vec<RowError>,
    pre_warnings: Vec<RowWarning>,
) -> TaxReport {
    let in_year: Vec<&Disposal> = disposals
        .iter()
        .filter(|d| d.disposed_at.year() == year)
        .collect();

    let income: Vec<IncomeEvent> = income_events
        .iter()
        .filter(|e| e.date.year() == year)
        .cloned()
        .collect();
    let total_income = income.iter().map(|e| e.fmv_usd).sum();

    TaxReport {
        year,
        method,
        rows: in_year.iter().map(|d| Form8949Row::from_disposal(d)).collect(),
        income_events: income,
        total_income,
        summary: ScheduleSummary::from_disposals(in_year.iter().copied()),
        remaining_lots: remaining_lots.to_vec(),
        errors: pre_errors,
        warnings: pre_warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{parse_instant, TransactionKind};
    use rust_decimal_macros::dec;

    fn dt(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap().instant
    }

    fn disposal(date: &str, gain: Decimal, long_term: bool) -> Disposal {
        Disposal {
            asset: "BTC".to_string(),
            amount: dec!(0.5),
            disposed_at: dt(date),
            kind: TransactionKind::Sell,
            proceeds: gain.max(Decimal::ZERO) + dec!(1000),
            cost_basis: (gain.max(Decimal::ZERO) + dec!(1000)) - gain,
            gain,
            long_term,
            days_held: if long_term { 400 } else { 100 },
            acquired_at: dt("2023-01-01T00:00:00Z"),
            lot_id: 1,
        }
    }

    fn income(date: &str, fmv: Decimal) -> IncomeEvent {
        IncomeEvent {
            date: dt(date),
            kind: TransactionKind::Staking,
            asset: "ETH".to_string(),
            amount: dec!(1),
            fmv_usd: fmv,
            wallet: "Kraken".to_string(),
        }
    }

    #[test]
    fn summary_buckets_by_term_and_sign() {
        let disposals = vec![
            disposal("2024-02-01T00:00:00Z", dec!(500), false),
            disposal("2024-03-01T00:00:00Z", dec!(-200), false),
            disposal("2024-04-01T00:00:00Z", dec!(1000), true),
            disposal("2024-05-01T00:00:00Z", dec!(-300), true),
        ];
        let summary = ScheduleSummary::from_disposals(&disposals);
        assert_eq!(summary.short_term_gains, dec!(500));
        assert_eq!(summary.short_term_losses, dec!(-200));
        assert_eq!(summary.long_term_gains, dec!(1000));
        assert_eq!(summary.long_term_losses, dec!(-300));
        assert_eq!(summary.net_short_term, dec!(300));
        assert_eq!(summary.net_long_term, dec!(700));
        assert_eq!(summary.total, dec!(1000));
    }

    #[test]
    fn zero_gain_counts_as_gain_not_loss() {
        let disposals = vec![disposal("2024-02-01T00:00:00Z", dec!(0), false)];
        let summary = ScheduleSummary::from_disposals(&disposals);
        assert_eq!(summary.short_term_gains, dec!(0));
        assert_eq!(summary.short_term_losses, dec!(0));
    }

    #[test]
    fn report_filters_disposals_and_income_by_utc_year() {
        let disposals = vec![
            disposal("2023-12-31T23:59:59Z", dec!(100), false),
            disposal("2024-01-01T00:00:00Z", dec!(200), false),
        ];
        let income_events = vec![
            income("2023-06-01T00:00:00Z", dec!(50)),
            income("2024-06-01T00:00:00Z", dec!(75)),
        ];
        let report = generate_report(
            &disposals,
            &income_events,
            &[],
            2024,
            Method::Fifo,
            vec![],
            vec![],
        );
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.summary.total, dec!(200));
        assert_eq!(report.income_events.len(), 1);
        assert_eq!(report.total_income, dec!(75));
    }

    #[test]
    fn residual_lots_are_not_year_filtered() {
        let lots = vec![TaxLot {
            id: 1,
            asset: "BTC".to_string(),
            remaining: dec!(1),
            original: dec!(1),
            basis_per_unit: dec!(30000),
            acquired_at: dt("2020-01-01T00:00:00Z"),
            acquired_as: TransactionKind::Buy,
            wallet: "Coinbase".to_string(),
        }];
        let report = generate_report(&[], &[], &lots, 2024, Method::Fifo, vec![], vec![]);
        assert_eq!(report.remaining_lots.len(), 1);
    }

    #[test]
    fn description_trims_trailing_zeros() {
        let mut d = disposal("2024-02-01T00:00:00Z", dec!(100), false);
        d.amount = dec!(0.50000000);
        let row = Form8949Row::from_disposal(&d);
        assert_eq!(row.description, "0.5 BTC");

        d.amount = dec!(2);
        let row = Form8949Row::from_disposal(&d);
        assert_eq!(row.description, "2 BTC");

        d.amount = dec!(0.0161652);
        let row = Form8949Row::from_disposal(&d);
        assert_eq!(row.description, "0.0161652 BTC");
    }

    #[test]
    fn row_carries_holding_metadata() {
        let d = disposal("2024-04-01T00:00:00Z", dec!(1000), true);
        let row = Form8949Row::from_disposal(&d);
        assert!(row.long_term);
        assert_eq!(row.days_held, 400);
        assert_eq!(row.date_acquired, dt("2023-01-01T00:00:00Z"));
        assert_eq!(row.date_sold, dt("2024-04-01T00:00:00Z"));
    }

    #[test]
    fn report_serializes_to_json() {
        let report = generate_report(
            &[disposal("2024-02-01T00:00:00Z", dec!(500), false)],
            &[income("2024-06-01T00:00:00Z", dec!(75))],
            &[],
            2024,
            Method::Hifo,
            vec![],
            vec![],
        );
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"Hifo\""));
        assert!(json.contains("\"total\":\"500.00\""));
    }
}
