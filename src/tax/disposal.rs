use crate::tax::lots::{LotError, LotPool, Method};
use crate::transaction::TransactionKind;
use crate::utils::{serialize_quantity, serialize_usd};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Number of whole days beyond which a holding is long-term.
pub const LONG_TERM_DAYS: i64 = 365;

/// One realized gain or loss against a single consumed lot.
#[derive(Debug, Clone, Serialize)]
pub struct Disposal {
    pub asset: String,
    #[serde(serialize_with = "serialize_quantity")]
    pub amount: Decimal,
    pub disposed_at: DateTime<Utc>,
    pub kind: TransactionKind,
    #[serde(serialize_with = "serialize_usd")]
    pub proceeds: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub cost_basis: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub gain: Decimal,
    pub long_term: bool,
    pub days_held: i64,
    pub acquired_at: DateTime<Utc>,
    pub lot_id: u64,
}

/// Dispose `amount` of `asset` from `wallet`, splitting `proceeds`
/// across the consumed lots in proportion to the amount taken from each.
///
/// The last lot receives the unallocated remainder so the per-lot
/// proceeds always sum exactly to the total.
#[allow(clippy::too_many_arguments)]
pub fn dispose(
    pool: &mut LotPool,
    wallet: &str,
    asset: &str,
    amount: Decimal,
    proceeds: Decimal,
    disposed_at: DateTime<Utc>,
    kind: TransactionKind,
    method: Method,
) -> Result<Vec<Disposal>, LotError> {
    let consumed = pool.consume(wallet, asset, amount, method)?;
    let total: Decimal = consumed.iter().map(|c| c.amount).sum();

    let mut disposals = Vec::with_capacity(consumed.len());
    let mut allocated = Decimal::ZERO;
    let last = consumed.len().saturating_sub(1);
    for (i, lot) in consumed.iter().enumerate() {
        let share = if i == last {
            proceeds - allocated
        } else {
            proceeds * lot.amount / total
        };
        allocated += share;

        let cost_basis = lot.amount * lot.basis_per_unit;
        let days_held = (disposed_at - lot.acquired_at).num_days();
        disposals.push(Disposal {
            asset: lot.asset.clone(),
            amount: lot.amount,
            disposed_at,
            kind,
            proceeds: share,
            cost_basis,
            gain: share - cost_basis,
            long_term: days_held > LONG_TERM_DAYS,
            days_held,
            acquired_at: lot.acquired_at,
            lot_id: lot.lot_id,
        });
    }
    Ok(disposals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::parse_instant;
    use rust_decimal_macros::dec;

    fn dt(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap().instant
    }

    fn pool_with_thirds() -> LotPool {
        let mut pool = LotPool::new();
        for (month, basis) in [(1, dec!(10)), (2, dec!(20)), (3, dec!(30))] {
            pool.add(
                "W",
                "ETH",
                dec!(1),
                basis,
                dt(&format!("2024-0{month}-01T00:00:00Z")),
                TransactionKind::Buy,
            );
        }
        pool
    }

    #[test]
    fn proceeds_split_proportionally_and_sum_exactly() {
        let mut pool = pool_with_thirds();
        // 100 does not divide evenly across three one-ETH lots.
        let disposals = dispose(
            &mut pool,
            "W",
            "ETH",
            dec!(3),
            dec!(100),
            dt("2024-06-01T00:00:00Z"),
            TransactionKind::Sell,
            Method::Fifo,
        )
        .unwrap();

        assert_eq!(disposals.len(), 3);
        let total: Decimal = disposals.iter().map(|d| d.proceeds).sum();
        assert_eq!(total, dec!(100));
        let amounts: Decimal = disposals.iter().map(|d| d.amount).sum();
        assert_eq!(amounts, dec!(3));
    }

    #[test]
    fn gain_preserves_sign_per_lot() {
        let mut pool = pool_with_thirds();
        let disposals = dispose(
            &mut pool,
            "W",
            "ETH",
            dec!(3),
            dec!(60),
            dt("2024-06-01T00:00:00Z"),
            TransactionKind::Sell,
            Method::Fifo,
        )
        .unwrap();
        // 20 proceeds per lot against 10/20/30 basis.
        assert_eq!(disposals[0].gain, dec!(10));
        assert_eq!(disposals[1].gain, dec!(0));
        assert_eq!(disposals[2].gain, dec!(-10));
    }

    #[test]
    fn cost_basis_is_amount_times_basis_per_unit() {
        let mut pool = LotPool::new();
        pool.add(
            "W",
            "BTC",
            dec!(2),
            dec!(30000),
            dt("2024-01-01T00:00:00Z"),
            TransactionKind::Buy,
        );
        let disposals = dispose(
            &mut pool,
            "W",
            "BTC",
            dec!(0.5),
            dec!(20000),
            dt("2024-06-01T00:00:00Z"),
            TransactionKind::Sell,
            Method::Fifo,
        )
        .unwrap();
        assert_eq!(disposals[0].cost_basis, dec!(15000));
        assert_eq!(disposals[0].gain, dec!(5000));
    }

    #[test]
    fn holding_period_is_strictly_more_than_365_days() {
        let mut pool = LotPool::new();
        for _ in 0..2 {
            pool.add(
                "W",
                "BTC",
                dec!(1),
                dec!(100),
                dt("2023-01-01T00:00:00Z"),
                TransactionKind::Buy,
            );
        }

        // Exactly 365 days: still short-term.
        let at_365 = dispose(
            &mut pool,
            "W",
            "BTC",
            dec!(1),
            dec!(200),
            dt("2024-01-01T00:00:00Z"),
            TransactionKind::Sell,
            Method::Fifo,
        )
        .unwrap();
        assert_eq!(at_365[0].days_held, 365);
        assert!(!at_365[0].long_term);

        // 366 days: long-term.
        let at_366 = dispose(
            &mut pool,
            "W",
            "BTC",
            dec!(1),
            dec!(200),
            dt("2024-01-02T00:00:00Z"),
            TransactionKind::Sell,
            Method::Fifo,
        )
        .unwrap();
        assert_eq!(at_366[0].days_held, 366);
        assert!(at_366[0].long_term);
    }

    #[test]
    fn partial_days_round_down() {
        let mut pool = LotPool::new();
        pool.add(
            "W",
            "BTC",
            dec!(1),
            dec!(100),
            dt("2024-01-01T12:00:00Z"),
            TransactionKind::Buy,
        );
        let disposals = dispose(
            &mut pool,
            "W",
            "BTC",
            dec!(1),
            dec!(200),
            dt("2024-01-03T06:00:00Z"),
            TransactionKind::Sell,
            Method::Fifo,
        )
        .unwrap();
        assert_eq!(disposals[0].days_held, 1);
    }

    #[test]
    fn hifo_realizes_no_more_gain_than_fifo_or_lifo() {
        let build = || pool_with_thirds();
        let sell = |pool: &mut LotPool, method: Method| -> Decimal {
            dispose(
                pool,
                "W",
                "ETH",
                dec!(1.5),
                dec!(75),
                dt("2024-06-01T00:00:00Z"),
                TransactionKind::Sell,
                method,
            )
            .unwrap()
            .iter()
            .map(|d| d.gain)
            .sum()
        };

        let fifo = sell(&mut build(), Method::Fifo);
        let lifo = sell(&mut build(), Method::Lifo);
        let hifo = sell(&mut build(), Method::Hifo);
        assert!(hifo <= fifo);
        assert!(hifo <= lifo);
    }

    #[test]
    fn insufficient_lots_propagates_without_partial_output() {
        let mut pool = LotPool::new();
        let err = dispose(
            &mut pool,
            "W",
            "BTC",
            dec!(1),
            dec!(100),
            dt("2024-01-01T00:00:00Z"),
            TransactionKind::Sell,
            Method::Fifo,
        );
        assert!(err.is_err());
    }

    #[test]
    fn zero_proceeds_disposal_recognizes_full_loss() {
        let mut pool = LotPool::new();
        pool.add(
            "W",
            "BTC",
            dec!(1),
            dec!(30000),
            dt("2024-01-01T00:00:00Z"),
            TransactionKind::Buy,
        );
        let disposals = dispose(
            &mut pool,
            "W",
            "BTC",
            dec!(0.5),
            Decimal::ZERO,
            dt("2024-03-01T00:00:00Z"),
            TransactionKind::GiftSent,
            Method::Fifo,
        )
        .unwrap();
        assert_eq!(disposals[0].proceeds, Decimal::ZERO);
        assert_eq!(disposals[0].cost_basis, dec!(15000));
        assert_eq!(disposals[0].gain, dec!(-15000));
    }
}
