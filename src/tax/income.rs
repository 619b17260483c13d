use crate::transaction::{Transaction, TransactionKind};
use crate::utils::{serialize_quantity, serialize_usd};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Ordinary income recognized at fair market value. The same value is
/// the basis of the lot the event creates.
#[derive(Debug, Clone, Serialize)]
pub struct IncomeEvent {
    pub date: DateTime<Utc>,
    pub kind: TransactionKind,
    pub asset: String,
    #[serde(serialize_with = "serialize_quantity")]
    pub amount: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub fmv_usd: Decimal,
    pub wallet: String,
}

/// Recognize a transaction as ordinary income.
///
/// Returns `None` unless the kind is one of MINING, STAKING, AIRDROP,
/// FORK, INCOME and the received leg carries asset, amount, and unit
/// price.
pub fn classify_income(tx: &Transaction) -> Option<IncomeEvent> {
    if !tx.kind.is_income() {
        return None;
    }
    let asset = tx.received_asset.as_ref()?;
    let amount = tx.received_amount?;
    let unit_price = tx.received_price_usd?;

    Some(IncomeEvent {
        date: tx.date_time,
        kind: tx.kind,
        asset: asset.clone(),
        amount,
        fmv_usd: amount * unit_price,
        wallet: tx.wallet.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::parse_instant;
    use rust_decimal_macros::dec;

    fn income_tx(kind: TransactionKind) -> Transaction {
        Transaction {
            row: 2,
            date_time: parse_instant("2024-03-01T00:00:00Z").unwrap().instant,
            kind,
            sent_asset: None,
            sent_amount: None,
            sent_price_usd: None,
            received_asset: Some("ETH".to_string()),
            received_amount: Some(dec!(0.5)),
            received_price_usd: Some(dec!(2000)),
            fee_amount: None,
            fee_asset: None,
            fee_usd: None,
            wallet: "Kraken".to_string(),
            tx_hash: None,
            notes: None,
        }
    }

    #[test]
    fn staking_reward_recognized_at_fmv() {
        let event = classify_income(&income_tx(TransactionKind::Staking)).unwrap();
        assert_eq!(event.fmv_usd, dec!(1000));
        assert_eq!(event.amount, dec!(0.5));
        assert_eq!(event.asset, "ETH");
        assert_eq!(event.wallet, "Kraken");
    }

    #[test]
    fn all_income_kinds_classify() {
        for kind in [
            TransactionKind::Mining,
            TransactionKind::Staking,
            TransactionKind::Airdrop,
            TransactionKind::Fork,
            TransactionKind::Income,
        ] {
            let event = classify_income(&income_tx(kind)).unwrap();
            assert_eq!(event.kind, kind);
        }
    }

    #[test]
    fn non_income_kinds_return_none() {
        assert!(classify_income(&income_tx(TransactionKind::Buy)).is_none());
        assert!(classify_income(&income_tx(TransactionKind::Receive)).is_none());
        assert!(classify_income(&income_tx(TransactionKind::Sell)).is_none());
    }

    #[test]
    fn missing_unit_price_returns_none() {
        let mut tx = income_tx(TransactionKind::Mining);
        tx.received_price_usd = None;
        assert!(classify_income(&tx).is_none());
    }

    #[test]
    fn missing_received_leg_returns_none() {
        let mut tx = income_tx(TransactionKind::Airdrop);
        tx.received_asset = None;
        assert!(classify_income(&tx).is_none());
    }

    #[test]
    fn fmv_keeps_exact_decimals() {
        let mut tx = income_tx(TransactionKind::Staking);
        tx.received_amount = Some(dec!(0.123));
        tx.received_price_usd = Some(dec!(1999.99));
        let event = classify_income(&tx).unwrap();
        assert_eq!(event.fmv_usd, dec!(0.123) * dec!(1999.99));
    }
}
