use crate::transaction::TransactionKind;
use crate::utils::{serialize_quantity, serialize_usd};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Lot selection policy applied when inventory is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Method {
    Fifo,
    Lifo,
    Hifo,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Fifo => "FIFO",
            Method::Lifo => "LIFO",
            Method::Hifo => "HIFO",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LotError {
    #[error(
        "Insufficient lots for {asset} in {wallet}: requested {requested}, available {available}"
    )]
    InsufficientLots {
        wallet: String,
        asset: String,
        requested: Decimal,
        available: Decimal,
    },
}

/// A unit of inventory: one contiguous acquisition of an asset.
#[derive(Debug, Clone, Serialize)]
pub struct TaxLot {
    pub id: u64,
    pub asset: String,
    #[serde(serialize_with = "serialize_quantity")]
    pub remaining: Decimal,
    #[serde(serialize_with = "serialize_quantity")]
    pub original: Decimal,
    #[serde(serialize_with = "serialize_usd")]
    pub basis_per_unit: Decimal,
    pub acquired_at: DateTime<Utc>,
    pub acquired_as: TransactionKind,
    pub wallet: String,
}

/// Snapshot of a lot consumption. Value-typed; does not alias pool state.
#[derive(Debug, Clone)]
pub struct ConsumedLot {
    pub lot_id: u64,
    pub asset: String,
    pub amount: Decimal,
    pub basis_per_unit: Decimal,
    pub acquired_at: DateTime<Utc>,
    pub acquired_as: TransactionKind,
    pub wallet: String,
}

/// Inventory of tax lots, keyed wallet-then-asset, each sequence in
/// insertion order. Lot ids are assigned by the pool and stable for the
/// lifetime of the pool.
#[derive(Debug, Default)]
pub struct LotPool {
    lots: HashMap<String, HashMap<String, Vec<TaxLot>>>,
    next_id: u64,
}

impl LotPool {
    pub fn new() -> Self {
        LotPool::default()
    }

    /// Append a new lot; lots are never merged.
    pub fn add(
        &mut self,
        wallet: &str,
        asset: &str,
        amount: Decimal,
        basis_per_unit: Decimal,
        acquired_at: DateTime<Utc>,
        acquired_as: TransactionKind,
    ) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        log::debug!(
            "lot {id} ADD {amount} {asset} @ {basis_per_unit} into {wallet} ({acquired_as})"
        );
        self.lots
            .entry(wallet.to_string())
            .or_default()
            .entry(asset.to_string())
            .or_default()
            .push(TaxLot {
                id,
                asset: asset.to_string(),
                remaining: amount,
                original: amount,
                basis_per_unit,
                acquired_at,
                acquired_as,
                wallet: wallet.to_string(),
            });
        id
    }

    /// Consume `amount` of `asset` from `wallet` in the order prescribed
    /// by `method`, returning one snapshot per lot touched.
    ///
    /// All-or-nothing: when the pool cannot cover the full amount the
    /// pool is left untouched and `InsufficientLots` is returned.
    pub fn consume(
        &mut self,
        wallet: &str,
        asset: &str,
        amount: Decimal,
        method: Method,
    ) -> Result<Vec<ConsumedLot>, LotError> {
        let lots = self
            .lots
            .get_mut(wallet)
            .and_then(|assets| assets.get_mut(asset))
            .filter(|lots| !lots.is_empty())
            .ok_or_else(|| LotError::InsufficientLots {
                wallet: wallet.to_string(),
                asset: asset.to_string(),
                requested: amount,
                available: Decimal::ZERO,
            })?;

        let available: Decimal = lots.iter().map(|lot| lot.remaining).sum();
        if available < amount {
            return Err(LotError::InsufficientLots {
                wallet: wallet.to_string(),
                asset: asset.to_string(),
                requested: amount,
                available,
            });
        }

        // Stable sort over insertion order keeps tie-breaks deterministic
        // within a run.
        let mut order: Vec<usize> = (0..lots.len()).collect();
        match method {
            Method::Fifo => order.sort_by_key(|&i| lots[i].acquired_at),
            Method::Lifo => order.sort_by_key(|&i| std::cmp::Reverse(lots[i].acquired_at)),
            Method::Hifo => {
                order.sort_by(|&a, &b| lots[b].basis_per_unit.cmp(&lots[a].basis_per_unit))
            }
        }

        let mut outstanding = amount;
        let mut consumed = Vec::new();
        for i in order {
            if outstanding.is_zero() {
                break;
            }
            let lot = &mut lots[i];
            let take = lot.remaining.min(outstanding);
            if take.is_zero() {
                continue;
            }
            log::debug!(
                "lot {} CONSUME {take} {asset} from {wallet}, {} left",
                lot.id,
                lot.remaining - take
            );
            consumed.push(ConsumedLot {
                lot_id: lot.id,
                asset: lot.asset.clone(),
                amount: take,
                basis_per_unit: lot.basis_per_unit,
                acquired_at: lot.acquired_at,
                acquired_as: lot.acquired_as,
                wallet: lot.wallet.clone(),
            });
            lot.remaining -= take;
            outstanding -= take;
        }

        lots.retain(|lot| !lot.remaining.is_zero());
        Ok(consumed)
    }

    /// Move inventory between wallets without a tax event. Consumes FIFO
    /// from the source and re-adds each snapshot at the destination with
    /// a fresh id, preserving basis and acquisition instant.
    pub fn transfer(
        &mut self,
        from: &str,
        to: &str,
        asset: &str,
        amount: Decimal,
    ) -> Result<(), LotError> {
        let consumed = self.consume(from, asset, amount, Method::Fifo)?;
        for snapshot in consumed {
            self.add(
                to,
                asset,
                snapshot.amount,
                snapshot.basis_per_unit,
                snapshot.acquired_at,
                snapshot.acquired_as,
            );
        }
        Ok(())
    }

    /// All lots with remaining inventory, ordered by wallet, asset, id.
    pub fn remaining_lots(&self) -> Vec<TaxLot> {
        let mut all: Vec<TaxLot> = self
            .lots
            .values()
            .flat_map(|assets| assets.values())
            .flatten()
            .cloned()
            .collect();
        all.sort_by(|a, b| {
            a.wallet
                .cmp(&b.wallet)
                .then_with(|| a.asset.cmp(&b.asset))
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    #[cfg(test)]
    pub fn available(&self, wallet: &str, asset: &str) -> Decimal {
        self.lots
            .get(wallet)
            .and_then(|assets| assets.get(asset))
            .map(|lots| lots.iter().map(|lot| lot.remaining).sum())
            .unwrap_or(Decimal::ZERO)
    }
}
