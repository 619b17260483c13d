use crate::diagnostics::{ErrorKind, RowError, RowWarning, WarningKind};
use crate::tax::disposal::{dispose, Disposal};
use crate::tax::income::{classify_income, IncomeEvent};
use crate::tax::lots::{LotError, LotPool, Method, TaxLot};
use crate::transaction::{Transaction, TransactionKind};
use rust_decimal::Decimal;

/// Everything the replay produced: realized events, residual inventory,
/// and per-transaction diagnostics.
#[derive(Debug)]
pub struct CalcResult {
    pub disposals: Vec<Disposal>,
    pub income_events: Vec<IncomeEvent>,
    pub remaining_lots: Vec<TaxLot>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<RowWarning>,
}

#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error(transparent)]
    Lots(#[from] LotError),
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),
}

impl StepError {
    fn kind(&self) -> ErrorKind {
        match self {
            StepError::Lots(_) => ErrorKind::InsufficientLots,
            StepError::MissingField(_) => ErrorKind::MissingRequiredField,
        }
    }

    fn field(&self) -> &'static str {
        match self {
            StepError::Lots(_) => "sent_amount",
            StepError::MissingField(field) => *field,
        }
    }
}

/// Replay all transactions in effective time order, routing each kind to
/// the appropriate mutation of the lot pool.
///
/// Transactions are sorted stably by timestamp; on ties, acquisitions
/// (including income and RECEIVE) precede disposals so a same-instant
/// buy-then-sell succeeds. A failure in one transaction is recorded and
/// does not stop the replay.
pub fn calculate(transactions: Vec<Transaction>, method: Method) -> CalcResult {
    let mut txs = transactions;
    txs.sort_by_key(|tx| (tx.date_time, !tx.kind.is_acquisition_like()));

    let mut pool = LotPool::new();
    let mut disposals = Vec::new();
    let mut income_events = Vec::new();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for tx in &txs {
        if let Err(err) = apply(
            &mut pool,
            tx,
            method,
            &mut disposals,
            &mut income_events,
            &mut warnings,
        ) {
            log::warn!("{} at {} failed: {err}", tx.kind, tx.date_time);
            errors.push(RowError::new(
                err.kind(),
                tx.row,
                err.field(),
                format!("{} at {}: {err}", tx.kind, tx.date_time.to_rfc3339()),
            ));
        }
    }

    CalcResult {
        disposals,
        income_events,
        remaining_lots: pool.remaining_lots(),
        errors,
        warnings,
    }
}

fn apply(
    pool: &mut LotPool,
    tx: &Transaction,
    method: Method,
    disposals: &mut Vec<Disposal>,
    income_events: &mut Vec<IncomeEvent>,
    warnings: &mut Vec<RowWarning>,
) -> Result<(), StepError> {
    use TransactionKind::*;

    match tx.kind {
        Buy | GiftReceived | Receive => {
            let asset = received_asset(tx)?;
            let amount = tx
                .received_amount
                .ok_or(StepError::MissingField("received_amount"))?;
            // A missing price means a zero-basis lot, not an error.
            let basis = tx.received_price_usd.unwrap_or(Decimal::ZERO);
            pool.add(&tx.wallet, asset, amount, basis, tx.date_time, tx.kind);
        }

        Mining | Staking | Airdrop | Fork | Income => {
            let event = classify_income(tx)
                .ok_or(StepError::MissingField("received_asset_price_usd"))?;
            pool.add(
                &tx.wallet,
                &event.asset,
                event.amount,
                tx.received_price_usd.unwrap_or(Decimal::ZERO),
                tx.date_time,
                tx.kind,
            );
            income_events.push(event);
        }

        Sell | Spend => {
            let asset = sent_asset(tx)?;
            let amount = tx
                .sent_amount
                .ok_or(StepError::MissingField("sent_amount"))?;
            let proceeds = amount * tx.sent_price_usd.unwrap_or(Decimal::ZERO);
            let mut realized = dispose(
                pool,
                &tx.wallet,
                asset,
                amount,
                proceeds,
                tx.date_time,
                tx.kind,
                method,
            )?;
            disposals.append(&mut realized);
        }

        Trade => {
            let sold = sent_asset(tx)?;
            let sold_amount = tx
                .sent_amount
                .ok_or(StepError::MissingField("sent_amount"))?;
            let proceeds = sold_amount * tx.sent_price_usd.unwrap_or(Decimal::ZERO);
            let mut realized = dispose(
                pool,
                &tx.wallet,
                sold,
                sold_amount,
                proceeds,
                tx.date_time,
                tx.kind,
                method,
            )?;
            disposals.append(&mut realized);

            let bought = received_asset(tx)?;
            let bought_amount = tx
                .received_amount
                .ok_or(StepError::MissingField("received_amount"))?;
            pool.add(
                &tx.wallet,
                bought,
                bought_amount,
                tx.received_price_usd.unwrap_or(Decimal::ZERO),
                tx.date_time,
                tx.kind,
            );
        }

        Send => {
            let asset = sent_asset(tx)?;
            let amount = tx
                .sent_amount
                .ok_or(StepError::MissingField("sent_amount"))?;
            // The principal leaves inventory with no tax event; the
            // matching RECEIVE re-creates it at the destination.
            pool.consume(&tx.wallet, asset, amount, Method::Fifo)?;
            apply_send_fee(pool, tx, method, disposals, warnings);
        }

        GiftSent => {
            let asset = sent_asset(tx)?;
            let amount = tx
                .sent_amount
                .ok_or(StepError::MissingField("sent_amount"))?;
            // Disposal at $0 proceeds recognizes a loss equal to basis.
            // US gift rules would instead carry the donor's basis to the
            // donee; revisit before relying on this for filing.
            let mut realized = dispose(
                pool,
                &tx.wallet,
                asset,
                amount,
                Decimal::ZERO,
                tx.date_time,
                tx.kind,
                method,
            )?;
            disposals.append(&mut realized);
        }
    }
    Ok(())
}

/// The network fee on a SEND burns inventory. When it is denominated in
/// the sent asset it is disposed at the fee's USD value; when the pool
/// cannot cover it, or it is denominated in some other asset, the fee is
/// skipped with a warning rather than failing the transfer.
fn apply_send_fee(
    pool: &mut LotPool,
    tx: &Transaction,
    method: Method,
    disposals: &mut Vec<Disposal>,
    warnings: &mut Vec<RowWarning>,
) {
    let Some(fee_amount) = tx.fee_amount else {
        return;
    };
    let sent = tx.sent_asset.as_deref().unwrap_or_default();
    let fee_asset = tx.fee_asset.as_deref().unwrap_or_default();

    if !fee_asset.eq_ignore_ascii_case(sent) {
        warnings.push(RowWarning::new(
            WarningKind::FeeDisposalSkipped,
            tx.row,
            "fee_asset",
            format!(
                "fee of {fee_amount} {fee_asset} on a {sent} transfer was not disposed; \
                 record it as a separate SPEND if taxable"
            ),
        ));
        return;
    }

    let fee_proceeds = tx.fee_usd.unwrap_or(Decimal::ZERO);
    match dispose(
        pool,
        &tx.wallet,
        sent,
        fee_amount,
        fee_proceeds,
        tx.date_time,
        TransactionKind::Spend,
        method,
    ) {
        Ok(mut realized) => disposals.append(&mut realized),
        Err(LotError::InsufficientLots { .. }) => {
            warnings.push(RowWarning::new(
                WarningKind::FeeDisposalSkipped,
                tx.row,
                "fee_amount",
                format!(
                    "insufficient lots to dispose the {fee_amount} {sent} network fee; \
                     fee skipped"
                ),
            ));
        }
    }
}

fn received_asset(tx: &Transaction) -> Result<&str, StepError> {
    tx.received_asset
        .as_deref()
        .ok_or(StepError::MissingField("received_asset"))
}

fn sent_asset(tx: &Transaction) -> Result<&str, StepError> {
    tx.sent_asset
        .as_deref()
        .ok_or(StepError::MissingField("sent_asset"))
}
