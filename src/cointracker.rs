use crate::diagnostics::{RowWarning, WarningKind};
use crate::transaction::{CanonicalRecord, TransactionKind};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// Marker CoinTracker writes in place of cost-basis values it refuses to
/// disclose on free-tier exports.
const OBFUSCATED: &str = "...";

/// Result of rewriting a CoinTracker export into canonical rows.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub records: Vec<CanonicalRecord>,
    pub warnings: Vec<RowWarning>,
}

/// Rewrite a CoinTracker CSV into canonical native rows.
///
/// Each input row becomes zero, one, or two canonical rows: `TRANSFER`
/// splits into a `SEND`/`RECEIVE` pair, pure-USD cash legs are dropped,
/// and rows with unusable dates or types are dropped with a warning.
pub fn normalize_cointracker(input: &str) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();
    if input.trim().is_empty() {
        return outcome;
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.trim().to_string()).collect(),
        Err(_) => return outcome,
    };
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();

    let mut saw_obfuscated = false;
    let mut fallback_row = 1usize;

    for record in reader.records() {
        fallback_row += 1;
        let record = match record {
            Ok(r) => r,
            Err(_) => continue,
        };
        let row = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_row);

        let cell = |name: &str| -> Option<&str> {
            index
                .get(name)
                .and_then(|&i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        for name in ["Received Cost Basis (USD)", "Sent Cost Basis (USD)"] {
            if cell(name) == Some(OBFUSCATED) {
                saw_obfuscated = true;
            }
        }

        let date_time = match cell("Date").and_then(convert_date) {
            Some(dt) => dt,
            None => {
                let original = cell("Date").unwrap_or("");
                outcome.warnings.push(RowWarning::new(
                    WarningKind::NormalizationRemap,
                    row,
                    "Date",
                    format!("row dropped: date '{original}' is not M/D/YYYY H:MM:SS"),
                ));
                continue;
            }
        };

        let raw_type = cell("Type").unwrap_or("").to_uppercase();
        let row_ctx = RowContext {
            date_time,
            received_qty: cell("Received Quantity").map(str::to_string),
            received_asset: cell("Received Currency").map(str::to_string),
            received_basis: cost_basis(cell("Received Cost Basis (USD)")),
            received_wallet: cell("Received Wallet").map(str::to_string),
            received_comment: cell("Received Comment").map(str::to_string),
            sent_qty: cell("Sent Quantity").map(str::to_string),
            sent_asset: cell("Sent Currency").map(str::to_string),
            sent_wallet: cell("Sent Wallet").map(str::to_string),
            sent_comment: cell("Sent Comment").map(str::to_string),
            fee_amount: cell("Fee Amount").map(str::to_string),
            fee_asset: cell("Fee Currency").map(str::to_string),
            fee_usd: cost_basis(cell("Fee Cost Basis (USD)")),
            tx_hash: cell("Transaction Hash")
                .or_else(|| cell("Transaction ID"))
                .map(str::to_string),
        };

        if raw_type == "TRANSFER" {
            split_transfer(&row_ctx, &mut outcome.records);
            continue;
        }

        let kind = match map_kind(&raw_type) {
            Some(kind) => kind,
            None => {
                outcome.warnings.push(RowWarning::new(
                    WarningKind::NormalizationRemap,
                    row,
                    "Type",
                    format!("row dropped: unrecognized type '{raw_type}'"),
                ));
                continue;
            }
        };

        // Fiat cash movements are not taxable events.
        if kind == TransactionKind::Receive && is_usd(row_ctx.received_asset.as_deref()) {
            continue;
        }
        if kind == TransactionKind::Send && is_usd(row_ctx.sent_asset.as_deref()) {
            continue;
        }

        outcome.records.push(plain_record(kind, &row_ctx));
    }

    if saw_obfuscated {
        outcome.warnings.push(RowWarning::new(
            WarningKind::ObfuscatedCostBasis,
            0,
            "Received Cost Basis (USD)",
            "one or more cost-basis cells are obfuscated ('...'); income rows derived from \
             them will lack fair market values"
                .to_string(),
        ));
    }

    outcome
}

struct RowContext {
    date_time: String,
    received_qty: Option<String>,
    received_asset: Option<String>,
    received_basis: Option<String>,
    received_wallet: Option<String>,
    received_comment: Option<String>,
    sent_qty: Option<String>,
    sent_asset: Option<String>,
    sent_wallet: Option<String>,
    sent_comment: Option<String>,
    fee_amount: Option<String>,
    fee_asset: Option<String>,
    fee_usd: Option<String>,
    tx_hash: Option<String>,
}

/// `M/D/YYYY H:MM:SS` (variable-width, UTC assumed) to RFC 3339.
fn convert_date(raw: &str) -> Option<String> {
    let parsed = NaiveDateTime::parse_from_str(raw.trim(), "%m/%d/%Y %H:%M:%S").ok()?;
    Some(parsed.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

fn map_kind(raw: &str) -> Option<TransactionKind> {
    match raw {
        "BUY" => Some(TransactionKind::Buy),
        "SELL" => Some(TransactionKind::Sell),
        "TRADE" => Some(TransactionKind::Trade),
        "RECEIVE" => Some(TransactionKind::Receive),
        "SEND" => Some(TransactionKind::Send),
        "STAKING_REWARD" | "INTEREST_PAYMENT" => Some(TransactionKind::Staking),
        _ => None,
    }
}

fn is_usd(asset: Option<&str>) -> bool {
    asset.is_some_and(|a| a.eq_ignore_ascii_case("USD"))
}

/// Treat the obfuscation marker as an absent value.
fn cost_basis(cell: Option<&str>) -> Option<String> {
    cell.filter(|&s| s != OBFUSCATED).map(str::to_string)
}

fn parse_positive(cell: Option<&str>) -> Option<Decimal> {
    cell.and_then(|s| Decimal::from_str(s).ok())
        .filter(|d| *d > Decimal::ZERO)
}

/// `numerator / denominator` as a decimal string, blank when either side
/// is absent or non-positive.
fn derive_price(numerator: Option<&str>, denominator: Option<&str>) -> String {
    match (parse_positive(numerator), parse_positive(denominator)) {
        (Some(n), Some(d)) => (n / d).normalize().to_string(),
        _ => String::new(),
    }
}

fn join_notes(received: Option<&str>, sent: Option<&str>) -> String {
    match (received, sent) {
        (Some(r), Some(s)) => format!("{r}; {s}"),
        (Some(r), None) => r.to_string(),
        (None, Some(s)) => s.to_string(),
        (None, None) => String::new(),
    }
}

fn plain_record(kind: TransactionKind, ctx: &RowContext) -> CanonicalRecord {
    use TransactionKind::*;

    let (received_price, sent_price) = match kind {
        Buy | Staking | Receive => (
            derive_price(ctx.received_basis.as_deref(), ctx.received_qty.as_deref()),
            String::new(),
        ),
        Sell => (
            String::new(),
            derive_price(ctx.received_basis.as_deref(), ctx.sent_qty.as_deref()),
        ),
        Trade => (
            derive_price(ctx.received_basis.as_deref(), ctx.received_qty.as_deref()),
            derive_price(ctx.received_basis.as_deref(), ctx.sent_qty.as_deref()),
        ),
        _ => (String::new(), String::new()),
    };

    let wallet = match kind {
        Buy | Receive | Staking => ctx
            .received_wallet
            .clone()
            .or_else(|| ctx.sent_wallet.clone()),
        _ => ctx
            .sent_wallet
            .clone()
            .or_else(|| ctx.received_wallet.clone()),
    }
    .unwrap_or_else(|| "Unknown".to_string());

    CanonicalRecord {
        date_time: ctx.date_time.clone(),
        transaction_type: kind.as_str().to_string(),
        sent_asset: ctx.sent_asset.clone().unwrap_or_default(),
        sent_amount: ctx.sent_qty.clone().unwrap_or_default(),
        sent_asset_price_usd: sent_price,
        received_asset: ctx.received_asset.clone().unwrap_or_default(),
        received_amount: ctx.received_qty.clone().unwrap_or_default(),
        received_asset_price_usd: received_price,
        fee_amount: ctx.fee_amount.clone().unwrap_or_default(),
        fee_asset: ctx.fee_asset.clone().unwrap_or_default(),
        fee_usd: ctx.fee_usd.clone().unwrap_or_default(),
        wallet_or_exchange: wallet,
        tx_hash: ctx.tx_hash.clone().unwrap_or_default(),
        notes: join_notes(
            ctx.received_comment.as_deref(),
            ctx.sent_comment.as_deref(),
        ),
    }
}

/// A TRANSFER becomes a SEND at the sending wallet (carrying the fee)
/// and a RECEIVE at the receiving wallet whose unit price preserves the
/// transferred cost basis.
fn split_transfer(ctx: &RowContext, records: &mut Vec<CanonicalRecord>) {
    let notes = join_notes(
        ctx.received_comment.as_deref(),
        ctx.sent_comment.as_deref(),
    );

    records.push(CanonicalRecord {
        date_time: ctx.date_time.clone(),
        transaction_type: TransactionKind::Send.as_str().to_string(),
        sent_asset: ctx.sent_asset.clone().unwrap_or_default(),
        sent_amount: ctx.sent_qty.clone().unwrap_or_default(),
        sent_asset_price_usd: String::new(),
        received_asset: String::new(),
        received_amount: String::new(),
        received_asset_price_usd: String::new(),
        fee_amount: ctx.fee_amount.clone().unwrap_or_default(),
        fee_asset: ctx.fee_asset.clone().unwrap_or_default(),
        fee_usd: ctx.fee_usd.clone().unwrap_or_default(),
        wallet_or_exchange: ctx
            .sent_wallet
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        tx_hash: ctx.tx_hash.clone().unwrap_or_default(),
        notes: notes.clone(),
    });

    records.push(CanonicalRecord {
        date_time: ctx.date_time.clone(),
        transaction_type: TransactionKind::Receive.as_str().to_string(),
        sent_asset: String::new(),
        sent_amount: String::new(),
        sent_asset_price_usd: String::new(),
        received_asset: ctx.received_asset.clone().unwrap_or_default(),
        received_amount: ctx.received_qty.clone().unwrap_or_default(),
        received_asset_price_usd: derive_price(
            ctx.received_basis.as_deref(),
            ctx.received_qty.as_deref(),
        ),
        fee_amount: String::new(),
        fee_asset: String::new(),
        fee_usd: String::new(),
        wallet_or_exchange: ctx
            .received_wallet
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        tx_hash: ctx.tx_hash.clone().unwrap_or_default(),
        notes,
    });
}
