use crate::diagnostics::{RowWarning, WarningKind};
use crate::oracle::{DailyCloses, OracleError, PriceOracle};
use crate::transaction::parse_instant;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};

/// Result of a price-enrichment pass over a canonical CSV.
#[derive(Debug)]
pub struct EnrichOutcome {
    /// The CSV with blank unit prices filled where a close was available.
    pub csv: String,
    pub filled: usize,
    pub warnings: Vec<RowWarning>,
}

/// Per-unit price columns and the asset column each one prices.
const PRICE_LEGS: [(&str, &str); 2] = [
    ("sent_asset", "sent_asset_price_usd"),
    ("received_asset", "received_asset_price_usd"),
];

/// Fill blank per-unit USD prices from the oracle's daily closes.
///
/// The oracle is called at most once per distinct ticker, and not at all
/// when no leg needs a price. Lookups use the row's UTC calendar day with
/// a ±1 day fallback.
pub fn enrich_prices(input: &str, oracle: &dyn PriceOracle) -> EnrichOutcome {
    let mut outcome = EnrichOutcome {
        csv: input.to_string(),
        filled: 0,
        warnings: Vec::new(),
    };
    if input.trim().is_empty() {
        return outcome;
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input.as_bytes());
    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(_) => return outcome,
    };
    let index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), i))
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records().flatten() {
        rows.push(record.iter().map(str::to_string).collect());
    }

    let cell = |row: &[String], name: &str| -> Option<String> {
        index
            .get(name)
            .and_then(|&i| row.get(i))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    // Pass 1: find the tickers that actually need a price, and the latest
    // row timestamp to bound the oracle query.
    let mut tickers: BTreeSet<String> = BTreeSet::new();
    let mut max_instant: Option<DateTime<Utc>> = None;
    for row in &rows {
        let instant = cell(row, "date_time")
            .and_then(|raw| parse_instant(&raw).ok())
            .map(|p| p.instant);
        if let Some(instant) = instant {
            max_instant = Some(max_instant.map_or(instant, |m| m.max(instant)));
            for (asset_col, price_col) in PRICE_LEGS {
                if !index.contains_key(price_col) {
                    continue;
                }
                if cell(row, price_col).is_none() {
                    if let Some(asset) = cell(row, asset_col) {
                        if !asset.eq_ignore_ascii_case("USD") {
                            tickers.insert(asset);
                        }
                    }
                }
            }
        }
    }

    if tickers.is_empty() {
        return outcome;
    }
    let Some(max_instant) = max_instant else {
        return outcome;
    };
    let to_date = max_instant + Duration::days(1);

    let mut closes_by_ticker: HashMap<String, DailyCloses> = HashMap::new();
    for ticker in &tickers {
        match oracle.fetch_daily_closes(ticker, to_date) {
            Ok(mut closes) => {
                closes.retain(|_, close| *close > Decimal::ZERO);
                closes_by_ticker.insert(ticker.clone(), closes);
            }
            Err(OracleError::Empty) => {
                outcome.warnings.push(RowWarning::new(
                    WarningKind::OracleEmpty,
                    0,
                    ticker.clone(),
                    format!("no historical prices available for {ticker}"),
                ));
            }
            Err(err) => {
                outcome.warnings.push(RowWarning::new(
                    WarningKind::OracleFetchFailed,
                    0,
                    ticker.clone(),
                    format!("price lookup failed for {ticker}: {err}"),
                ));
            }
        }
    }

    // Pass 2: fill blanks by calendar day with a ±1 day fallback.
    for row in &mut rows {
        let day = match cell(row, "date_time")
            .and_then(|raw| parse_instant(&raw).ok())
            .map(|p| p.instant.date_naive())
        {
            Some(day) => day,
            None => continue,
        };
        for (asset_col, price_col) in PRICE_LEGS {
            if cell(row, price_col).is_some() {
                continue;
            }
            let asset = match cell(row, asset_col) {
                Some(asset) if !asset.eq_ignore_ascii_case("USD") => asset,
                _ => continue,
            };
            let Some(closes) = closes_by_ticker.get(&asset) else {
                continue;
            };
            if let Some(close) = lookup_close(closes, day) {
                let Some(&i) = index.get(price_col) else {
                    continue;
                };
                if i < row.len() {
                    row[i] = close.normalize().to_string();
                    outcome.filled += 1;
                }
            }
        }
    }

    if outcome.filled > 0 {
        outcome.warnings.push(RowWarning::new(
            WarningKind::AutoFilledPrice,
            0,
            "price",
            format!("Auto-filled {} price(s) from historical data", outcome.filled),
        ));
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    if writer.write_record(&headers).is_ok()
        && rows.iter().all(|row| writer.write_record(row).is_ok())
    {
        if let Ok(bytes) = writer.into_inner() {
            if let Ok(text) = String::from_utf8(bytes) {
                outcome.csv = text;
            }
        }
    }

    outcome
}

fn lookup_close(closes: &DailyCloses, day: NaiveDate) -> Option<Decimal> {
    closes
        .get(&day)
        .or_else(|| day.pred_opt().and_then(|d| closes.get(&d)))
        .or_else(|| day.succ_opt().and_then(|d| closes.get(&d)))
        .copied()
}
