use crate::diagnostics::{ErrorKind, RowError, RowWarning, WarningKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Column order of the canonical CSV schema. The first line of a native
/// file is always this header (possibly with extra columns).
pub const CANONICAL_HEADERS: [&str; 14] = [
    "date_time",
    "transaction_type",
    "sent_asset",
    "sent_amount",
    "sent_asset_price_usd",
    "received_asset",
    "received_amount",
    "received_asset_price_usd",
    "fee_amount",
    "fee_asset",
    "fee_usd",
    "wallet_or_exchange",
    "tx_hash",
    "notes",
];

/// One canonical CSV row as raw strings, used when rewriting foreign
/// formats. Blank fields serialize as empty cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub date_time: String,
    pub transaction_type: String,
    pub sent_asset: String,
    pub sent_amount: String,
    pub sent_asset_price_usd: String,
    pub received_asset: String,
    pub received_amount: String,
    pub received_asset_price_usd: String,
    pub fee_amount: String,
    pub fee_asset: String,
    pub fee_usd: String,
    pub wallet_or_exchange: String,
    pub tx_hash: String,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Buy,
    Sell,
    Trade,
    Send,
    Receive,
    Mining,
    Staking,
    Airdrop,
    Fork,
    Spend,
    GiftSent,
    GiftReceived,
    Income,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Buy => "BUY",
            TransactionKind::Sell => "SELL",
            TransactionKind::Trade => "TRADE",
            TransactionKind::Send => "SEND",
            TransactionKind::Receive => "RECEIVE",
            TransactionKind::Mining => "MINING",
            TransactionKind::Staking => "STAKING",
            TransactionKind::Airdrop => "AIRDROP",
            TransactionKind::Fork => "FORK",
            TransactionKind::Spend => "SPEND",
            TransactionKind::GiftSent => "GIFT_SENT",
            TransactionKind::GiftReceived => "GIFT_RECEIVED",
            TransactionKind::Income => "INCOME",
        }
    }

    /// Income kinds are recognized at fair market value and create a lot
    /// whose basis equals that value.
    pub fn is_income(&self) -> bool {
        matches!(
            self,
            TransactionKind::Mining
                | TransactionKind::Staking
                | TransactionKind::Airdrop
                | TransactionKind::Fork
                | TransactionKind::Income
        )
    }

    /// Kinds that add inventory. On equal timestamps these are replayed
    /// before disposals so a same-instant buy-then-sell succeeds.
    pub fn is_acquisition_like(&self) -> bool {
        matches!(
            self,
            TransactionKind::Buy | TransactionKind::GiftReceived | TransactionKind::Receive
        ) || self.is_income()
    }
}

impl FromStr for TransactionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(TransactionKind::Buy),
            "SELL" => Ok(TransactionKind::Sell),
            "TRADE" => Ok(TransactionKind::Trade),
            "SEND" => Ok(TransactionKind::Send),
            "RECEIVE" => Ok(TransactionKind::Receive),
            "MINING" => Ok(TransactionKind::Mining),
            "STAKING" => Ok(TransactionKind::Staking),
            "AIRDROP" => Ok(TransactionKind::Airdrop),
            "FORK" => Ok(TransactionKind::Fork),
            "SPEND" => Ok(TransactionKind::Spend),
            "GIFT_SENT" => Ok(TransactionKind::GiftSent),
            "GIFT_RECEIVED" => Ok(TransactionKind::GiftReceived),
            "INCOME" => Ok(TransactionKind::Income),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated canonical transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    /// 1-based source row including the header row.
    pub row: usize,
    pub date_time: DateTime<Utc>,
    pub kind: TransactionKind,
    pub sent_asset: Option<String>,
    pub sent_amount: Option<Decimal>,
    pub sent_price_usd: Option<Decimal>,
    pub received_asset: Option<String>,
    pub received_amount: Option<Decimal>,
    pub received_price_usd: Option<Decimal>,
    pub fee_amount: Option<Decimal>,
    pub fee_asset: Option<String>,
    pub fee_usd: Option<Decimal>,
    pub wallet: String,
    pub tx_hash: Option<String>,
    pub notes: Option<String>,
}

/// Result of parsing a native CSV: validated transactions plus per-row
/// diagnostics. A row with any error contributes no transaction.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub transactions: Vec<Transaction>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<RowWarning>,
}

/// Parsed timestamp plus whether the input carried an explicit offset.
pub struct ParsedInstant {
    pub instant: DateTime<Utc>,
    pub had_timezone: bool,
}

/// Parse an absolute instant. Inputs without a trailing `Z` or `±HH[:]MM`
/// are interpreted as UTC; the caller attaches a `MissingTimezone`
/// warning in that case.
pub fn parse_instant(s: &str) -> Result<ParsedInstant, ()> {
    let s = s.trim();
    if s.is_empty() {
        return Err(());
    }

    if has_timezone_suffix(s) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(ParsedInstant {
                instant: dt.with_timezone(&Utc),
                had_timezone: true,
            });
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Ok(ParsedInstant {
                    instant: dt.with_timezone(&Utc),
                    had_timezone: true,
                });
            }
        }
        return Err(());
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ParsedInstant {
                instant: dt.and_utc(),
                had_timezone: false,
            });
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
        return Ok(ParsedInstant {
            instant: midnight.and_utc(),
            had_timezone: false,
        });
    }
    Err(())
}

fn has_timezone_suffix(s: &str) -> bool {
    if s.ends_with('Z') || s.ends_with('z') {
        return true;
    }
    // ±HH:MM or ±HHMM
    for offset_len in [6usize, 5] {
        if s.len() <= offset_len || !s.is_char_boundary(s.len() - offset_len) {
            continue;
        }
        let tail = &s[s.len() - offset_len..];
        let sign = tail.as_bytes()[0];
        if sign != b'+' && sign != b'-' {
            continue;
        }
        let rest = &tail[1..];
        let digits_ok = match offset_len {
            6 => {
                rest.as_bytes()[2] == b':'
                    && rest[..2].chars().all(|c| c.is_ascii_digit())
                    && rest[3..].chars().all(|c| c.is_ascii_digit())
            }
            _ => rest.chars().all(|c| c.is_ascii_digit()),
        };
        // A bare date like 2024-06-01 ends in "-06-01"; require a time
        // component before the offset.
        if digits_ok && s[..s.len() - offset_len].contains(':') {
            return true;
        }
    }
    false
}

/// Parse a native CSV into typed transactions with diagnostics.
pub fn parse_native(input: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    if input.trim().is_empty() {
        return outcome;
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.trim().to_string()).collect(),
        Err(err) => {
            outcome.errors.push(RowError::new(
                ErrorKind::MissingRequiredField,
                1,
                "header",
                format!("unreadable header row: {err}"),
            ));
            return outcome;
        }
    };
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();

    for required in ["date_time", "transaction_type", "wallet_or_exchange"] {
        if !index.contains_key(required) {
            outcome.errors.push(RowError::new(
                ErrorKind::MissingRequiredField,
                1,
                required,
                format!("required column '{required}' is missing from the header"),
            ));
        }
    }
    if !outcome.errors.is_empty() {
        return outcome;
    }

    let mut fallback_row = 1usize;
    for record in reader.records() {
        fallback_row += 1;
        let record = match record {
            Ok(r) => r,
            Err(err) => {
                outcome.errors.push(RowError::new(
                    ErrorKind::MissingRequiredField,
                    fallback_row,
                    "row",
                    format!("unreadable row: {err}"),
                ));
                continue;
            }
        };
        let row = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_row);

        parse_row(row, &index, &record, &mut outcome);
    }

    outcome
}

fn parse_row(
    row: usize,
    index: &HashMap<&str, usize>,
    record: &csv::StringRecord,
    outcome: &mut ParseOutcome,
) {
    let mut errors: Vec<RowError> = Vec::new();
    let mut warnings: Vec<RowWarning> = Vec::new();

    let field = |name: &str| -> Option<&str> {
        index
            .get(name)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let kind = match field("transaction_type") {
        Some(raw) => match raw.parse::<TransactionKind>() {
            Ok(kind) => Some(kind),
            Err(()) => {
                errors.push(RowError::new(
                    ErrorKind::UnknownTransactionKind,
                    row,
                    "transaction_type",
                    format!("unknown transaction type '{raw}'"),
                ));
                None
            }
        },
        None => {
            errors.push(RowError::missing_field(row, "transaction_type"));
            None
        }
    };

    let date_time = match field("date_time") {
        Some(raw) => match parse_instant(raw) {
            Ok(parsed) => {
                if !parsed.had_timezone {
                    warnings.push(RowWarning::new(
                        WarningKind::MissingTimezone,
                        row,
                        "date_time",
                        format!("'{raw}' has no timezone offset, assuming UTC"),
                    ));
                }
                Some(parsed.instant)
            }
            Err(()) => {
                errors.push(RowError::new(
                    ErrorKind::InvalidDate,
                    row,
                    "date_time",
                    format!("'{raw}' is not a recognized date/time"),
                ));
                None
            }
        },
        None => {
            errors.push(RowError::missing_field(row, "date_time"));
            None
        }
    };

    let wallet = match field("wallet_or_exchange") {
        Some(w) => Some(w.to_string()),
        None => {
            errors.push(RowError::missing_field(row, "wallet_or_exchange"));
            None
        }
    };

    let positive = |name: &str, errors: &mut Vec<RowError>| -> Option<Decimal> {
        match field(name) {
            None => None,
            Some(raw) => match Decimal::from_str(raw) {
                Ok(value) if value > Decimal::ZERO => Some(value),
                Ok(value) => {
                    errors.push(RowError::new(
                        ErrorKind::NonPositiveAmount,
                        row,
                        name,
                        format!("'{name}' must be strictly positive, got {value}"),
                    ));
                    None
                }
                Err(_) => {
                    errors.push(RowError::new(
                        ErrorKind::InvalidNumber,
                        row,
                        name,
                        format!("'{raw}' is not a valid number for '{name}'"),
                    ));
                    None
                }
            },
        }
    };

    let sent_amount = positive("sent_amount", &mut errors);
    let sent_price_usd = positive("sent_asset_price_usd", &mut errors);
    let received_amount = positive("received_amount", &mut errors);
    let received_price_usd = positive("received_asset_price_usd", &mut errors);
    let fee_amount = positive("fee_amount", &mut errors);

    // fee_usd is the one numeric field allowed to be zero.
    let fee_usd = match field("fee_usd") {
        None => None,
        Some(raw) => match Decimal::from_str(raw) {
            Ok(value) => Some(value),
            Err(_) => {
                errors.push(RowError::new(
                    ErrorKind::NumericParse,
                    row,
                    "fee_usd",
                    format!("'{raw}' does not parse as a number"),
                ));
                None
            }
        },
    };

    let sent_asset = field("sent_asset").map(str::to_string);
    let received_asset = field("received_asset").map(str::to_string);
    let fee_asset = field("fee_asset").map(str::to_string);
    let tx_hash = field("tx_hash").map(str::to_string);
    let notes = field("notes").map(str::to_string);

    if let Some(kind) = kind {
        for (present, name) in required_fields(
            kind,
            sent_asset.is_some(),
            sent_amount.is_some(),
            received_asset.is_some(),
            received_amount.is_some(),
            received_price_usd.is_some(),
        ) {
            if !present {
                errors.push(RowError::missing_field(row, name));
            }
        }
    }

    if !errors.is_empty() {
        outcome.errors.append(&mut errors);
        outcome.warnings.append(&mut warnings);
        return;
    }

    outcome.warnings.append(&mut warnings);
    outcome.transactions.push(Transaction {
        row,
        date_time: date_time.expect("validated above"),
        kind: kind.expect("validated above"),
        sent_asset,
        sent_amount,
        sent_price_usd,
        received_asset,
        received_amount,
        received_price_usd,
        fee_amount,
        fee_asset,
        fee_usd,
        wallet: wallet.expect("validated above"),
        tx_hash,
        notes,
    });
}

/// Presence checks for the kind-conditioned required fields.
fn required_fields(
    kind: TransactionKind,
    sent_asset: bool,
    sent_amount: bool,
    received_asset: bool,
    received_amount: bool,
    received_price: bool,
) -> Vec<(bool, &'static str)> {
    use TransactionKind::*;
    match kind {
        Sell | Spend | Send | GiftSent => {
            vec![(sent_asset, "sent_asset"), (sent_amount, "sent_amount")]
        }
        Buy | Receive | GiftReceived => vec![
            (received_asset, "received_asset"),
            (received_amount, "received_amount"),
        ],
        Trade => vec![
            (sent_asset, "sent_asset"),
            (sent_amount, "sent_amount"),
            (received_asset, "received_asset"),
            (received_amount, "received_amount"),
        ],
        Mining | Staking | Airdrop | Fork | Income => vec![
            (received_asset, "received_asset"),
            (received_amount, "received_amount"),
            (received_price, "received_asset_price_usd"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn csv(rows: &[&str]) -> String {
        let mut out = String::from(CANONICAL_HEADERS.join(","));
        out.push('\n');
        for row in rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }

    #[test]
    fn parses_a_buy_row() {
        let input = csv(&[
            "2024-01-01T00:00:00Z,BUY,USD,30000,1,BTC,1,30000,,,,Coinbase,,first buy",
        ]);
        let outcome = parse_native(&input);
        assert!(outcome.errors.is_empty());
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.transactions.len(), 1);

        let tx = &outcome.transactions[0];
        assert_eq!(tx.row, 2);
        assert_eq!(tx.kind, TransactionKind::Buy);
        assert_eq!(tx.received_asset.as_deref(), Some("BTC"));
        assert_eq!(tx.received_amount, Some(dec!(1)));
        assert_eq!(tx.received_price_usd, Some(dec!(30000)));
        assert_eq!(tx.wallet, "Coinbase");
        assert_eq!(tx.notes.as_deref(), Some("first buy"));
    }

    #[test]
    fn missing_timezone_warns_but_parses() {
        let input = csv(&["2024-01-01 12:30:00,BUY,,,,BTC,1,30000,,,,Coinbase,,"]);
        let outcome = parse_native(&input);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::MissingTimezone);
        assert_eq!(
            outcome.transactions[0].date_time,
            parse_instant("2024-01-01T12:30:00Z").unwrap().instant
        );
    }

    #[test]
    fn offset_timestamp_converts_to_utc() {
        let parsed = parse_instant("2024-06-01T10:00:00+02:00").unwrap();
        assert!(parsed.had_timezone);
        assert_eq!(
            parsed.instant,
            parse_instant("2024-06-01T08:00:00Z").unwrap().instant
        );
    }

    #[test]
    fn compact_offset_is_recognized() {
        let parsed = parse_instant("2024-06-01T10:00:00+0200").unwrap();
        assert!(parsed.had_timezone);
    }

    #[test]
    fn bare_date_is_not_mistaken_for_offset() {
        let parsed = parse_instant("2024-06-01").unwrap();
        assert!(!parsed.had_timezone);
    }

    #[test]
    fn sell_requires_sent_leg() {
        let input = csv(&["2024-01-01T00:00:00Z,SELL,,,,,,,,,,Coinbase,,"]);
        let outcome = parse_native(&input);
        assert!(outcome.transactions.is_empty());
        let fields: Vec<&str> = outcome.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"sent_asset"));
        assert!(fields.contains(&"sent_amount"));
    }

    #[test]
    fn income_kinds_require_unit_price() {
        let input = csv(&["2024-01-01T00:00:00Z,STAKING,,,,ETH,0.5,,,,,Kraken,,"]);
        let outcome = parse_native(&input);
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].field, "received_asset_price_usd");
        assert_eq!(outcome.errors[0].kind, ErrorKind::MissingRequiredField);
    }

    #[test]
    fn zero_amount_is_rejected() {
        let input = csv(&["2024-01-01T00:00:00Z,BUY,,,,BTC,0,30000,,,,Coinbase,,"]);
        let outcome = parse_native(&input);
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.errors[0].kind, ErrorKind::NonPositiveAmount);
    }

    #[test]
    fn zero_fee_usd_is_accepted() {
        // fee_usd is exempt from the strictly-positive rule.
        let input = csv(&["2024-01-01T00:00:00Z,BUY,,,,BTC,1,30000,,,0,Coinbase,,"]);
        let outcome = parse_native(&input);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].fee_usd, Some(dec!(0)));
    }

    #[test]
    fn unparseable_fee_usd_is_numeric_parse_error() {
        let input = csv(&["2024-01-01T00:00:00Z,BUY,,,,BTC,1,30000,,,abc,Coinbase,,"]);
        let outcome = parse_native(&input);
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.errors[0].kind, ErrorKind::NumericParse);
        assert_eq!(outcome.errors[0].field, "fee_usd");
    }

    #[test]
    fn garbage_number_is_invalid_number() {
        let input = csv(&["2024-01-01T00:00:00Z,BUY,,,,BTC,one,30000,,,,Coinbase,,"]);
        let outcome = parse_native(&input);
        assert_eq!(outcome.errors[0].kind, ErrorKind::InvalidNumber);
        assert_eq!(outcome.errors[0].field, "received_amount");
    }

    #[test]
    fn unknown_kind_is_reported_with_row_number() {
        let input = csv(&[
            "2024-01-01T00:00:00Z,BUY,,,,BTC,1,30000,,,,Coinbase,,",
            "2024-01-02T00:00:00Z,LEND,,,,BTC,1,30000,,,,Coinbase,,",
        ]);
        let outcome = parse_native(&input);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ErrorKind::UnknownTransactionKind);
        assert_eq!(outcome.errors[0].row, 3);
    }

    #[test]
    fn bad_date_drops_row() {
        let input = csv(&["not-a-date,BUY,,,,BTC,1,30000,,,,Coinbase,,"]);
        let outcome = parse_native(&input);
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.errors[0].kind, ErrorKind::InvalidDate);
    }

    #[test]
    fn empty_input_is_empty_result() {
        let outcome = parse_native("   \n  ");
        assert!(outcome.transactions.is_empty());
        assert!(outcome.errors.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn missing_required_header_is_fatal_for_the_file() {
        let outcome = parse_native("date_time,transaction_type\n2024-01-01T00:00:00Z,BUY\n");
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].field, "wallet_or_exchange");
        assert_eq!(outcome.errors[0].row, 1);
    }

    #[test]
    fn error_row_still_allows_later_rows() {
        let input = csv(&[
            "2024-01-01T00:00:00Z,SELL,,,,,,,,,,Coinbase,,",
            "2024-01-02T00:00:00Z,BUY,,,,BTC,1,30000,,,,Coinbase,,",
        ]);
        let outcome = parse_native(&input);
        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].kind, TransactionKind::Buy);
        assert!(!outcome.errors.is_empty());
    }

    #[test]
    fn quoted_notes_with_commas_survive() {
        let input = csv(&[
            "2024-01-01T00:00:00Z,BUY,,,,BTC,1,30000,,,,Coinbase,,\"hello, world\"",
        ]);
        let outcome = parse_native(&input);
        assert_eq!(
            outcome.transactions[0].notes.as_deref(),
            Some("hello, world")
        );
    }

    #[test]
    fn kind_roundtrips_through_strings() {
        for kind in [
            TransactionKind::Buy,
            TransactionKind::GiftSent,
            TransactionKind::GiftReceived,
            TransactionKind::Staking,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionKind>(), Ok(kind));
        }
        assert!("HODL".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn acquisition_like_covers_income_kinds() {
        assert!(TransactionKind::Buy.is_acquisition_like());
        assert!(TransactionKind::Receive.is_acquisition_like());
        assert!(TransactionKind::Staking.is_acquisition_like());
        assert!(!TransactionKind::Sell.is_acquisition_like());
        assert!(!TransactionKind::Send.is_acquisition_like());
        assert!(!TransactionKind::GiftSent.is_acquisition_like());
    }
}
