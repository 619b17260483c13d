use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Daily close prices keyed by UTC calendar day.
pub type DailyCloses = BTreeMap<NaiveDate, Decimal>;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("no price data returned")]
    Empty,
}

/// Source of historical daily close prices in USD.
///
/// Implementations are expected to be idempotent; the enricher calls
/// `fetch_daily_closes` at most once per ticker per run.
pub trait PriceOracle {
    fn fetch_daily_closes(
        &self,
        ticker: &str,
        to_date: DateTime<Utc>,
    ) -> Result<DailyCloses, OracleError>;
}

/// CryptoCompare `histoday` client.
pub struct CryptoCompareOracle {
    base_url: String,
    agent: ureq::Agent,
}

impl Default for CryptoCompareOracle {
    fn default() -> Self {
        CryptoCompareOracle {
            base_url: "https://min-api.cryptocompare.com/data/v2/histoday".to_string(),
            agent: ureq::Agent::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistodayResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Data", default)]
    data: Option<HistodayData>,
}

#[derive(Debug, Deserialize)]
struct HistodayData {
    #[serde(rename = "Data", default)]
    points: Vec<HistodayPoint>,
}

#[derive(Debug, Deserialize)]
struct HistodayPoint {
    time: i64,
    close: Decimal,
}

impl PriceOracle for CryptoCompareOracle {
    fn fetch_daily_closes(
        &self,
        ticker: &str,
        to_date: DateTime<Utc>,
    ) -> Result<DailyCloses, OracleError> {
        let response = self
            .agent
            .get(&self.base_url)
            .query("fsym", ticker)
            .query("tsym", "USD")
            .query("limit", "2000")
            .query("toTs", &to_date.timestamp().to_string())
            .call()
            .map_err(|err| OracleError::Transport(err.to_string()))?;

        let body: HistodayResponse = response
            .into_json()
            .map_err(|err| OracleError::Transport(err.to_string()))?;

        if body.response.eq_ignore_ascii_case("error") {
            return Err(OracleError::Upstream(body.message));
        }

        let points = body.data.map(|d| d.points).unwrap_or_default();
        let mut closes = DailyCloses::new();
        for point in points {
            if point.close <= Decimal::ZERO {
                continue;
            }
            if let Some(ts) = DateTime::<Utc>::from_timestamp(point.time, 0) {
                closes.insert(ts.date_naive(), point.close);
            }
        }
        log::info!("{} daily closes fetched for {ticker}", closes.len());

        if closes.is_empty() {
            return Err(OracleError::Empty);
        }
        Ok(closes)
    }
}
