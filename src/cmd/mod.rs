pub mod detect;
pub mod lots;
pub mod normalize;
pub mod report;

use crate::cointracker::normalize_cointracker;
use crate::diagnostics::{RowError, RowWarning};
use crate::enrich::enrich_prices;
use crate::format::{detect_format, CsvFormat};
use crate::oracle::CryptoCompareOracle;
use crate::tax::Method;
use crate::transaction::{parse_native, Transaction};
use crate::utils::csv_string;
use clap::ValueEnum;
use color_eyre::eyre::bail;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum MethodArg {
    #[default]
    Fifo,
    Lifo,
    Hifo,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Fifo => Method::Fifo,
            MethodArg::Lifo => Method::Lifo,
            MethodArg::Hifo => Method::Hifo,
        }
    }
}

/// Read the input file, or stdin when the path is "-".
pub fn read_input(path: &Path) -> color_eyre::Result<String> {
    let mut buffer = String::new();
    if path.as_os_str() == "-" {
        io::stdin().lock().read_to_string(&mut buffer)?;
    } else {
        File::open(path)?.read_to_string(&mut buffer)?;
    }
    Ok(buffer)
}

/// Detect the format and produce canonical CSV text, normalizing
/// CoinTracker exports and optionally enriching missing prices.
pub fn canonicalize(
    raw: &str,
    fetch_prices: bool,
    warnings: &mut Vec<RowWarning>,
) -> color_eyre::Result<String> {
    let mut canonical = match detect_format(raw) {
        CsvFormat::Native => raw.to_string(),
        CsvFormat::CoinTracker => {
            let mut normalized = normalize_cointracker(raw);
            warnings.append(&mut normalized.warnings);
            csv_string(normalized.records)?
        }
        CsvFormat::Unknown => {
            bail!("unrecognized CSV format: expected a native or CoinTracker header row")
        }
    };

    if fetch_prices {
        let oracle = CryptoCompareOracle::default();
        let mut enriched = enrich_prices(&canonical, &oracle);
        warnings.append(&mut enriched.warnings);
        canonical = enriched.csv;
    }

    Ok(canonical)
}

/// Parsed input plus every diagnostic produced before the replay.
pub struct PreparedInput {
    pub transactions: Vec<Transaction>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<RowWarning>,
}

/// Full input pipeline: read, detect, normalize, enrich, validate.
pub fn prepare(path: &Path, fetch_prices: bool) -> color_eyre::Result<PreparedInput> {
    let raw = read_input(path)?;
    let mut warnings = Vec::new();
    let canonical = canonicalize(&raw, fetch_prices, &mut warnings)?;
    let mut parsed = parse_native(&canonical);
    warnings.append(&mut parsed.warnings);
    Ok(PreparedInput {
        transactions: parsed.transactions,
        errors: parsed.errors,
        warnings,
    })
}
