use std::collections::HashSet;

/// Recognized input CSV formats, decided from the header row alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvFormat {
    Native,
    CoinTracker,
    Unknown,
}

impl std::fmt::Display for CsvFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CsvFormat::Native => "native",
            CsvFormat::CoinTracker => "cointracker",
            CsvFormat::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

const NATIVE_MARKERS: [&str; 3] = ["date_time", "transaction_type", "wallet_or_exchange"];

const COINTRACKER_MARKERS: [&str; 7] = [
    "Date",
    "Type",
    "Received Quantity",
    "Received Currency",
    "Received Cost Basis (USD)",
    "Sent Quantity",
    "Sent Currency",
];

/// Classify raw CSV text by its header row. No data row is inspected.
pub fn detect_format(input: &str) -> CsvFormat {
    let header = match input.lines().find(|line| !line.trim().is_empty()) {
        Some(line) => line.trim_end_matches('\r'),
        None => return CsvFormat::Unknown,
    };

    let columns: HashSet<&str> = header.split(',').map(str::trim).collect();

    if NATIVE_MARKERS.iter().all(|m| columns.contains(m)) {
        CsvFormat::Native
    } else if COINTRACKER_MARKERS.iter().all(|m| columns.contains(m)) {
        CsvFormat::CoinTracker
    } else {
        CsvFormat::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::CANONICAL_HEADERS;

    #[test]
    fn native_header_detected() {
        let input = format!("{}\n", CANONICAL_HEADERS.join(","));
        assert_eq!(detect_format(&input), CsvFormat::Native);
    }

    #[test]
    fn minimal_native_header_detected() {
        assert_eq!(
            detect_format("wallet_or_exchange,transaction_type,date_time\n"),
            CsvFormat::Native
        );
    }

    #[test]
    fn cointracker_header_detected() {
        let input = "Date,Type,Received Quantity,Received Currency,Received Cost Basis (USD),\
                     Received Wallet,Sent Quantity,Sent Currency,Sent Wallet\nrow,data";
        assert_eq!(detect_format(input), CsvFormat::CoinTracker);
    }

    #[test]
    fn crlf_and_leading_blank_lines_are_tolerated() {
        let input = "\r\n\r\nDate,Type,Received Quantity,Received Currency,\
                     Received Cost Basis (USD),Sent Quantity,Sent Currency\r\n";
        assert_eq!(detect_format(input), CsvFormat::CoinTracker);
    }

    #[test]
    fn header_with_spaces_is_trimmed() {
        assert_eq!(
            detect_format("date_time , transaction_type , wallet_or_exchange\n"),
            CsvFormat::Native
        );
    }

    #[test]
    fn unknown_header_is_unknown() {
        assert_eq!(detect_format("a,b,c\n1,2,3\n"), CsvFormat::Unknown);
    }

    #[test]
    fn empty_input_is_unknown() {
        assert_eq!(detect_format(""), CsvFormat::Unknown);
        assert_eq!(detect_format("   \n \r\n"), CsvFormat::Unknown);
    }

    #[test]
    fn native_wins_when_both_marker_sets_present() {
        let input = "date_time,transaction_type,wallet_or_exchange,Date,Type,\
                     Received Quantity,Received Currency,Received Cost Basis (USD),\
                     Sent Quantity,Sent Currency\n";
        assert_eq!(detect_format(input), CsvFormat::Native);
    }
}
