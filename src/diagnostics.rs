use serde::Serialize;

/// Error kinds that drop a row or abort a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    MissingRequiredField,
    InvalidNumber,
    NonPositiveAmount,
    UnknownTransactionKind,
    InvalidDate,
    InsufficientLots,
    NumericParse,
}

/// Warning kinds; all data is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    MissingTimezone,
    NormalizationRemap,
    OracleFetchFailed,
    OracleEmpty,
    AutoFilledPrice,
    ObfuscatedCostBasis,
    FeeDisposalSkipped,
}

/// A single diagnostic attached to an input row.
///
/// Row numbers are 1-based and include the header row, so the first data
/// row is row 2. Diagnostics that do not concern a specific row (e.g. an
/// aggregate warning over a whole file) use row 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic<K> {
    pub kind: K,
    pub row: usize,
    pub field: String,
    pub message: String,
}

pub type RowError = Diagnostic<ErrorKind>;
pub type RowWarning = Diagnostic<WarningKind>;

impl<K> Diagnostic<K> {
    pub fn new(kind: K, row: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            row,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl RowError {
    pub fn missing_field(row: usize, field: &str) -> Self {
        Diagnostic::new(
            ErrorKind::MissingRequiredField,
            row,
            field,
            format!("required field '{field}' is missing or blank"),
        )
    }
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: [{:?}] {}", self.row, self.kind, self.message)
    }
}

impl std::fmt::Display for RowWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: [{:?}] {}", self.row, self.kind, self.message)
    }
}
