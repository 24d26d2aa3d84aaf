use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty column map, blank result column, etc.).
    ConfigValidation(String),
    /// A chunk of rows could not be parsed against the header.
    /// Recovered by the parser: the chunk is logged and skipped.
    RowParse { chunk: usize, reason: String },
    /// A configured column is absent from a record's schema.
    MissingColumn { column: String, available: Vec<String> },
    /// Internal id column value is not an integer.
    IdParse { column: String, value: String },
    /// Date column value matches none of the configured formats.
    DateParse { column: String, value: String },
    /// IO error (header line read, etc.).
    Io(String),
}

impl ReconError {
    /// Fatal errors abort the reconciliation. Only row-parse errors are recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::RowParse { .. })
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::RowParse { chunk, reason } => {
                write!(f, "chunk {chunk}: cannot parse rows: {reason}")
            }
            Self::MissingColumn { column, available } => {
                write!(f, "missing column '{column}' (available: {})", available.join(", "))
            }
            Self::IdParse { column, value } => {
                write!(f, "column '{column}': cannot parse internal id '{value}'")
            }
            Self::DateParse { column, value } => {
                write!(f, "column '{column}': cannot parse date '{value}'")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
