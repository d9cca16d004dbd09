//! Bar loading from CSV files.
//!
//! Expected header (column order is free):
//! - required: `timestamp` (RFC 3339), `open`, `high`, `low`, `close`
//! - optional: `volume`, `atr`, `score`, `adx`, `choppy`, `volume_ratio`,
//!   `prev_high`, `prev_low`, `htf_bias`
//!
//! A missing required column is a schema violation. Empty optional cells
//! load as `None`; an empty required cell loads as NaN and is rejected by
//! bar validation. Previous-bar extremes are linked after loading wherever
//! the file leaves them blank.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use marginlab_core::domain::{link_previous_extremes, Bar, BarError, TrendBias};
use thiserror::Error;

const REQUIRED_COLUMNS: [&str; 5] = ["timestamp", "open", "high", "low", "close"];

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("row {row}: invalid timestamp '{value}'")]
    BadTimestamp {
        row: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("row {row}: column '{column}' has non-numeric value '{value}'")]
    BadNumber {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("row {row}: column '{column}' has unrecognized value '{value}'")]
    BadFlag {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("row {row}: schema violation")]
    SchemaViolation {
        row: usize,
        #[source]
        source: BarError,
    },
}

/// Column positions resolved from the header row.
struct Columns {
    index: HashMap<&'static str, usize>,
}

impl Columns {
    const KNOWN: [&'static str; 14] = [
        "timestamp",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "atr",
        "score",
        "adx",
        "choppy",
        "volume_ratio",
        "prev_high",
        "prev_low",
        "htf_bias",
    ];

    fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let mut index = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            let header = header.trim().to_ascii_lowercase();
            if let Some(known) = Self::KNOWN.iter().find(|k| **k == header) {
                index.insert(*known, i);
            }
        }
        for column in REQUIRED_COLUMNS {
            if !index.contains_key(column) {
                return Err(LoadError::MissingColumn(column));
            }
        }
        Ok(Self { index })
    }

    fn cell<'r>(&self, record: &'r csv::StringRecord, column: &'static str) -> Option<&'r str> {
        self.index
            .get(column)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn number(
        &self,
        record: &csv::StringRecord,
        row: usize,
        column: &'static str,
    ) -> Result<Option<f64>, LoadError> {
        self.cell(record, column)
            .map(|v| {
                v.parse::<f64>().map_err(|_| LoadError::BadNumber {
                    row,
                    column,
                    value: v.to_string(),
                })
            })
            .transpose()
    }

    fn required(
        &self,
        record: &csv::StringRecord,
        row: usize,
        column: &'static str,
    ) -> Result<f64, LoadError> {
        Ok(self.number(record, row, column)?.unwrap_or(f64::NAN))
    }
}

/// Read bars from any CSV source.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let columns = Columns::from_headers(rdr.headers()?)?;

    let mut bars = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        // 1-based data row, header excluded.
        let row = i + 1;
        let bar = parse_row(&columns, &record, row)?;
        bar.validate()
            .map_err(|source| LoadError::SchemaViolation { row, source })?;
        bars.push(bar);
    }

    link_previous_extremes(&mut bars);
    Ok(bars)
}

/// Load bars from a CSV file on disk.
pub fn load_bars_csv(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_bars(std::io::BufReader::new(file))?;
    tracing::debug!(path = %path.display(), bars = bars.len(), "bars loaded");
    Ok(bars)
}

fn parse_row(columns: &Columns, record: &csv::StringRecord, row: usize) -> Result<Bar, LoadError> {
    let raw_ts = columns.cell(record, "timestamp").unwrap_or_default();
    let timestamp = DateTime::parse_from_rfc3339(raw_ts)
        .map_err(|source| LoadError::BadTimestamp {
            row,
            value: raw_ts.to_string(),
            source,
        })?
        .with_timezone(&Utc);

    let mut bar = Bar::new(
        timestamp,
        columns.required(record, row, "open")?,
        columns.required(record, row, "high")?,
        columns.required(record, row, "low")?,
        columns.required(record, row, "close")?,
    );
    bar.volume = columns.number(record, row, "volume")?;
    bar.atr = columns.number(record, row, "atr")?;
    bar.score = columns.number(record, row, "score")?;
    bar.adx = columns.number(record, row, "adx")?;
    bar.volume_ratio = columns.number(record, row, "volume_ratio")?;
    bar.prev_high = columns.number(record, row, "prev_high")?;
    bar.prev_low = columns.number(record, row, "prev_low")?;

    bar.choppy = match columns.cell(record, "choppy") {
        None => false,
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                return Err(LoadError::BadFlag {
                    row,
                    column: "choppy",
                    value: v.to_string(),
                })
            }
        },
    };

    bar.htf_bias = match columns.cell(record, "htf_bias") {
        None => None,
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "bullish" | "long" | "1" => Some(TrendBias::Bullish),
            "bearish" | "short" | "-1" => Some(TrendBias::Bearish),
            "neutral" | "none" | "0" => None,
            _ => {
                return Err(LoadError::BadFlag {
                    row,
                    column: "htf_bias",
                    value: v.to_string(),
                })
            }
        },
    };

    Ok(bar)
}

/// Deterministic BLAKE3 hash over timestamps and OHLC values.
pub fn dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
