//! CSV export use case.
//!
//! Export skips both the liquidity floor and the validity filter: it returns
//! every stored row in the window. The CSV is staged in a scoped temporary
//! file which is removed before the call returns, on success or failure.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::application::error::ServiceError;
use crate::application::ports::SharedRecordStore;
use crate::domain::records::{
    DataKind, MarketRecord, OrderBookEntry, RecordSet, TradeEntry, csv_timestamp,
};

use super::query::RangeParams;

/// Column order of every export.
pub const CSV_HEADER: [&str; 6] = [
    "symbol",
    "price",
    "quantity",
    "order_type",
    "timestamp",
    "market_type",
];

/// Content type of export responses.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// A finished export ready to be sent as an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvArtifact {
    /// Record kind exported.
    pub kind: DataKind,
    /// Suggested download name, `<data_type>.csv`.
    pub file_name: String,
    /// Number of data rows (header excluded).
    pub rows: usize,
    /// CSV bytes.
    pub bytes: Vec<u8>,
}

/// Write `records` as CSV (header first) and return the number of data rows.
///
/// # Errors
///
/// Returns the CSV writer error if serialization or the underlying write
/// fails.
pub fn write_csv<W: Write>(records: &RecordSet, writer: W) -> csv::Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    match records {
        RecordSet::OrderBook(rows) => {
            for row in rows {
                csv.write_record(order_book_row(row))?;
            }
        }
        RecordSet::Trades(rows) => {
            for row in rows {
                csv.write_record(trade_row(row))?;
            }
        }
    }

    csv.flush()?;
    Ok(records.len())
}

fn order_book_row(entry: &OrderBookEntry) -> [String; 6] {
    [
        entry.symbol.clone(),
        float_field(entry.price),
        float_field(entry.quantity),
        entry.order_type.clone().unwrap_or_default(),
        entry
            .timestamp()
            .map(|ts| csv_timestamp(&ts))
            .unwrap_or_default(),
        entry.market_type.clone(),
    ]
}

fn trade_row(entry: &TradeEntry) -> [String; 6] {
    [
        entry.symbol.clone(),
        float_field(entry.price),
        float_field(entry.quantity),
        entry.order_type.clone(),
        csv_timestamp(&entry.timestamp),
        entry.market_type.clone(),
    ]
}

// `{:?}` keeps the trailing `.0` on integral values.
fn float_field(value: f64) -> String {
    format!("{value:?}")
}

/// Exports records in a time window to CSV.
#[derive(Clone)]
pub struct ExportService {
    store: SharedRecordStore,
    export_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ExportService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportService")
            .field("export_dir", &self.export_dir)
            .finish_non_exhaustive()
    }
}

impl ExportService {
    /// Create an export service staging files in the system temp directory.
    #[must_use]
    pub fn new(store: SharedRecordStore) -> Self {
        Self {
            store,
            export_dir: None,
        }
    }

    /// Stage files in `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }

    /// Export every record in the window, unfiltered.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for bad parameters. `StoreFailure` if the store,
    /// the CSV writer or the temporary file fails.
    pub async fn export(&self, params: &RangeParams) -> Result<CsvArtifact, ServiceError> {
        let request = params.validate()?;
        let records = self.store.fetch_range(&request.to_query(None)).await?;

        let export_dir = self.export_dir.clone();
        let kind = request.kind;
        let (rows, bytes) = tokio::task::spawn_blocking(move || stage(&records, export_dir))
            .await
            .map_err(|e| ServiceError::StoreFailure(format!("export task failed: {e}")))??;

        tracing::debug!(
            data_type = %kind,
            symbol = %request.symbol,
            market_type = %request.market_type,
            rows,
            bytes = bytes.len(),
            "Export complete"
        );

        Ok(CsvArtifact {
            kind,
            file_name: format!("{kind}.csv"),
            rows,
            bytes,
        })
    }
}

/// Write the CSV to a scoped temporary file and read it back.
///
/// The file is deleted when `file` drops, which happens on every return path.
fn stage(records: &RecordSet, dir: Option<PathBuf>) -> Result<(usize, Vec<u8>), ServiceError> {
    let mut builder = tempfile::Builder::new();
    builder
        .prefix(records.kind().as_str())
        .suffix(".csv");
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| io_failure("create temporary file", &e))?;

    let rows = write_csv(records, file.as_file_mut())
        .map_err(|e| ServiceError::StoreFailure(format!("CSV serialization failed: {e}")))?;

    let handle = file.as_file_mut();
    handle
        .seek(SeekFrom::Start(0))
        .map_err(|e| io_failure("rewind temporary file", &e))?;
    let mut bytes = Vec::new();
    handle
        .read_to_end(&mut bytes)
        .map_err(|e| io_failure("read temporary file", &e))?;

    Ok((rows, bytes))
}

fn io_failure(action: &str, err: &std::io::Error) -> ServiceError {
    ServiceError::StoreFailure(format!("failed to {action}: {err}"))
}

// =============================================================================
// Tests
// =============================================================================
