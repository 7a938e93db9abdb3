//! Application Services
//!
//! - `QueryService`: range and latest-N queries with validity filtering
//! - `ExportService`: unfiltered range export to a CSV artifact

mod export;
mod query;

pub use export::{CSV_CONTENT_TYPE, CSV_HEADER, CsvArtifact, ExportService, write_csv};
pub use query::{
    DEFAULT_DEPTH, DEFAULT_MERGE_DEPTH, LatestParams, LatestRequest, QueryService, RangeParams,
    RangeRequest,
};
