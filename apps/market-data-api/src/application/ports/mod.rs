//! Application Ports
//!
//! Ports define interfaces for interacting with external systems.
//! - **Driven Ports** (Secondary/Outbound): the record store the query,
//!   export and broadcast services read from.

mod record_store_port;

#[cfg(test)]
pub use record_store_port::MockRecordStore;
pub use record_store_port::{
    LatestQuery, RangeQuery, RecordStore, SharedRecordStore, StoreError,
};
