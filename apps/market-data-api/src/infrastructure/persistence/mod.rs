//! Record Store Adapters
//!
//! - `MySqlRecordStore`: production adapter over the `order_book` and
//!   `trade` tables via a sqlx connection pool
//! - `InMemoryRecordStore`: test and development adapter

mod in_memory;
mod mysql;

pub use in_memory::InMemoryRecordStore;
pub use mysql::MySqlRecordStore;
