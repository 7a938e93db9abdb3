//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the query and export services and the record store
//! port they depend on. Parameters arrive as raw strings and are validated
//! here, so every adapter shares the same error messages.

/// Operation error taxonomy.
pub mod error;

/// Port interfaces for external systems (the record store).
pub mod ports;

/// Query and export services.
pub mod services;
