//! Core types for natural-language query compilation: request and error
//! types, configuration, query normalization and partition scoping, and the
//! text report returned to callers.

pub mod config;
pub mod domain;
pub mod errors;
pub mod query;
pub mod report;

pub use domain::request::QueryRequest;
pub use errors::{QueryError, ValidationFailure};
pub use query::{
    enforce_partition_scope, normalize, quote_literal, NormalizedQuery, PartitionFilterPolicy,
    PartitionScope,
};
pub use report::{
    ExecutionMode, ExecutionReport, ReportOutcome, ReportTarget, MOCK_MARKER, MOCK_MODE_NOTE,
};
