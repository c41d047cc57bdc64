//! Read-only query text: normalization of completion output and partition
//! scoping of the resulting statement.

pub mod normalizer;
pub mod scope;

mod scan;

use std::fmt;

use serde::Serialize;

pub use normalizer::normalize;
pub use scope::{enforce_partition_scope, quote_literal, PartitionFilterPolicy, PartitionScope};

/// A single SELECT statement with no markdown fencing and no aliased
/// wildcard projection. Only [`normalize`] and the partition scope enforcer
/// construct values of this type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedQuery(String);

impl NormalizedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for NormalizedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
