use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("store rejected the query with status {status}: {message}")]
    Rejected { status: u16, sub_status: Option<u32>, message: String, request_charge: f64 },
    #[error("store request timed out: {0}")]
    Timeout(String),
    #[error("store transport failed: {0}")]
    Transport(String),
    #[error("store response could not be decoded: {0}")]
    Decode(String),
    #[error("store credentials are invalid: {0}")]
    Credentials(String),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Timeout(_) => Some(408),
            _ => None,
        }
    }

    pub fn sub_status(&self) -> Option<u32> {
        match self {
            Self::Rejected { sub_status, .. } => *sub_status,
            _ => None,
        }
    }

    pub fn request_charge(&self) -> f64 {
        match self {
            Self::Rejected { request_charge, .. } => *request_charge,
            _ => 0.0,
        }
    }
}

/// One page of a partition-scoped query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest<'a> {
    pub container: &'a str,
    pub query: &'a str,
    pub partition_key_value: &'a str,
    pub max_item_count: usize,
    pub continuation: Option<&'a str>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentPage {
    pub documents: Vec<Value>,
    pub request_charge: f64,
    /// Token for the next page; `None` once the result set is exhausted.
    pub continuation: Option<String>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Database name shown in report footers.
    fn database(&self) -> &str;

    async fn query_page(&self, request: PageRequest<'_>) -> Result<DocumentPage, StoreError>;
}
