use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::store::{DocumentPage, DocumentStore, PageRequest, StoreError};

/// Partitioned document store held in memory.
///
/// Query text is not evaluated: every document in the requested partition
/// matches. Pages hold at most `page_size` documents and cost
/// `charge_per_page` units each.
pub struct InMemoryDocumentStore {
    database: String,
    page_size: usize,
    charge_per_page: f64,
    partitions: RwLock<HashMap<(String, String), Vec<Value>>>,
}

impl InMemoryDocumentStore {
    pub fn new(database: impl Into<String>, page_size: usize, charge_per_page: f64) -> Self {
        Self {
            database: database.into(),
            page_size: page_size.max(1),
            charge_per_page,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, container: &str, partition_key_value: &str, document: Value) {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry((container.to_string(), partition_key_value.to_string()))
            .or_default()
            .push(document);
    }

    pub async fn extend<I>(&self, container: &str, partition_key_value: &str, documents: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry((container.to_string(), partition_key_value.to_string()))
            .or_default()
            .extend(documents);
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new("memory", 100, 1.0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn database(&self) -> &str {
        &self.database
    }

    async fn query_page(&self, request: PageRequest<'_>) -> Result<DocumentPage, StoreError> {
        let offset = match request.continuation {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StoreError::Decode(format!("invalid continuation token `{token}`")))?,
            None => 0,
        };

        let partitions = self.partitions.read().await;
        let key = (request.container.to_string(), request.partition_key_value.to_string());
        let documents = partitions.get(&key).map(Vec::as_slice).unwrap_or(&[]);

        let take = self.page_size.min(request.max_item_count.max(1));
        let end = (offset + take).min(documents.len());
        let page = documents.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();
        let continuation = (end < documents.len()).then(|| end.to_string());

        Ok(DocumentPage { documents: page, request_charge: self.charge_per_page, continuation })
    }
}
