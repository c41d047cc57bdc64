use std::sync::Arc;

use tracing::{error, info, warn};
use twinquery_core::{ExecutionMode, ExecutionReport, NormalizedQuery, QueryError, ReportTarget};
use twinquery_db::{DocumentStore, PageRequest, StoreError};

use crate::mock::{KeywordMockStrategy, MockRecordStrategy};

const MOCK_DATABASE: &str = "mock";

/// Runs normalized queries against the document store, or synthesizes
/// records when no store is configured. Never fails: store errors become
/// error reports.
pub struct QueryExecutor {
    store: Option<Arc<dyn DocumentStore>>,
    mock: Arc<dyn MockRecordStrategy>,
}

impl QueryExecutor {
    pub fn new(store: Option<Arc<dyn DocumentStore>>, mock: Arc<dyn MockRecordStrategy>) -> Self {
        Self { store, mock }
    }

    pub fn live(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(Some(store), Arc::new(KeywordMockStrategy::new()))
    }

    pub fn mock(strategy: Arc<dyn MockRecordStrategy>) -> Self {
        Self::new(None, strategy)
    }

    pub fn mode(&self) -> ExecutionMode {
        if self.store.is_some() {
            ExecutionMode::Live
        } else {
            ExecutionMode::Mock
        }
    }

    pub fn database(&self) -> &str {
        self.store.as_deref().map(|store| store.database()).unwrap_or(MOCK_DATABASE)
    }

    pub fn target(&self, container: &str, partition_key_value: &str) -> ReportTarget {
        ReportTarget {
            database: self.database().to_string(),
            container: container.to_string(),
            partition_key_value: partition_key_value.to_string(),
        }
    }

    pub async fn execute(
        &self,
        query: &NormalizedQuery,
        container: &str,
        partition_key_value: &str,
        page_size_cap: usize,
    ) -> ExecutionReport {
        let target = self.target(container, partition_key_value);

        let Some(store) = self.store.as_deref() else {
            warn!(
                event_name = "query.execute.mock_mode",
                container,
                "no document store configured; returning synthetic records"
            );
            let records = self.mock.records(query.as_str(), partition_key_value);
            return ExecutionReport::records(
                query.as_str(),
                target,
                ExecutionMode::Mock,
                records,
                0.0,
            );
        };

        match read_capped(store, query, container, partition_key_value, page_size_cap).await {
            Ok((records, request_charge)) => {
                info!(
                    event_name = "query.execute.completed",
                    container,
                    records = records.len(),
                    request_charge,
                    "query executed"
                );
                ExecutionReport::records(
                    query.as_str(),
                    target,
                    ExecutionMode::Live,
                    records,
                    request_charge,
                )
            }
            Err(failure) => {
                error!(
                    event_name = "query.execute.failed",
                    container,
                    status = failure.error.status(),
                    error = %failure.error,
                    "document store failed the query"
                );
                let failure = QueryError::Execution {
                    message: failure.error.to_string(),
                    status: failure.error.status(),
                    sub_status: failure.error.sub_status(),
                    request_charge: failure.spent + failure.error.request_charge(),
                };
                ExecutionReport::failure(
                    &failure,
                    Some(query.as_str()),
                    target,
                    ExecutionMode::Live,
                )
            }
        }
    }
}

struct PagedFailure {
    error: StoreError,
    spent: f64,
}

/// Reads pages sequentially until the result set or `cap` is exhausted.
async fn read_capped(
    store: &dyn DocumentStore,
    query: &NormalizedQuery,
    container: &str,
    partition_key_value: &str,
    cap: usize,
) -> Result<(Vec<serde_json::Value>, f64), PagedFailure> {
    let cap = cap.max(1);
    let mut records = Vec::new();
    let mut spent = 0.0;
    let mut continuation: Option<String> = None;

    loop {
        let request = PageRequest {
            container,
            query: query.as_str(),
            partition_key_value,
            max_item_count: cap - records.len(),
            continuation: continuation.as_deref(),
        };
        let page = store
            .query_page(request)
            .await
            .map_err(|error| PagedFailure { error, spent })?;

        spent += page.request_charge;
        records.extend(page.documents);
        records.truncate(cap);

        match page.continuation {
            Some(next) if records.len() < cap => continuation = Some(next),
            _ => break,
        }
    }

    Ok((records, spent))
}
