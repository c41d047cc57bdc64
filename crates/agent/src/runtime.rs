use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};
use twinquery_core::config::{AppConfig, QueryConfig, DEFAULT_PAGE_SIZE_CAP};
use twinquery_core::{
    enforce_partition_scope, normalize, ExecutionReport, NormalizedQuery, PartitionFilterPolicy,
    PartitionScope, QueryError, QueryRequest,
};
use uuid::Uuid;

use crate::executor::QueryExecutor;
use crate::guardrails::InjectionGuard;
use crate::llm::LlmClient;
use crate::mock::KeywordMockStrategy;
use crate::prompt::PromptCompiler;
use crate::providers::HttpLlmClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub partition_key_field: String,
    pub container_alias: String,
    pub partition_filter: PartitionFilterPolicy,
    pub page_size_cap: usize,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let QueryConfig { partition_key_field, container_alias, partition_filter } = &config.query;
        Self {
            partition_key_field: partition_key_field.clone(),
            container_alias: container_alias.clone(),
            partition_filter: *partition_filter,
            page_size_cap: config.store.page_size_cap,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            partition_key_field: "TwinID".to_string(),
            container_alias: "c".to_string(),
            partition_filter: PartitionFilterPolicy::Inject,
            page_size_cap: DEFAULT_PAGE_SIZE_CAP,
        }
    }
}

/// Turns natural-language questions into partition-scoped queries and runs
/// them. Holds no per-call state; every call gets its own correlation id.
pub struct QueryRuntime {
    llm: Arc<dyn LlmClient>,
    guard: InjectionGuard,
    compiler: PromptCompiler,
    executor: QueryExecutor,
    settings: RuntimeSettings,
}

impl QueryRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: QueryExecutor,
        settings: RuntimeSettings,
    ) -> Result<Self> {
        let compiler =
            PromptCompiler::new(&settings.container_alias, &settings.partition_key_field)?;
        Ok(Self { llm, guard: InjectionGuard::new(), compiler, executor, settings })
    }

    /// Wires the HTTP completion client and the configured store, falling back
    /// to keyword mock records when no store is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let llm = Arc::new(HttpLlmClient::from_config(&config.llm)?);
        let executor = QueryExecutor::new(
            twinquery_db::connect(&config.store)?,
            Arc::new(KeywordMockStrategy::new()),
        );
        Self::new(llm, executor, RuntimeSettings::from_config(config))
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub async fn generate(&self, request: &QueryRequest) -> Result<NormalizedQuery, QueryError> {
        let correlation_id = Uuid::new_v4();
        self.generate_traced(request, correlation_id).await
    }

    pub async fn execute(
        &self,
        query: &NormalizedQuery,
        container: &str,
        partition_key_value: &str,
    ) -> ExecutionReport {
        let correlation_id = Uuid::new_v4();
        self.execute_traced(query, container, partition_key_value, correlation_id).await
    }

    pub async fn generate_and_execute(&self, request: &QueryRequest) -> ExecutionReport {
        let correlation_id = Uuid::new_v4();
        match self.generate_traced(request, correlation_id).await {
            Ok(query) => {
                self.execute_traced(
                    &query,
                    request.container_name.trim(),
                    &request.partition_key_value,
                    correlation_id,
                )
                .await
            }
            Err(error) => self.failure_report(&error, request),
        }
    }

    /// The generated query text, or an error report.
    pub async fn generate_text(&self, request: &QueryRequest) -> String {
        match self.generate(request).await {
            Ok(query) => query.into_inner(),
            Err(error) => self.failure_report(&error, request).render(),
        }
    }

    /// Normalizes and scope-checks a hand-written query before running it.
    pub async fn execute_raw(
        &self,
        query: &str,
        container: &str,
        partition_key_value: &str,
    ) -> ExecutionReport {
        let correlation_id = Uuid::new_v4();
        let scoped = normalize(query).and_then(|normalized| {
            enforce_partition_scope(normalized, self.scope(partition_key_value))
        });

        match scoped {
            Ok(scoped) => {
                self.execute_traced(&scoped, container, partition_key_value, correlation_id).await
            }
            Err(error) => {
                warn!(
                    event_name = "query.execute.rejected",
                    correlation_id = %correlation_id,
                    container,
                    error_kind = error.kind(),
                    "hand-written query was rejected before execution"
                );
                ExecutionReport::failure(
                    &error,
                    Some(query.trim()),
                    self.executor.target(container, partition_key_value),
                    self.executor.mode(),
                )
            }
        }
    }

    pub async fn execute_text(
        &self,
        query: &str,
        container: &str,
        partition_key_value: &str,
    ) -> String {
        self.execute_raw(query, container, partition_key_value).await.render()
    }

    pub async fn generate_and_execute_text(&self, request: &QueryRequest) -> String {
        self.generate_and_execute(request).await.render()
    }

    async fn generate_traced(
        &self,
        request: &QueryRequest,
        correlation_id: Uuid,
    ) -> Result<NormalizedQuery, QueryError> {
        let container = request.container_name.trim();
        info!(
            event_name = "query.generate.received",
            correlation_id = %correlation_id,
            container,
            stage = "received",
            "query generation requested"
        );

        request.validate()?;
        if let Err(failure) = self.guard.check(&request.question) {
            warn!(
                event_name = "query.generate.guard_rejected",
                correlation_id = %correlation_id,
                container,
                stage = "guarded",
                reason = %failure,
                "question rejected by injection guard"
            );
            return Err(failure.into());
        }

        let prompt = self.compiler.compile(request).map_err(|error| {
            QueryError::Generation(format!("prompt could not be rendered: {error}"))
        })?;
        debug!(
            event_name = "query.generate.compiled",
            correlation_id = %correlation_id,
            container,
            stage = "compiled",
            prompt_chars = prompt.user_prompt.len(),
            "prompt compiled"
        );

        let completion = self
            .llm
            .complete(&prompt.system_instructions, &prompt.user_prompt)
            .await
            .map_err(|error| QueryError::Generation(format!("{error:#}")))?;
        if completion.trim().is_empty() {
            return Err(QueryError::Generation("completion service returned no text".to_string()));
        }
        debug!(
            event_name = "query.generate.completed",
            correlation_id = %correlation_id,
            container,
            stage = "completed",
            "completion received"
        );

        let normalized = normalize(&completion)?;
        let scoped = enforce_partition_scope(normalized, self.scope(&request.partition_key_value))?;
        info!(
            event_name = "query.generate.normalized",
            correlation_id = %correlation_id,
            container,
            stage = "normalized",
            query = %scoped,
            "query generated"
        );

        Ok(scoped)
    }

    async fn execute_traced(
        &self,
        query: &NormalizedQuery,
        container: &str,
        partition_key_value: &str,
        correlation_id: Uuid,
    ) -> ExecutionReport {
        let report = self
            .executor
            .execute(query, container, partition_key_value, self.settings.page_size_cap)
            .await;
        info!(
            event_name = "query.execute.reported",
            correlation_id = %correlation_id,
            container,
            stage = "executed",
            records = report.record_count(),
            is_error = report.is_error(),
            "execution report produced"
        );
        report
    }

    fn scope<'a>(&'a self, partition_key_value: &'a str) -> PartitionScope<'a> {
        PartitionScope {
            field: &self.settings.partition_key_field,
            value: partition_key_value,
            policy: self.settings.partition_filter,
        }
    }

    /// Error report for a request that never produced a query.
    pub fn failure_report(&self, error: &QueryError, request: &QueryRequest) -> ExecutionReport {
        ExecutionReport::failure(
            error,
            None,
            self.executor.target(request.container_name.trim(), &request.partition_key_value),
            self.executor.mode(),
        )
    }
}
