use std::fs;
use std::path::PathBuf;

use twinquery_agent::QueryRuntime;
use twinquery_core::config::AppConfig;
use twinquery_core::QueryRequest;

use super::CommandResult;

/// Where the schema descriptor comes from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    Inline(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct QuestionInput {
    pub schema: SchemaSource,
    pub container: String,
    pub partition_key: String,
    pub question: String,
}

#[derive(Debug, Clone)]
pub struct ExecuteInput {
    pub query: String,
    pub container: String,
    pub partition_key: String,
}

pub async fn generate(config: &AppConfig, input: QuestionInput) -> CommandResult {
    let (runtime, request) = match prepare("generate", config, input) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    match runtime.generate(&request).await {
        Ok(query) => CommandResult::text(0, query.into_inner()),
        Err(error) => CommandResult::text(1, runtime.failure_report(&error, &request).render()),
    }
}

pub async fn execute(config: &AppConfig, input: ExecuteInput) -> CommandResult {
    let runtime = match build_runtime("execute", config) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let report = runtime.execute_raw(&input.query, &input.container, &input.partition_key).await;
    CommandResult::text(u8::from(report.is_error()), report.render())
}

pub async fn ask(config: &AppConfig, input: QuestionInput) -> CommandResult {
    let (runtime, request) = match prepare("ask", config, input) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let report = runtime.generate_and_execute(&request).await;
    CommandResult::text(u8::from(report.is_error()), report.render())
}

fn prepare(
    command: &str,
    config: &AppConfig,
    input: QuestionInput,
) -> Result<(QueryRuntime, QueryRequest), CommandResult> {
    let schema = match input.schema {
        SchemaSource::Inline(schema) => schema,
        SchemaSource::File(path) => fs::read_to_string(&path).map_err(|error| {
            CommandResult::failure(
                command,
                "input",
                format!("could not read schema file `{}`: {error}", path.display()),
                2,
            )
        })?,
    };
    let runtime = build_runtime(command, config)?;

    Ok((runtime, QueryRequest::new(schema, input.container, input.partition_key, input.question)))
}

fn build_runtime(command: &str, config: &AppConfig) -> Result<QueryRuntime, CommandResult> {
    QueryRuntime::from_config(config).map_err(|error| {
        CommandResult::failure(command, "runtime_init", format!("{error:#}"), 2)
    })
}
