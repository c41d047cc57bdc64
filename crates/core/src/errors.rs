use thiserror::Error;

/// Why a request was refused before the completion service was contacted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("required field `{0}` is missing or empty")]
    MissingField(&'static str),
    #[error("question matched query-injection pattern `{token}`")]
    MaliciousQuery { token: &'static str },
    #[error("question matched prompt-injection pattern `{phrase}`")]
    MaliciousPrompt { phrase: &'static str },
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),
    #[error("query generation failed: {0}")]
    Generation(String),
    #[error("query syntax rejected: {0}")]
    Syntax(String),
    #[error("partition scope violation: {0}")]
    PartitionScope(String),
    #[error("query execution failed: {message}")]
    Execution {
        message: String,
        status: Option<u16>,
        sub_status: Option<u32>,
        request_charge: f64,
    },
}

impl QueryError {
    /// Stable identifier embedded in error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Generation(_) => "generation_error",
            Self::Syntax(_) => "syntax_error",
            Self::PartitionScope(_) => "partition_scope_error",
            Self::Execution { .. } => "execution_error",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(ValidationFailure::MissingField(_)) => {
                "The request is incomplete. Provide schema, container, partition key, and question."
            }
            Self::Validation(_) => "The question was rejected because it looks like an injection attempt.",
            Self::Generation(_) => "A query could not be generated for this question. Please retry shortly.",
            Self::Syntax(_) => "The generated query was not a valid read-only SELECT statement.",
            Self::PartitionScope(_) => "The generated query was not scoped to the requested partition.",
            Self::Execution { .. } => "The document store could not execute the query.",
        }
    }

    /// Cost units consumed before the failure, if any.
    pub fn request_charge(&self) -> f64 {
        match self {
            Self::Execution { request_charge, .. } => *request_charge,
            _ => 0.0,
        }
    }
}
