use tera::{Context, Tera};
use twinquery_core::{quote_literal, QueryRequest};

const SYSTEM_TEMPLATE_NAME: &str = "query_system";
const USER_TEMPLATE_NAME: &str = "query_user";

const SYSTEM_TEMPLATE: &str = r#"You are a query generator for an Azure Cosmos DB SQL API container named {{ container }}.
Translate the user's question into exactly one read-only query.

Rules:
1. Only generate SELECT statements. Never generate INSERT, UPDATE, DELETE, DROP, ALTER or TRUNCATE.
2. Always use the alias {{ alias }} for the container: FROM {{ container }} {{ alias }}.
3. The first predicate of the WHERE clause must be {{ alias }}.{{ partition_key_field }} = {{ partition_literal }}.
4. To return whole documents use SELECT * and never SELECT {{ alias }}.*.
5. Only reference fields that appear in the schema.
6. Return only the query text. No markdown, no code fences, no explanations."#;

const USER_TEMPLATE: &str = r#"Schema of container {{ container }}:
{{ schema }}

Partition key: {{ alias }}.{{ partition_key_field }} = {{ partition_literal }}

Examples:
Question: Which records have the last name Garcia?
Query: SELECT * FROM {{ container }} {{ alias }} WHERE {{ alias }}.{{ partition_key_field }} = {{ partition_literal }} AND {{ alias }}.LastName = 'Garcia'

Question: What do you know about my mother or my father?
Query: SELECT * FROM {{ container }} {{ alias }} WHERE {{ alias }}.{{ partition_key_field }} = {{ partition_literal }} AND ({{ alias }}.Relationship = 'Mother' OR {{ alias }}.Relationship = 'Father')

Question: What are my first name and date of birth?
Query: SELECT {{ alias }}.FirstName, {{ alias }}.DateOfBirth FROM {{ container }} {{ alias }} WHERE {{ alias }}.{{ partition_key_field }} = {{ partition_literal }}

Question: {{ question }}
Query:"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledPrompt {
    pub system_instructions: String,
    pub user_prompt: String,
}

/// Renders the instructions and user prompt sent to the completion service.
/// Output depends only on the request and the compiler settings.
#[derive(Debug)]
pub struct PromptCompiler {
    templates: Tera,
    container_alias: String,
    partition_key_field: String,
}

impl PromptCompiler {
    pub fn new(
        container_alias: impl Into<String>,
        partition_key_field: impl Into<String>,
    ) -> tera::Result<Self> {
        let mut templates = Tera::default();
        templates.add_raw_template(SYSTEM_TEMPLATE_NAME, SYSTEM_TEMPLATE)?;
        templates.add_raw_template(USER_TEMPLATE_NAME, USER_TEMPLATE)?;

        Ok(Self {
            templates,
            container_alias: container_alias.into(),
            partition_key_field: partition_key_field.into(),
        })
    }

    pub fn partition_key_field(&self) -> &str {
        &self.partition_key_field
    }

    pub fn compile(&self, request: &QueryRequest) -> tera::Result<CompiledPrompt> {
        let mut context = Context::new();
        context.insert("container", request.container_name.trim());
        context.insert("alias", &self.container_alias);
        context.insert("partition_key_field", &self.partition_key_field);
        context.insert("partition_literal", &quote_literal(&request.partition_key_value));
        context.insert("schema", request.schema_descriptor.trim());
        context.insert("question", request.question.trim());

        Ok(CompiledPrompt {
            system_instructions: self.templates.render(SYSTEM_TEMPLATE_NAME, &context)?,
            user_prompt: self.templates.render(USER_TEMPLATE_NAME, &context)?,
        })
    }
}
