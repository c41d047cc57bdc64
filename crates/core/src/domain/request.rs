use serde::{Deserialize, Serialize};

use crate::errors::ValidationFailure;

/// A single natural-language question scoped to one container partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub schema_descriptor: String,
    pub container_name: String,
    pub partition_key_value: String,
    pub question: String,
}

impl QueryRequest {
    pub fn new(
        schema_descriptor: impl Into<String>,
        container_name: impl Into<String>,
        partition_key_value: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            schema_descriptor: schema_descriptor.into(),
            container_name: container_name.into(),
            partition_key_value: partition_key_value.into(),
            question: question.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationFailure> {
        let fields = [
            ("schema_descriptor", &self.schema_descriptor),
            ("container_name", &self.container_name),
            ("partition_key_value", &self.partition_key_value),
            ("question", &self.question),
        ];

        match fields.into_iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(ValidationFailure::MissingField(name)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QueryRequest;
    use crate::errors::ValidationFailure;

    #[test]
    fn complete_request_validates() {
        let request = QueryRequest::new(
            "TwinID: owner id\nFirstName: given name",
            "TwinProfiles",
            "twin-001",
            "What is my first name?",
        );

        assert_eq!(request.validate(), Ok(()));
    }

    #[test]
    fn blank_fields_are_reported_in_declaration_order() {
        let request = QueryRequest::new("schema", "   ", "", "question");

        assert_eq!(request.validate(), Err(ValidationFailure::MissingField("container_name")));
    }

    #[test]
    fn whitespace_only_partition_key_is_missing() {
        let request = QueryRequest::new("schema", "TwinProfiles", " \t", "question");

        assert_eq!(request.validate(), Err(ValidationFailure::MissingField("partition_key_value")));
    }
}
