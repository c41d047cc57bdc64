use serde_json::{json, Value};

const RELATIONSHIP_KEYWORDS: &[&str] = &["parent", "father", "mother", "padre", "madre"];
const NAME_KEYWORDS: &[&str] = &["firstname", "lastname", "fullname", "name"];

/// Produces synthetic records when no document store is configured.
pub trait MockRecordStrategy: Send + Sync {
    fn records(&self, query: &str, partition_key_value: &str) -> Vec<Value>;
}

/// Picks a canned record set from keywords in the query text.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordMockStrategy;

impl KeywordMockStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl MockRecordStrategy for KeywordMockStrategy {
    fn records(&self, query: &str, partition_key_value: &str) -> Vec<Value> {
        let lowered = query.to_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|keyword| lowered.contains(keyword));

        if mentions(RELATIONSHIP_KEYWORDS) {
            vec![
                json!({
                    "id": "mock-parent-1",
                    "TwinID": partition_key_value,
                    "Relationship": "Father",
                    "FirstName": "Carlos",
                    "LastName": "Rivera",
                    "DateOfBirth": "1958-03-14",
                }),
                json!({
                    "id": "mock-parent-2",
                    "TwinID": partition_key_value,
                    "Relationship": "Mother",
                    "FirstName": "Elena",
                    "LastName": "Morales",
                    "DateOfBirth": "1961-09-02",
                }),
            ]
        } else if mentions(NAME_KEYWORDS) {
            vec![json!({
                "id": "mock-person-1",
                "TwinID": partition_key_value,
                "FirstName": "Daniel",
                "LastName": "Rivera",
                "DateOfBirth": "1988-06-21",
                "City": "Austin",
            })]
        } else {
            vec![json!({
                "id": "mock-record-1",
                "TwinID": partition_key_value,
                "Description": "Synthetic record returned in mock mode",
            })]
        }
    }
}
