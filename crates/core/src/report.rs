//! Text reports returned to callers. Successful and failed runs share one
//! layout so the output can be embedded in a follow-up prompt as-is.

use std::fmt::{self, Write as _};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::QueryError;

/// Banner that marks synthetic records in mock-mode result reports.
pub const MOCK_MARKER: &str =
    "[MOCK DATA] No document store is configured; the records below are synthetic test data.";
/// Shorter banner for mock-mode failure reports, which carry no records.
pub const MOCK_MODE_NOTE: &str = "[MOCK MODE] No document store is configured; no live data was read.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Live,
    Mock,
}

/// Where a query ran (or would have run).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportTarget {
    pub database: String,
    pub container: String,
    pub partition_key_value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReportOutcome {
    Records(Vec<Value>),
    Failure {
        kind: &'static str,
        diagnostic: String,
        status: Option<u16>,
        sub_status: Option<u32>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionReport {
    pub query: Option<String>,
    pub target: ReportTarget,
    pub mode: ExecutionMode,
    pub outcome: ReportOutcome,
    pub request_charge: f64,
    pub generated_at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn records(
        query: &str,
        target: ReportTarget,
        mode: ExecutionMode,
        records: Vec<Value>,
        request_charge: f64,
    ) -> Self {
        Self {
            query: Some(query.to_string()),
            target,
            mode,
            outcome: ReportOutcome::Records(records),
            request_charge,
            generated_at: Utc::now(),
        }
    }

    pub fn failure(
        error: &QueryError,
        query: Option<&str>,
        target: ReportTarget,
        mode: ExecutionMode,
    ) -> Self {
        let (status, sub_status) = match error {
            QueryError::Execution { status, sub_status, .. } => (*status, *sub_status),
            _ => (None, None),
        };

        Self {
            query: query.map(str::to_string),
            target,
            mode,
            outcome: ReportOutcome::Failure {
                kind: error.kind(),
                diagnostic: error.to_string(),
                status,
                sub_status,
            },
            request_charge: error.request_charge(),
            generated_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ReportOutcome::Failure { .. })
    }

    pub fn record_count(&self) -> usize {
        match &self.outcome {
            ReportOutcome::Records(records) => records.len(),
            ReportOutcome::Failure { .. } => 0,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "QUERY EXECUTION REPORT")?;
        writeln!(out, "======================")?;
        if self.mode == ExecutionMode::Mock {
            match self.outcome {
                ReportOutcome::Records(_) => writeln!(out, "{MOCK_MARKER}")?,
                ReportOutcome::Failure { .. } => writeln!(out, "{MOCK_MODE_NOTE}")?,
            }
        }
        writeln!(out, "Query: {}", self.query.as_deref().unwrap_or("(not generated)"))?;
        writeln!(out, "Container: {}", self.target.container)?;
        writeln!(out, "Partition key: {}", self.target.partition_key_value)?;
        writeln!(out)?;

        match &self.outcome {
            ReportOutcome::Records(records) => {
                writeln!(out, "Results")?;
                writeln!(out, "-------")?;
                if records.is_empty() {
                    writeln!(out, "No records matched the query.")?;
                }
                for (index, record) in records.iter().enumerate() {
                    let body = serde_json::to_string_pretty(record)
                        .unwrap_or_else(|_| record.to_string());
                    writeln!(out, "Record {}:", index + 1)?;
                    writeln!(out, "{body}")?;
                }
            }
            ReportOutcome::Failure { kind, diagnostic, status, sub_status } => {
                writeln!(out, "Status: ERROR ({kind})")?;
                writeln!(out, "Diagnostic: {diagnostic}")?;
                if let Some(status) = status {
                    match sub_status {
                        Some(sub_status) => writeln!(out, "Store status: {status}/{sub_status}")?,
                        None => writeln!(out, "Store status: {status}")?,
                    }
                }
            }
        }

        writeln!(out)?;
        writeln!(out, "Summary")?;
        writeln!(out, "-------")?;
        writeln!(out, "Records returned: {}", self.record_count())?;
        writeln!(out, "Request charge: {:.2} RU", self.request_charge)?;
        writeln!(out, "Target: {}/{}", self.target.database, self.target.container)?;
        writeln!(out, "Generated at: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ExecutionMode, ExecutionReport, ReportTarget, MOCK_MARKER, MOCK_MODE_NOTE};
    use crate::errors::{QueryError, ValidationFailure};

    fn target() -> ReportTarget {
        ReportTarget {
            database: "TwinHumanDB".to_string(),
            container: "TwinProfiles".to_string(),
            partition_key_value: "twin-001".to_string(),
        }
    }

    #[test]
    fn live_report_embeds_records_and_summary() {
        let report = ExecutionReport::records(
            "SELECT * FROM c WHERE c.TwinID = 'twin-001'",
            target(),
            ExecutionMode::Live,
            vec![json!({"FirstName": "Ana"}), json!({"FirstName": "Luis"})],
            5.25,
        );
        let text = report.render();

        assert!(text.contains("Query: SELECT * FROM c WHERE c.TwinID = 'twin-001'"));
        assert!(text.contains("Partition key: twin-001"));
        assert!(text.contains("Record 2:"));
        assert!(text.contains("\"FirstName\": \"Luis\""));
        assert!(text.contains("Records returned: 2"));
        assert!(text.contains("Request charge: 5.25 RU"));
        assert!(text.contains("Target: TwinHumanDB/TwinProfiles"));
        assert!(text.contains("UTC"));
        assert!(!text.contains(MOCK_MARKER));
    }

    #[test]
    fn mock_report_carries_marker() {
        let report =
            ExecutionReport::records("SELECT * FROM c", target(), ExecutionMode::Mock, vec![], 0.0);

        assert!(report.render().contains(MOCK_MARKER));
        assert!(report.render().contains("No records matched the query."));
    }

    #[test]
    fn failure_report_keeps_layout_and_store_diagnostics() {
        let error = QueryError::Execution {
            message: "Syntax error, incorrect syntax near 'FORM'".to_string(),
            status: Some(400),
            sub_status: Some(1004),
            request_charge: 2.5,
        };
        let report = ExecutionReport::failure(
            &error,
            Some("SELECT * FORM c"),
            target(),
            ExecutionMode::Live,
        );
        let text = report.render();

        assert!(report.is_error());
        assert!(text.contains("Status: ERROR (execution_error)"));
        assert!(text.contains("Store status: 400/1004"));
        assert!(text.contains("Query: SELECT * FORM c"));
        assert!(text.contains("Records returned: 0"));
        assert!(text.contains("Request charge: 2.50 RU"));
    }

    #[test]
    fn mock_failure_notes_mode_without_promising_records() {
        let error = QueryError::Syntax("query must begin with SELECT, found `DROP`".to_string());
        let report = ExecutionReport::failure(&error, None, target(), ExecutionMode::Mock);
        let text = report.render();

        assert!(text.contains(MOCK_MODE_NOTE));
        assert!(!text.contains(MOCK_MARKER));
        assert!(text.contains("Records returned: 0"));
    }

    #[test]
    fn generation_stage_failure_has_no_query() {
        let error = QueryError::from(ValidationFailure::MaliciousPrompt { phrase: "jailbreak" });
        let report = ExecutionReport::failure(&error, None, target(), ExecutionMode::Live);

        assert_eq!(report.to_string(), report.render());
        assert!(report.render().contains("Query: (not generated)"));
        assert!(report.render().contains("validation_error"));
    }
}
