use serde::{Deserialize, Serialize};
use tracing::warn;

use super::scan::{is_ident_byte, read_string_literal, skip_whitespace, Scanned};
use super::NormalizedQuery;
use crate::errors::QueryError;

/// Clauses that may follow a WHERE clause at the top level of a query.
const TRAILING_CLAUSES: &[&str] = &["GROUP", "ORDER", "OFFSET"];
/// Words that can follow the container name without being an alias.
const NON_ALIAS_WORDS: &[&str] = &["WHERE", "GROUP", "ORDER", "OFFSET", "JOIN", "IN"];

/// What to do with a query that never filters on the partition key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionFilterPolicy {
    #[default]
    Inject,
    Reject,
}

impl std::str::FromStr for PartitionFilterPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inject" => Ok(Self::Inject),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unsupported partition filter policy `{other}` (expected inject|reject)")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionScope<'a> {
    pub field: &'a str,
    pub value: &'a str,
    pub policy: PartitionFilterPolicy,
}

/// Verifies that `query` filters on `scope.field = scope.value`.
///
/// The filter only counts when every row must satisfy it: it has to be a
/// top-level AND condition of the WHERE clause, never under OR or NOT. An
/// equality filter on the partition field with any other value is always
/// rejected. A missing or non-restrictive filter is injected as the first
/// WHERE predicate or rejected, depending on the policy.
pub fn enforce_partition_scope(
    query: NormalizedQuery,
    scope: PartitionScope<'_>,
) -> Result<NormalizedQuery, QueryError> {
    let scanned = Scanned::new(query.as_str());
    let alias = source_alias(&scanned)?;
    let filters = partition_filters(&scanned, alias, scope.field);

    if let Some((_, foreign)) = filters.iter().find(|(_, value)| value.as_str() != scope.value) {
        return Err(QueryError::PartitionScope(format!(
            "query filters `{alias}.{}` on `{foreign}` but the request is scoped to `{}`",
            scope.field, scope.value
        )));
    }

    let restricted = where_body(&scanned).is_some_and(|body| {
        filters.iter().any(|&(at, _)| is_top_level_conjunct(&scanned, body, at))
    });
    if restricted {
        return Ok(query);
    }

    match scope.policy {
        PartitionFilterPolicy::Reject if filters.is_empty() => Err(QueryError::PartitionScope(
            format!("query does not filter on `{alias}.{}`", scope.field),
        )),
        PartitionFilterPolicy::Reject => Err(QueryError::PartitionScope(format!(
            "filter on `{alias}.{}` must be a top-level AND condition of the WHERE clause",
            scope.field
        ))),
        PartitionFilterPolicy::Inject => {
            let predicate = format!("{alias}.{} = {}", scope.field, quote_literal(scope.value));
            warn!(
                event_name = "query.scope.partition_filter_injected",
                partition_field = scope.field,
                "query lacked a partition filter; injecting it"
            );
            Ok(NormalizedQuery(inject_predicate(&scanned, &predicate)))
        }
    }
}

fn source_alias<'a>(scanned: &Scanned<'a>) -> Result<&'a str, QueryError> {
    let missing_from = || QueryError::PartitionScope("query has no FROM clause".to_string());
    let from = scanned.find_keyword("FROM", 0).ok_or_else(missing_from)?;
    let (container_start, container_end) = scanned.next_ident(from + 4).ok_or_else(missing_from)?;
    let container = &scanned.text[container_start..container_end];

    let Some((mut start, mut end)) = scanned.next_ident(container_end) else {
        return Ok(container);
    };
    if scanned.text[start..end].eq_ignore_ascii_case("AS") {
        match scanned.next_ident(end) {
            Some(next) => (start, end) = next,
            None => return Ok(container),
        }
    }

    let word = &scanned.text[start..end];
    if NON_ALIAS_WORDS.iter().any(|keyword| word.eq_ignore_ascii_case(keyword)) {
        Ok(container)
    } else {
        Ok(word)
    }
}

/// Positions and literal values of every `alias.field = 'value'` comparison
/// in the query.
fn partition_filters(scanned: &Scanned<'_>, alias: &str, field: &str) -> Vec<(usize, String)> {
    let bytes = scanned.bytes();
    let reference = format!("{alias}.{field}");
    let needle = reference.as_bytes();
    let mut filters = Vec::new();
    let mut index = 0;

    while index + needle.len() <= bytes.len() {
        let end = index + needle.len();
        let matches = scanned.is_code(index)
            && &bytes[index..end] == needle
            && (index == 0 || !(is_ident_byte(bytes[index - 1]) || bytes[index - 1] == b'.'))
            && (end == bytes.len() || !is_ident_byte(bytes[end]));
        if !matches {
            index += 1;
            continue;
        }

        let operator = skip_whitespace(bytes, end);
        if bytes.get(operator) == Some(&b'=') {
            let literal_start = skip_whitespace(bytes, operator + 1);
            if let Some((value, _)) = read_string_literal(bytes, literal_start) {
                filters.push((index, value));
            }
        }
        index = end;
    }

    filters
}

/// Byte range of the top-level WHERE predicate, excluding the keyword.
fn where_body(scanned: &Scanned<'_>) -> Option<(usize, usize)> {
    let from = scanned.find_keyword("FROM", 0)?;
    let where_at = scanned.find_keyword("WHERE", from)?;
    let body_start = where_at + "WHERE".len();
    let body_end =
        scanned.find_first_keyword(TRAILING_CLAUSES, body_start).unwrap_or(scanned.text.len());
    Some((body_start, body_end))
}

/// True when the comparison at `at` must hold for every matching row: each
/// enclosing group is joined to its surroundings by AND only, and no group
/// on the way out contains an OR or a subquery at its own level.
fn is_top_level_conjunct(scanned: &Scanned<'_>, body: (usize, usize), at: usize) -> bool {
    let (body_start, body_end) = body;
    if at < body_start || at >= body_end || !follows_conjunction(scanned, at, body_start) {
        return false;
    }

    let (mut start, mut end) = (at, at);
    for level in (0..=scanned.depth_at(at)).rev() {
        while start > body_start && scanned.depth_at(start - 1) >= level {
            start -= 1;
        }
        while end < body_end && scanned.depth_at(end) >= level {
            end += 1;
        }

        if level > 0 && !follows_conjunction(scanned, start, body_start) {
            return false;
        }
        if ["OR", "SELECT"]
            .iter()
            .any(|keyword| scanned.find_keyword_within(keyword, start, end, level).is_some())
        {
            return false;
        }
    }

    true
}

/// Whether the token before `at` is the start of the predicate, an opening
/// parenthesis, or AND. Anything else (NOT, a function name) changes the
/// meaning of what follows.
fn follows_conjunction(scanned: &Scanned<'_>, at: usize, body_start: usize) -> bool {
    let bytes = scanned.bytes();
    let mut prev = at;
    while prev > body_start && bytes[prev - 1].is_ascii_whitespace() {
        prev -= 1;
    }
    if prev == body_start || bytes[prev - 1] == b'(' {
        return true;
    }

    let mut word_start = prev;
    while word_start > body_start && is_ident_byte(bytes[word_start - 1]) {
        word_start -= 1;
    }
    scanned.text[word_start..prev].eq_ignore_ascii_case("AND")
}

fn inject_predicate(scanned: &Scanned<'_>, predicate: &str) -> String {
    let text = scanned.text;
    let from = scanned.find_keyword("FROM", 0).unwrap_or(0);

    match where_body(scanned) {
        Some((body_start, body_end)) => {
            let where_at = body_start - "WHERE".len();
            let body = text[body_start..body_end].trim();
            let tail = text[body_end..].trim();

            let mut rewritten = format!("{}WHERE {predicate} AND ({body})", &text[..where_at]);
            if !tail.is_empty() {
                rewritten.push(' ');
                rewritten.push_str(tail);
            }
            rewritten
        }
        None => {
            let insert_at = scanned.find_first_keyword(TRAILING_CLAUSES, from).unwrap_or(text.len());
            let head = text[..insert_at].trim_end();
            let tail = text[insert_at..].trim();

            let mut rewritten = format!("{head} WHERE {predicate}");
            if !tail.is_empty() {
                rewritten.push(' ');
                rewritten.push_str(tail);
            }
            rewritten
        }
    }
}

/// Renders `value` as a single-quoted string literal in the store dialect.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::{enforce_partition_scope, PartitionFilterPolicy, PartitionScope};
    use crate::errors::QueryError;
    use crate::query::normalize;

    fn scope(policy: PartitionFilterPolicy) -> PartitionScope<'static> {
        PartitionScope { field: "TwinID", value: "twin-001", policy }
    }

    fn enforce(raw: &str, policy: PartitionFilterPolicy) -> Result<String, QueryError> {
        let query = normalize(raw).expect("test query normalizes");
        enforce_partition_scope(query, scope(policy)).map(|query| query.into_inner())
    }

    #[test]
    fn matching_filter_passes_unchanged() {
        let raw = "SELECT * FROM c WHERE c.TwinID = 'twin-001' AND c.Age > 30";

        assert_eq!(enforce(raw, PartitionFilterPolicy::Reject), Ok(raw.to_string()));
    }

    #[test]
    fn foreign_partition_value_is_always_rejected() {
        let raw = "SELECT * FROM c WHERE c.TwinID = 'twin-999'";

        for policy in [PartitionFilterPolicy::Inject, PartitionFilterPolicy::Reject] {
            let error = enforce(raw, policy).expect_err("foreign partition must be rejected");
            assert_eq!(error.kind(), "partition_scope_error");
            assert!(error.to_string().contains("twin-999"));
        }
    }

    #[test]
    fn missing_filter_is_rejected_under_reject_policy() {
        let error = enforce("SELECT * FROM c WHERE c.Age > 30", PartitionFilterPolicy::Reject)
            .expect_err("missing filter must be rejected");

        assert!(matches!(error, QueryError::PartitionScope(ref message) if message.contains("c.TwinID")));
    }

    #[test]
    fn missing_filter_is_injected_before_existing_predicates() {
        let rewritten = enforce(
            "SELECT * FROM c WHERE c.Age > 30 OR c.Age < 10 ORDER BY c.Age",
            PartitionFilterPolicy::Inject,
        )
        .expect("filter is injected");

        assert_eq!(
            rewritten,
            "SELECT * FROM c WHERE c.TwinID = 'twin-001' AND (c.Age > 30 OR c.Age < 10) ORDER BY c.Age"
        );
    }

    #[test]
    fn filter_under_or_is_rejected_under_reject_policy() {
        let raw = "SELECT * FROM c WHERE c.Age > 0 OR c.TwinID = 'twin-001'";

        let error = enforce(raw, PartitionFilterPolicy::Reject).expect_err("OR widens the scope");

        assert_eq!(error.kind(), "partition_scope_error");
        assert!(error.to_string().contains("top-level AND"));
    }

    #[test]
    fn filter_under_or_is_wrapped_under_inject_policy() {
        let raw = "SELECT * FROM c WHERE c.Age > 0 OR c.TwinID = 'twin-001'";

        let rewritten = enforce(raw, PartitionFilterPolicy::Inject).expect("filter is injected");
        assert_eq!(
            rewritten,
            "SELECT * FROM c WHERE c.TwinID = 'twin-001' AND (c.Age > 0 OR c.TwinID = 'twin-001')"
        );

        let again = enforce(&rewritten, PartitionFilterPolicy::Reject).expect("injected query is scoped");
        assert_eq!(again, rewritten);
    }

    #[test]
    fn negated_or_nested_filters_do_not_count() {
        for raw in [
            "SELECT * FROM c WHERE NOT c.TwinID = 'twin-001'",
            "SELECT * FROM c WHERE c.Age > 0 AND NOT (c.TwinID = 'twin-001')",
            "SELECT * FROM c WHERE (c.TwinID = 'twin-001' AND c.Age > 0) OR c.Age < 0",
            "SELECT * FROM c WHERE EXISTS(SELECT VALUE t FROM t IN c.Tags WHERE c.TwinID = 'twin-001')",
            "SELECT c.TwinID = 'twin-001' FROM c",
        ] {
            let error = enforce(raw, PartitionFilterPolicy::Reject).expect_err("filter does not restrict");
            assert_eq!(error.kind(), "partition_scope_error", "{raw}");
        }
    }

    #[test]
    fn grouped_conjunctions_keep_the_filter() {
        for raw in [
            "SELECT * FROM c WHERE (c.Age > 0 OR c.Age < 0) AND (c.TwinID = 'twin-001')",
            "SELECT * FROM c WHERE c.Age > 0 AND (c.Name = 'a' AND c.TwinID = 'twin-001') ORDER BY c.Age",
            "SELECT * FROM c WHERE c.Note = 'x or y' AND c.TwinID = 'twin-001'",
        ] {
            assert_eq!(enforce(raw, PartitionFilterPolicy::Reject), Ok(raw.to_string()));
        }
    }

    #[test]
    fn missing_where_clause_is_added() {
        let rewritten = enforce("SELECT c.FirstName FROM Profiles p", PartitionFilterPolicy::Inject)
            .expect("where clause is added");

        assert_eq!(rewritten, "SELECT c.FirstName FROM Profiles p WHERE p.TwinID = 'twin-001'");
    }

    #[test]
    fn where_clause_is_added_before_trailing_clauses() {
        let rewritten = enforce(
            "SELECT * FROM c ORDER BY c.Age OFFSET 0 LIMIT 10",
            PartitionFilterPolicy::Inject,
        )
        .expect("where clause is added");

        assert_eq!(
            rewritten,
            "SELECT * FROM c WHERE c.TwinID = 'twin-001' ORDER BY c.Age OFFSET 0 LIMIT 10"
        );
    }

    #[test]
    fn container_without_alias_is_its_own_alias() {
        let rewritten =
            enforce("SELECT * FROM Profiles WHERE Profiles.TwinID = 'twin-001'", PartitionFilterPolicy::Reject)
                .expect("container name works as alias");

        assert_eq!(rewritten, "SELECT * FROM Profiles WHERE Profiles.TwinID = 'twin-001'");
    }

    #[test]
    fn explicit_as_alias_is_resolved() {
        let rewritten = enforce("SELECT * FROM Profiles AS p", PartitionFilterPolicy::Inject)
            .expect("AS alias is resolved");

        assert_eq!(rewritten, "SELECT * FROM Profiles AS p WHERE p.TwinID = 'twin-001'");
    }

    #[test]
    fn injected_value_is_escaped() {
        let query = normalize("SELECT * FROM c").expect("normalizes");
        let scope = PartitionScope {
            field: "TwinID",
            value: "o'brien",
            policy: PartitionFilterPolicy::Inject,
        };

        let rewritten = enforce_partition_scope(query, scope).expect("injected");
        assert_eq!(rewritten.as_str(), r"SELECT * FROM c WHERE c.TwinID = 'o\'brien'");

        let again = enforce_partition_scope(rewritten.clone(), scope).expect("escaped filter matches");
        assert_eq!(again, rewritten);
    }

    #[test]
    fn query_without_from_is_rejected() {
        let error = enforce("SELECT 1", PartitionFilterPolicy::Inject).expect_err("no FROM clause");

        assert!(error.to_string().contains("FROM"));
    }

    #[test]
    fn policy_parses_from_text() {
        assert_eq!("Reject".parse::<PartitionFilterPolicy>(), Ok(PartitionFilterPolicy::Reject));
        assert!("skip".parse::<PartitionFilterPolicy>().is_err());
    }
}
