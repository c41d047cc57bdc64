use tracing::warn;

use super::scan::{is_ident_byte, Scanned};
use super::NormalizedQuery;
use crate::errors::QueryError;

const FENCE: &str = "```";

/// Cleans raw completion output into an executable SELECT statement.
///
/// Steps: trim, strip markdown fences (with an optional language tag) and
/// anything after the closing fence, drop trailing semicolons, require a
/// single statement that starts with SELECT, then rewrite aliased wildcard projections (`c.*`) to the bare `*` form
/// the store dialect accepts. The result is a fixed point: normalizing it
/// again returns the same text.
pub fn normalize(raw: &str) -> Result<NormalizedQuery, QueryError> {
    let statement = strip_trailing_semicolons(strip_fences(raw.trim()));
    if statement.is_empty() {
        return Err(QueryError::Syntax("completion returned no query text".to_string()));
    }

    let scanned = Scanned::new(statement);
    if scanned.contains_code_byte(b';') {
        return Err(QueryError::Syntax(
            "multiple statements are not allowed; submit exactly one SELECT".to_string(),
        ));
    }

    if !starts_with_select(statement) {
        return Err(QueryError::Syntax(format!(
            "query must begin with SELECT, found `{}`",
            leading_word(statement)
        )));
    }

    let (corrected, rewrites) = rewrite_aliased_wildcards(&scanned);
    if rewrites > 0 {
        warn!(
            event_name = "query.normalize.wildcard_rewritten",
            rewrites,
            "aliased wildcard projection replaced with bare wildcard"
        );
    }

    Ok(NormalizedQuery(corrected))
}

/// Keeps only the query inside a markdown fence. An opening fence and its
/// language tag are dropped, and the text is cut at the first fence found
/// outside a string literal, which also discards any prose that follows a
/// closing fence.
fn strip_fences(text: &str) -> &str {
    let body = match text.strip_prefix(FENCE) {
        Some(rest) => skip_language_tag(rest),
        None => text,
    };

    let scanned = Scanned::new(body);
    match scanned.find_code(FENCE, 0) {
        Some(closing) => body[..closing].trim(),
        None => body.trim(),
    }
}

fn skip_language_tag(rest: &str) -> &str {
    let tag_len = rest
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
        .unwrap_or(rest.len());
    if rest[..tag_len].eq_ignore_ascii_case("select") {
        rest
    } else {
        &rest[tag_len..]
    }
}

fn strip_trailing_semicolons(text: &str) -> &str {
    let mut candidate = text.trim();
    while let Some(stripped) = candidate.strip_suffix(';') {
        candidate = stripped.trim_end();
    }
    candidate
}

fn starts_with_select(statement: &str) -> bool {
    let keyword_matches =
        statement.get(..6).map(|prefix| prefix.eq_ignore_ascii_case("select")).unwrap_or(false);
    let boundary = statement.as_bytes().get(6).map(|&byte| !is_ident_byte(byte)).unwrap_or(true);
    keyword_matches && boundary
}

fn leading_word(statement: &str) -> &str {
    statement.split_whitespace().next().unwrap_or(statement)
}

/// Replaces every `alias.*` (including dotted paths such as `c.address.*`)
/// outside string literals with `*`.
fn rewrite_aliased_wildcards(scanned: &Scanned<'_>) -> (String, usize) {
    let bytes = scanned.bytes();
    let mut output = String::with_capacity(bytes.len());
    let mut copied_up_to = 0;
    let mut rewrites = 0;

    for index in 0..bytes.len().saturating_sub(1) {
        if bytes[index] != b'.' || bytes[index + 1] != b'*' || !scanned.is_code(index) {
            continue;
        }

        let mut start = index;
        while start > copied_up_to
            && (is_ident_byte(bytes[start - 1]) || bytes[start - 1] == b'.')
            && scanned.is_code(start - 1)
        {
            start -= 1;
        }
        if start == index {
            continue;
        }

        output.push_str(&scanned.text[copied_up_to..start]);
        output.push('*');
        copied_up_to = index + 2;
        rewrites += 1;
    }

    output.push_str(&scanned.text[copied_up_to..]);
    (output, rewrites)
}

#[cfg(test)]
mod tests {
    use super::normalize;
    use crate::errors::QueryError;

    #[test]
    fn strips_fences_and_rewrites_aliased_wildcard() {
        let raw = "```sql\nSELECT c.* FROM Foo c WHERE c.TwinID='x'\n```";

        let normalized = normalize(raw).expect("fenced select normalizes");

        assert_eq!(normalized.as_str(), "SELECT * FROM Foo c WHERE c.TwinID='x'");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "```sql\nSELECT c.* FROM Foo c WHERE c.TwinID='x'\n```",
            "  select c.FirstName, c.LastName from c where c.TwinID = 'abc';  ",
            "```\nSELECT VALUE COUNT(1) FROM c WHERE c.TwinID = 'x'\n```",
            "SELECT * FROM c WHERE c.Note = 'see c.* and ```' ORDER BY c.Age",
            "SELECT * FROM c```;",
            "```sql\nSELECT * FROM c WHERE c.TwinID = 'x'\n```\nThis returns your profile.",
        ];

        for raw in inputs {
            let once = normalize(raw).expect("input normalizes");
            let twice = normalize(once.as_str()).expect("normalized input normalizes again");
            assert_eq!(once, twice, "normalize should be a fixed point for {raw:?}");
        }
    }

    #[test]
    fn rejects_non_select_statements() {
        let error = normalize("UPDATE Foo SET x=1").expect_err("update must be rejected");

        assert!(matches!(error, QueryError::Syntax(ref message) if message.contains("UPDATE")));
    }

    #[test]
    fn rejects_select_prefixed_identifiers() {
        let error = normalize("SELECTED * FROM c").expect_err("SELECTED is not SELECT");

        assert_eq!(error.kind(), "syntax_error");
    }

    #[test]
    fn rejects_empty_and_fence_only_output() {
        assert!(matches!(normalize("   "), Err(QueryError::Syntax(_))));
        assert!(matches!(normalize("```sql\n```"), Err(QueryError::Syntax(_))));
    }

    #[test]
    fn rejects_stacked_statements() {
        let error = normalize("SELECT * FROM c; DELETE FROM c").expect_err("stacked statements");

        assert!(error.to_string().contains("multiple statements"));
    }

    #[test]
    fn keeps_semicolons_inside_literals() {
        let normalized =
            normalize("SELECT * FROM c WHERE c.Motto = 'work; play'").expect("literal semicolon");

        assert_eq!(normalized.as_str(), "SELECT * FROM c WHERE c.Motto = 'work; play'");
    }

    #[test]
    fn fence_tag_may_share_the_query_line() {
        let normalized = normalize("```sql SELECT c.* FROM c```").expect("inline fence");

        assert_eq!(normalized.as_str(), "SELECT * FROM c");
    }

    #[test]
    fn fence_without_tag_keeps_select() {
        let normalized = normalize("```SELECT * FROM c```").expect("fence without tag");

        assert_eq!(normalized.as_str(), "SELECT * FROM c");
    }

    #[test]
    fn prose_after_closing_fence_is_discarded() {
        let raw = "```sql\nSELECT * FROM c WHERE c.TwinID = 'x'\n```\nThis returns your profile.";

        let normalized = normalize(raw).expect("fenced query with trailing prose");

        assert_eq!(normalized.as_str(), "SELECT * FROM c WHERE c.TwinID = 'x'");
    }

    #[test]
    fn stray_fence_before_semicolon_is_removed() {
        let normalized = normalize("SELECT * FROM c```;").expect("stray closing fence");

        assert_eq!(normalized.as_str(), "SELECT * FROM c");
        assert!(!normalized.as_str().contains("```"));
    }

    #[test]
    fn fence_inside_literal_does_not_end_the_query() {
        let raw = "```sql\nSELECT * FROM c WHERE c.Bio = 'uses ``` often'\n```";

        let normalized = normalize(raw).expect("literal fence");

        assert_eq!(normalized.as_str(), "SELECT * FROM c WHERE c.Bio = 'uses ``` often'");
    }

    #[test]
    fn dotted_wildcards_collapse_to_bare_wildcard() {
        let normalized = normalize("SELECT c.Address.* FROM c").expect("dotted wildcard");

        assert_eq!(normalized.as_str(), "SELECT * FROM c");
    }

    #[test]
    fn wildcards_inside_literals_are_untouched() {
        let normalized =
            normalize("SELECT * FROM c WHERE c.Pattern = 'a.*'").expect("literal wildcard");

        assert_eq!(normalized.as_str(), "SELECT * FROM c WHERE c.Pattern = 'a.*'");
    }
}
