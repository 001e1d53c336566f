//! Shallow statement segmentation.
//!
//! Nothing here builds a syntax tree. Delimiters (`;`, `,`, clause
//! keywords) are located by pattern and kept only when they sit in the
//! *outer scope*: outside any parentheses or brackets and outside any open
//! quoted literal. All produced spans index the original text, so the
//! pieces reassemble to the input byte for byte.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::span::Span;

static CLAUSE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(select|from|where|group|having|order)\b").expect("valid clause regex")
});

/// Returns true if `index` is in the outer scope of `text`.
///
/// The prefix `text[..index]` must have balanced `(`/`)` and `[`/`]` and an
/// even number of `'` and `"` characters.
#[must_use]
pub fn is_outer(text: &str, index: usize) -> bool {
    let prefix = &text[..index];
    let count = |c: char| prefix.chars().filter(|&x| x == c).count();
    count('(') == count(')') && count('[') == count(']') && is_outside_strings(text, index)
}

/// Returns true if `index` is outside any quoted literal of `text`.
///
/// Parentheses are ignored.
#[must_use]
pub fn is_outside_strings(text: &str, index: usize) -> bool {
    let prefix = &text[..index];
    let count = |c: char| prefix.chars().filter(|&x| x == c).count();
    count('\'') % 2 == 0 && count('"') % 2 == 0
}

/// Offsets of every outer-scope occurrence of `delimiter`.
fn outer_positions(text: &str, delimiter: char) -> Vec<usize> {
    text.char_indices()
        .filter(|&(i, c)| c == delimiter && is_outer(text, i))
        .map(|(i, _)| i)
        .collect()
}

/// Spans between outer-scope occurrences of a one-byte delimiter.
fn split_spans(text: &str, delimiter: char) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = 0;
    for position in outer_positions(text, delimiter) {
        spans.push(Span::new(start, position));
        start = position + delimiter.len_utf8();
    }
    spans.push(Span::new(start, text.len()));
    spans
}

/// Kind of a top-level statement, derived from its leading text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptType {
    /// Empty statement.
    Unknown,
    /// Row-returning `SELECT`.
    Query,
    /// Any other statement.
    NonQuery,
    /// Host script, introduced by `::`.
    Script,
    /// Bare `commit`.
    Commit,
    /// Bare `rollback`.
    Rollback,
}

impl ScriptType {
    /// Classifies a statement.
    #[must_use]
    pub fn detect(sql: &str) -> Self {
        let lowered = sql.trim().to_lowercase();
        if lowered.is_empty() {
            Self::Unknown
        } else if lowered == "commit" {
            Self::Commit
        } else if lowered == "rollback" {
            Self::Rollback
        } else if lowered.starts_with("::") {
            Self::Script
        } else if lowered.starts_with("select") {
            Self::Query
        } else {
            Self::NonQuery
        }
    }
}

/// One top-level statement of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStatement {
    /// Statement text exactly as it appears between delimiters.
    pub text: String,
    /// Location in the script.
    #[serde(skip)]
    pub span: Span,
    /// Statement kind.
    pub script_type: ScriptType,
}

impl RawStatement {
    /// Statement text without surrounding whitespace.
    #[must_use]
    pub fn sql(&self) -> &str {
        self.text.trim()
    }
}

/// Splits a script on outer-scope `;`.
///
/// Every span between delimiters is returned, empty ones included, so
/// joining the texts with `;` gives back the script.
#[must_use]
pub fn split_statements(script: &str) -> Vec<RawStatement> {
    split_spans(script, ';')
        .into_iter()
        .map(|span| {
            let text = span.slice(script);
            RawStatement {
                text: text.to_string(),
                span,
                script_type: ScriptType::detect(text),
            }
        })
        .collect()
}

/// Returns the statement under a cursor.
///
/// `line` and `column` are zero-based; `column` counts bytes from the
/// start of the line.
#[must_use]
pub fn statement_at(script: &str, line: usize, column: usize) -> Option<RawStatement> {
    let line_start = if line == 0 {
        0
    } else {
        script
            .match_indices('\n')
            .nth(line - 1)
            .map(|(i, _)| i + 1)?
    };
    let offset = (line_start + column).min(script.len());
    split_statements(script)
        .into_iter()
        .find(|statement| statement.span.touches(offset))
}

/// Splits a comma-separated list at outer-scope commas, trimming each item.
///
/// Blank input yields no items.
#[must_use]
pub fn split_comma_list(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    comma_spans(text)
        .into_iter()
        .map(|span| span.slice(text).trim().to_string())
        .collect()
}

/// Untrimmed item spans of an outer-scope comma list.
#[must_use]
pub fn comma_spans(text: &str) -> Vec<Span> {
    split_spans(text, ',')
}

/// Clause keyword of a `SELECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    /// `SELECT`
    Select,
    /// `FROM`
    From,
    /// `WHERE`
    Where,
    /// `GROUP`
    Group,
    /// `HAVING`
    Having,
    /// `ORDER`
    Order,
}

impl Clause {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_lowercase().as_str() {
            "select" => Some(Self::Select),
            "from" => Some(Self::From),
            "where" => Some(Self::Where),
            "group" => Some(Self::Group),
            "having" => Some(Self::Having),
            "order" => Some(Self::Order),
            _ => None,
        }
    }
}

/// One clause occurrence: its keyword and the text up to the next clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClauseSegment {
    /// Which clause.
    pub clause: Clause,
    /// Keyword as written.
    pub keyword: Span,
    /// Clause body, untrimmed.
    pub body: Span,
}

/// Clause segmentation of a `SELECT` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectSegments {
    text: String,
    prefix: Span,
    clauses: Vec<ClauseSegment>,
}

impl SelectSegments {
    /// Segments a statement at outer-scope clause keywords.
    ///
    /// Keywords match case-insensitively on word boundaries.
    #[must_use]
    pub fn parse(script: &str) -> Self {
        let keywords: Vec<(Clause, Span)> = CLAUSE_KEYWORD
            .find_iter(script)
            .filter(|m| is_outer(script, m.start()))
            .filter_map(|m| Clause::from_keyword(m.as_str()).map(|c| (c, Span::new(m.start(), m.end()))))
            .collect();

        let prefix_end = keywords.first().map_or(script.len(), |(_, span)| span.start);
        let clauses = keywords
            .iter()
            .enumerate()
            .map(|(i, &(clause, keyword))| {
                let end = keywords.get(i + 1).map_or(script.len(), |(_, next)| next.start);
                ClauseSegment {
                    clause,
                    keyword,
                    body: Span::new(keyword.end, end),
                }
            })
            .collect();

        Self {
            text: script.to_string(),
            prefix: Span::new(0, prefix_end),
            clauses,
        }
    }

    /// The segmented source text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text preceding the first clause keyword.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.prefix.slice(&self.text)
    }

    /// All clause occurrences in source order.
    #[must_use]
    pub fn clauses(&self) -> &[ClauseSegment] {
        &self.clauses
    }

    /// Trimmed body of the last occurrence of `clause`.
    #[must_use]
    pub fn clause(&self, clause: Clause) -> Option<&str> {
        self.clauses
            .iter()
            .rev()
            .find(|segment| segment.clause == clause)
            .map(|segment| segment.body.slice(&self.text).trim())
    }

    /// Body of the `SELECT` clause.
    #[must_use]
    pub fn select(&self) -> Option<&str> {
        self.clause(Clause::Select)
    }

    /// Body of the `FROM` clause.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.clause(Clause::From)
    }

    /// Body of the `WHERE` clause.
    #[must_use]
    pub fn where_clause(&self) -> Option<&str> {
        self.clause(Clause::Where)
    }

    /// Body of the `GROUP` clause, `BY` included.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.clause(Clause::Group)
    }

    /// Body of the `HAVING` clause.
    #[must_use]
    pub fn having(&self) -> Option<&str> {
        self.clause(Clause::Having)
    }

    /// Body of the `ORDER` clause, `BY` included.
    #[must_use]
    pub fn order(&self) -> Option<&str> {
        self.clause(Clause::Order)
    }

    /// Concatenates prefix, keywords and bodies.
    #[must_use]
    pub fn reassemble(&self) -> String {
        let mut out = String::with_capacity(self.text.len());
        out.push_str(self.prefix());
        for segment in &self.clauses {
            out.push_str(segment.keyword.slice(&self.text));
            out.push_str(segment.body.slice(&self.text));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_outer_scope_rejects_open_quote_and_paren() {
        let text = "SELECT 'a,b', c FROM t";
        assert!(!is_outer(text, text.find(',').unwrap()));
        assert!(is_outer(text, text.rfind(',').unwrap()));

        let text = "count(a, b), c";
        assert!(!is_outer(text, 7));
        assert!(is_outer(text, 11));
        assert!(is_outside_strings(text, 7));

        let text = "[a,b]";
        assert!(!is_outer(text, 2));
    }

    #[test]
    fn test_comma_list_respects_quotes() {
        assert_eq!(split_comma_list("'a,b', c"), ["'a,b'", "c"]);
        assert_eq!(split_comma_list(" x ,  coalesce(y, 0) "), ["x", "coalesce(y, 0)"]);
        assert!(split_comma_list("  ").is_empty());
    }

    #[test]
    fn test_comma_spans_round_trip() {
        let text = " a, b.c , f(x, y)";
        let joined: Vec<&str> = comma_spans(text).iter().map(|s| s.slice(text)).collect();
        assert_eq!(joined.join(","), text);
    }

    #[test]
    fn test_split_statements() {
        let script = "select 1; update t set a = ';'; commit";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].sql(), "select 1");
        assert_eq!(statements[0].script_type, ScriptType::Query);
        assert_eq!(statements[1].sql(), "update t set a = ';'");
        assert_eq!(statements[1].script_type, ScriptType::NonQuery);
        assert_eq!(statements[2].script_type, ScriptType::Commit);

        let texts: Vec<&str> = statements.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts.join(";"), script);
    }

    #[test]
    fn test_split_keeps_empty_tail() {
        let statements = split_statements("select 1;");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].script_type, ScriptType::Unknown);
    }

    #[test]
    fn test_script_type_detect() {
        assert_eq!(ScriptType::detect("  ROLLBACK "), ScriptType::Rollback);
        assert_eq!(ScriptType::detect(":: x = 1"), ScriptType::Script);
        assert_eq!(ScriptType::detect("delete from t"), ScriptType::NonQuery);
        assert_eq!(ScriptType::detect(""), ScriptType::Unknown);
    }

    #[test]
    fn test_statement_at_cursor() {
        let script = "select 1;\nselect 2\n  from t;\nselect 3";
        let statement = statement_at(script, 2, 3).unwrap();
        assert_eq!(statement.sql(), "select 2\n  from t");
        assert_eq!(statement_at(script, 0, 0).unwrap().sql(), "select 1");
        assert_eq!(statement_at(script, 3, 4).unwrap().sql(), "select 3");
        assert!(statement_at(script, 9, 0).is_none());
    }

    #[test]
    fn test_select_segments() {
        let sql = "SELECT a, (select max(x) from u) m FROM t x WHERE a = 'from' ORDER BY a";
        let segments = SelectSegments::parse(sql);
        assert_eq!(segments.select(), Some("a, (select max(x) from u) m"));
        assert_eq!(segments.from(), Some("t x"));
        assert_eq!(segments.where_clause(), Some("a = 'from'"));
        assert_eq!(segments.order(), Some("BY a"));
        assert_eq!(segments.group(), None);
        assert_eq!(segments.reassemble(), sql);
    }

    #[test]
    fn test_last_clause_wins() {
        let sql = "select a from t union select b from u";
        let segments = SelectSegments::parse(sql);
        assert_eq!(segments.select(), Some("b"));
        assert_eq!(segments.from(), Some("u"));
        assert_eq!(segments.clauses().len(), 4);
    }

    #[test]
    fn test_keywords_need_word_boundaries() {
        let segments = SelectSegments::parse("select order_id, fromage from selection");
        assert_eq!(segments.select(), Some("order_id, fromage"));
        assert_eq!(segments.from(), Some("selection"));
    }

    #[test]
    fn test_reassemble_keeps_prefix() {
        let sql = "  /* hint */ Select 1";
        let segments = SelectSegments::parse(sql);
        assert_eq!(segments.prefix(), "  /* hint */ ");
        assert_eq!(segments.reassemble(), sql);
    }
}
