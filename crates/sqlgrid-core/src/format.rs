//! Cosmetic statement layout: one clause per paragraph.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::segment::{is_outer, is_outside_strings};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static LAYOUT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(select|from|where|group by|having|order by|values|set|and|or|union)\b")
        .expect("valid keyword regex")
});

static COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*,\s*").expect("valid comma regex"));

/// How projection lists are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SqlFormatRule {
    /// Keep comma lists on one line.
    #[default]
    AllColumnsInOneLine,
    /// Break after every outer comma.
    EveryColumnInOneLine,
}

/// Reflows a statement.
///
/// Whitespace runs outside literals collapse to one space. `select` and
/// `union` are followed by a line break; `from`, `where`, `group by`,
/// `having`, `order by`, `set` and `union` are preceded by a blank line;
/// `values`, `and` and `or` start a new line.
#[must_use]
pub fn format_statement(statement: &str, rule: SqlFormatRule) -> String {
    let collapsed = collapse_whitespace(statement.trim());
    let mut out = break_at_keywords(&collapsed);

    if rule == SqlFormatRule::EveryColumnInOneLine {
        out = break_after_commas(&out);
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for m in WHITESPACE.find_iter(text) {
        if !is_outside_strings(text, m.start()) {
            continue;
        }
        out.push_str(&text[cursor..m.start()]);
        out.push(' ');
        cursor = m.end();
    }
    out.push_str(&text[cursor..]);
    out
}

fn break_at_keywords(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut cursor = 0;
    for m in LAYOUT_KEYWORD.find_iter(text) {
        if m.start() < cursor || !is_outside_strings(text, m.start()) {
            continue;
        }
        let keyword = m.as_str().to_lowercase();
        let before = &text[cursor..m.start()];
        let lead = match keyword.as_str() {
            "from" | "where" | "group by" | "having" | "order by" | "set" | "union" => "\n\n",
            "values" | "and" | "or" => "\n",
            _ => "",
        };

        if lead.is_empty() || (out.is_empty() && before.trim().is_empty()) {
            out.push_str(before);
        } else {
            out.push_str(before.strip_suffix(' ').unwrap_or(before));
            out.push_str(lead);
        }
        out.push_str(m.as_str());
        cursor = m.end();

        if keyword == "select" || keyword == "union" {
            if text[cursor..].starts_with(' ') {
                cursor += 1;
            }
            out.push('\n');
        }
    }
    out.push_str(&text[cursor..]);
    out
}

fn break_after_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut cursor = 0;
    for m in COMMA.find_iter(text) {
        let comma = m.start() + m.as_str().find(',').unwrap_or(0);
        if !is_outer(text, comma) {
            continue;
        }
        out.push_str(&text[cursor..m.start()]);
        out.push_str(",\n");
        cursor = m.end();
    }
    out.push_str(&text[cursor..]);
    out
}
