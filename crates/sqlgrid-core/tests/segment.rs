use sqlgrid_core::format::{format_statement, SqlFormatRule};
use sqlgrid_core::segment::{split_comma_list, split_statements, SelectSegments};

const SCRIPTS: &[&str] = &[
    "",
    ";",
    "select 1",
    "select a, 'x;y' from t; delete from t where a = \"b;\";",
    "SELECT x.a, (SELECT max(b) FROM u WHERE u.c = x.c) m FROM x WHERE x.a IN (1, 2) GROUP BY x.a HAVING count(*) > 1 ORDER BY 1",
    "select [from], 'it''s' from t order by [order]",
    "  \n  select\n\ta\n  from\n\tt  \n",
];

#[test]
fn test_statement_split_round_trips() {
    for script in SCRIPTS {
        let texts: Vec<String> = split_statements(script).into_iter().map(|s| s.text).collect();
        assert_eq!(&texts.join(";"), script);
    }
}

#[test]
fn test_clause_segments_round_trip() {
    for script in SCRIPTS {
        assert_eq!(&SelectSegments::parse(script).reassemble(), script);
    }
}

#[test]
fn test_nested_query_clauses() {
    let segments = SelectSegments::parse(SCRIPTS[4]);
    assert_eq!(segments.select(), Some("x.a, (SELECT max(b) FROM u WHERE u.c = x.c) m"));
    assert_eq!(segments.from(), Some("x"));
    assert_eq!(segments.where_clause(), Some("x.a IN (1, 2)"));
    assert_eq!(segments.group(), Some("BY x.a"));
    assert_eq!(segments.having(), Some("count(*) > 1"));
    assert_eq!(segments.order(), Some("BY 1"));
}

#[test]
fn test_bracketed_identifiers_hide_keywords() {
    let segments = SelectSegments::parse(SCRIPTS[5]);
    assert_eq!(segments.select(), Some("[from], 'it''s'"));
    assert_eq!(split_comma_list(segments.select().unwrap()), ["[from]", "'it''s'"]);
}

#[test]
fn test_format_create_select_shape() {
    assert_eq!(
        format_statement("SELECT id, name FROM T t", SqlFormatRule::AllColumnsInOneLine),
        "SELECT\nid, name\n\nFROM T t"
    );
}
