mod common;

use common::CaptionRow;
use pretty_assertions::assert_eq;
use serde_json::json;
use sqlgrid_expr::{
    Argument, CompiledScript, ParameterKind, ScriptDefinition, ScriptError, Severity, Value,
};

fn eval_row(source: &str, row: &mut CaptionRow) -> Result<Value, ScriptError> {
    let script = CompiledScript::compile(
        ScriptDefinition::evaluate(source)
            .import("math")
            .import("text")
            .row_parameter("eval"),
    )?;
    script.evaluate(&mut [Argument::Row(row)])
}

fn eval(source: &str) -> Value {
    let mut row = CaptionRow::default();
    eval_row(source, &mut row).unwrap()
}

#[test]
fn test_arithmetic() {
    assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
    assert_eq!(eval("(1 + 2) * 3"), Value::Int(9));
    assert_eq!(eval("7 / 2"), Value::Float(3.5));
    assert_eq!(eval("8 / 2"), Value::Int(4));
    assert_eq!(eval("7 % 3"), Value::Int(1));
    assert_eq!(eval("-2 + 0.5"), Value::Float(-1.5));
    assert_eq!(eval("'n=' + 3"), Value::Text("n=3".into()));
    assert_eq!(eval("null + 1"), Value::Null);
}

#[test]
fn test_logic_and_comparison() {
    assert_eq!(eval("1 < 2 && 'a' == 'a'"), Value::Bool(true));
    assert_eq!(eval("not (1 > 2) or false"), Value::Bool(true));
    assert_eq!(eval("2 == 2.0"), Value::Bool(true));
    assert_eq!(eval("null == null"), Value::Bool(true));
    assert_eq!(eval("false && 1 / 0 == 1"), Value::Bool(false));
}

#[test]
fn test_control_flow() {
    let source = "let x = 4;\nif x > 3 {\n  x = x * 10;\n} else {\n  return 0;\n}\nreturn x + 1;";
    assert_eq!(eval(source), Value::Int(41));

    let chained = "let grade = 75;\nif grade >= 90 { return 'A'; } else if grade >= 70 { return 'B'; } else { return 'C'; }";
    assert_eq!(eval(chained), Value::Text("B".into()));
}

#[test]
fn test_row_access() {
    let mut row = CaptionRow::default()
        .with("Qty", json!(3))
        .with("Unit Price", json!(2.5))
        .with("Name", json!("bolt"));
    assert_eq!(
        eval_row("[Qty] * [Unit Price]", &mut row).unwrap(),
        Value::Float(7.5)
    );
    assert_eq!(
        eval_row("upper(eval.value('Name'))", &mut row).unwrap(),
        Value::Text("BOLT".into())
    );
    assert_eq!(eval_row("[Missing]", &mut row).unwrap(), Value::Null);
}

#[test]
fn test_execute_writes_row() {
    let script = CompiledScript::compile(
        ScriptDefinition::execute("[Total] = [Qty] * 2;\nrow.set('Label', concat('x', [Qty]));")
            .row_parameter("row"),
    )
    .unwrap();
    let mut row = CaptionRow::default()
        .with("Qty", json!(4))
        .with("Total", json!(null))
        .with("Label", json!(null));
    script.execute(&mut [Argument::Row(&mut row)]).unwrap();
    assert_eq!(row.fields["Total"], json!(8));
    assert_eq!(row.fields["Label"], json!("x4"));
}

#[test]
fn test_value_parameters() {
    let script = CompiledScript::compile(
        ScriptDefinition::evaluate("a * b")
            .parameter("a", ParameterKind::Value)
            .parameter("b", ParameterKind::Value),
    )
    .unwrap();
    let result = script
        .evaluate(&mut [Argument::Value(Value::Int(6)), Argument::Value(Value::Int(7))])
        .unwrap();
    assert_eq!(result, Value::Int(42));

    let err = script
        .evaluate(&mut [Argument::Value(Value::Int(6))])
        .unwrap_err();
    assert!(matches!(
        err,
        ScriptError::ArgumentCount {
            expected: 2,
            found: 1
        }
    ));
}

#[test]
fn test_argument_kind_mismatch() {
    let script =
        CompiledScript::compile(ScriptDefinition::evaluate("[A]").row_parameter("eval")).unwrap();
    let err = script
        .evaluate(&mut [Argument::Value(Value::Null)])
        .unwrap_err();
    assert!(matches!(err, ScriptError::ArgumentKind(name) if name == "eval"));
}

#[test]
fn test_wrong_kind() {
    let script = CompiledScript::compile(ScriptDefinition::execute("let a = 1; a = a;")).unwrap();
    assert!(matches!(
        script.evaluate(&mut []),
        Err(ScriptError::WrongKind(_))
    ));
}

#[test]
fn test_runtime_errors_carry_line() {
    let mut row = CaptionRow::default();
    let err = eval_row("let x = 0;\nreturn 10 / x;", &mut row).unwrap_err();
    assert_eq!(err.to_string(), "Line 2: Division by zero");

    let err = eval_row("1 + true", &mut row).unwrap_err();
    assert!(matches!(err, ScriptError::Runtime { line: 1, .. }));

    let err =
        eval_row("let m = -9223372036854775807 - 1;\nreturn m / -1;", &mut row).unwrap_err();
    assert_eq!(err.to_string(), "Line 2: Integer overflow");
    assert_eq!(eval("-9 / 3"), Value::Int(-3));
}

#[test]
fn test_unknown_caption_writes_are_skipped() {
    let mut row = CaptionRow::default().with("Qty", json!(3));
    assert_eq!(
        eval_row("eval.set('Nope', 1)", &mut row).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        eval_row("eval.set('Qty', 4)", &mut row).unwrap(),
        Value::Bool(true)
    );

    let script =
        CompiledScript::compile(ScriptDefinition::execute("[Nope] = 1;").row_parameter("r"))
            .unwrap();
    script.execute(&mut [Argument::Row(&mut row)]).unwrap();
    assert_eq!(row.fields.len(), 1);
    assert_eq!(row.fields["Qty"], json!(4));
}

#[test]
fn test_compile_errors_collect_everything() {
    let err = CompiledScript::compile(ScriptDefinition::evaluate(
        "let a = missing;\nlet b = nope(1);\nreturn a + b;",
    ))
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "E, Line-No: 00001, Undefined variable 'missing'\nE, Line-No: 00002, Unknown function 'nope'"
    );
    assert_eq!(err.diagnostics().len(), 2);
}

#[test]
fn test_syntax_errors() {
    let err = CompiledScript::compile(ScriptDefinition::evaluate("let = 1;\nreturn 'open"))
        .unwrap_err();
    let lines: Vec<u32> = err.diagnostics().iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![1, 2]);
    assert!(err.diagnostics()[1].message.contains("Unterminated string"));
}

#[test]
fn test_warnings_do_not_fail() {
    let script =
        CompiledScript::compile(ScriptDefinition::evaluate("let spare = 1;\nreturn 2;")).unwrap();
    assert_eq!(script.warnings().len(), 1);
    assert_eq!(script.warnings()[0].severity, Severity::Warning);
    assert_eq!(script.evaluate(&mut []).unwrap(), Value::Int(2));
}
