//! Built-in function table.
//!
//! Core functions are always available. The rest live in modules that a
//! script must list in its imports: `math`, `text` and `date`.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use sqlgrid_core::convert::{format_date_time, parse_date, parse_date_time, DATE_FORMAT};

use crate::value::Value;

type BuiltinFn = fn(&[Value]) -> Result<Value, String>;

/// A callable built-in.
#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    /// Import required to call it, `None` for core functions.
    pub module: Option<&'static str>,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    pub call: BuiltinFn,
}

impl Builtin {
    /// Returns true if `count` arguments are acceptable.
    #[must_use]
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    /// Human readable arity for diagnostics.
    #[must_use]
    pub fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {max}", self.min_args),
            None => format!("at least {}", self.min_args),
        }
    }
}

/// Modules a script may import.
pub const MODULES: &[&str] = &["math", "text", "date"];

const fn builtin(
    name: &'static str,
    module: Option<&'static str>,
    min_args: usize,
    max_args: Option<usize>,
    call: BuiltinFn,
) -> Builtin {
    Builtin {
        name,
        module,
        min_args,
        max_args,
        call,
    }
}

const MATH: Option<&str> = Some("math");
const TEXT: Option<&str> = Some("text");
const DATE: Option<&str> = Some("date");

static BUILTINS: &[Builtin] = &[
    builtin("len", None, 1, Some(1), len),
    builtin("upper", None, 1, Some(1), upper),
    builtin("lower", None, 1, Some(1), lower),
    builtin("trim", None, 1, Some(1), trim),
    builtin("concat", None, 0, None, concat),
    builtin("coalesce", None, 1, None, coalesce),
    builtin("is_null", None, 1, Some(1), is_null),
    builtin("str", None, 1, Some(1), to_str),
    builtin("int", None, 1, Some(1), to_int),
    builtin("float", None, 1, Some(1), to_float),
    builtin("abs", MATH, 1, Some(1), abs),
    builtin("round", MATH, 1, Some(2), round),
    builtin("floor", MATH, 1, Some(1), floor),
    builtin("ceil", MATH, 1, Some(1), ceil),
    builtin("min", MATH, 1, None, min),
    builtin("max", MATH, 1, None, max),
    builtin("pow", MATH, 2, Some(2), pow),
    builtin("sqrt", MATH, 1, Some(1), sqrt),
    builtin("substr", TEXT, 2, Some(3), substr),
    builtin("replace", TEXT, 3, Some(3), replace),
    builtin("contains", TEXT, 2, Some(2), contains),
    builtin("starts_with", TEXT, 2, Some(2), starts_with),
    builtin("ends_with", TEXT, 2, Some(2), ends_with),
    builtin("pad_left", TEXT, 2, Some(3), pad_left),
    builtin("pad_right", TEXT, 2, Some(3), pad_right),
    builtin("today", DATE, 0, Some(0), today),
    builtin("now", DATE, 0, Some(0), now),
    builtin("add_days", DATE, 2, Some(2), add_days),
    builtin("day", DATE, 1, Some(1), day),
    builtin("month", DATE, 1, Some(1), month),
    builtin("year", DATE, 1, Some(1), year),
    builtin("format_date", DATE, 2, Some(2), format_date),
];

/// Looks up a built-in by name.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn text_arg(args: &[Value], index: usize) -> Option<String> {
    match args.get(index) {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.to_string()),
    }
}

fn number_arg(args: &[Value], index: usize, function: &str) -> Result<Option<f64>, String> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("{function}: expected a number, found {}", v.type_name())),
    }
}

fn int_arg(args: &[Value], index: usize, function: &str) -> Result<Option<i64>, String> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("{function}: expected an integer, found {}", v.type_name())),
    }
}

/// Map a text function over its first argument, passing null through.
fn map_text(args: &[Value], f: impl FnOnce(String) -> Value) -> Value {
    text_arg(args, 0).map_or(Value::Null, f)
}

#[allow(clippy::cast_possible_wrap)]
fn len(args: &[Value]) -> Result<Value, String> {
    Ok(map_text(args, |s| Value::Int(s.chars().count() as i64)))
}

fn upper(args: &[Value]) -> Result<Value, String> {
    Ok(map_text(args, |s| Value::Text(s.to_uppercase())))
}

fn lower(args: &[Value]) -> Result<Value, String> {
    Ok(map_text(args, |s| Value::Text(s.to_lowercase())))
}

fn trim(args: &[Value]) -> Result<Value, String> {
    Ok(map_text(args, |s| Value::Text(s.trim().to_string())))
}

fn concat(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Text(args.iter().map(ToString::to_string).collect()))
}

fn coalesce(args: &[Value]) -> Result<Value, String> {
    Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or_default())
}

fn is_null(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(args.first().is_none_or(Value::is_null)))
}

fn to_str(args: &[Value]) -> Result<Value, String> {
    Ok(map_text(args, Value::Text))
}

fn to_int(args: &[Value]) -> Result<Value, String> {
    Ok(int_arg(args, 0, "int")?.map_or(Value::Null, Value::Int))
}

fn to_float(args: &[Value]) -> Result<Value, String> {
    Ok(number_arg(args, 0, "float")?.map_or(Value::Null, Value::Float))
}

fn abs(args: &[Value]) -> Result<Value, String> {
    Ok(match args.first() {
        Some(Value::Int(i)) => Value::Int(i.checked_abs().ok_or("abs: integer overflow")?),
        _ => number_arg(args, 0, "abs")?.map_or(Value::Null, |f| Value::Float(f.abs())),
    })
}

fn round(args: &[Value]) -> Result<Value, String> {
    if let Some(Value::Int(i)) = args.first() {
        return Ok(Value::Int(*i));
    }
    let Some(value) = number_arg(args, 0, "round")? else {
        return Ok(Value::Null);
    };
    let digits = int_arg(args, 1, "round")?.unwrap_or(0).clamp(0, 15);
    #[allow(clippy::cast_possible_truncation)]
    let factor = 10f64.powi(digits as i32);
    Ok(Value::Float((value * factor).round() / factor))
}

#[allow(clippy::cast_possible_truncation)]
fn integral(args: &[Value], function: &str, f: fn(f64) -> f64) -> Result<Value, String> {
    if let Some(Value::Int(i)) = args.first() {
        return Ok(Value::Int(*i));
    }
    Ok(number_arg(args, 0, function)?.map_or(Value::Null, |v| Value::Int(f(v) as i64)))
}

fn floor(args: &[Value]) -> Result<Value, String> {
    integral(args, "floor", f64::floor)
}

fn ceil(args: &[Value]) -> Result<Value, String> {
    integral(args, "ceil", f64::ceil)
}

fn extreme(args: &[Value], function: &str, want: std::cmp::Ordering) -> Result<Value, String> {
    let mut best: Option<&Value> = None;
    for arg in args.iter().filter(|v| !v.is_null()) {
        best = match best {
            None => Some(arg),
            Some(current) => match arg.compare(current) {
                Some(ord) if ord == want => Some(arg),
                Some(_) => Some(current),
                None => {
                    return Err(format!(
                        "{function}: cannot compare {} with {}",
                        arg.type_name(),
                        current.type_name()
                    ))
                }
            },
        };
    }
    Ok(best.cloned().unwrap_or_default())
}

fn min(args: &[Value]) -> Result<Value, String> {
    extreme(args, "min", std::cmp::Ordering::Less)
}

fn max(args: &[Value]) -> Result<Value, String> {
    extreme(args, "max", std::cmp::Ordering::Greater)
}

fn pow(args: &[Value]) -> Result<Value, String> {
    match (number_arg(args, 0, "pow")?, number_arg(args, 1, "pow")?) {
        (Some(base), Some(exp)) => Ok(Value::Float(base.powf(exp))),
        _ => Ok(Value::Null),
    }
}

fn sqrt(args: &[Value]) -> Result<Value, String> {
    match number_arg(args, 0, "sqrt")? {
        Some(v) if v < 0.0 => Err(String::from("sqrt: negative argument")),
        Some(v) => Ok(Value::Float(v.sqrt())),
        None => Ok(Value::Null),
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn substr(args: &[Value]) -> Result<Value, String> {
    let Some(text) = text_arg(args, 0) else {
        return Ok(Value::Null);
    };
    let start = int_arg(args, 1, "substr")?.unwrap_or(0).max(0) as usize;
    let chars = text.chars().skip(start);
    let result: String = match int_arg(args, 2, "substr")? {
        Some(count) => chars.take(count.max(0) as usize).collect(),
        None => chars.collect(),
    };
    Ok(Value::Text(result))
}

fn replace(args: &[Value]) -> Result<Value, String> {
    let from = text_arg(args, 1).unwrap_or_default();
    let to = text_arg(args, 2).unwrap_or_default();
    if from.is_empty() {
        return Ok(map_text(args, Value::Text));
    }
    Ok(map_text(args, |s| Value::Text(s.replace(&from, &to))))
}

fn text_predicate(args: &[Value], f: fn(&str, &str) -> bool) -> Value {
    match (text_arg(args, 0), text_arg(args, 1)) {
        (Some(a), Some(b)) => Value::Bool(f(&a, &b)),
        _ => Value::Null,
    }
}

fn contains(args: &[Value]) -> Result<Value, String> {
    Ok(text_predicate(args, |a, b| a.contains(b)))
}

fn starts_with(args: &[Value]) -> Result<Value, String> {
    Ok(text_predicate(args, |a, b| a.starts_with(b)))
}

fn ends_with(args: &[Value]) -> Result<Value, String> {
    Ok(text_predicate(args, |a, b| a.ends_with(b)))
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn pad(args: &[Value], function: &str, left: bool) -> Result<Value, String> {
    let Some(text) = text_arg(args, 0) else {
        return Ok(Value::Null);
    };
    let width = int_arg(args, 1, function)?.unwrap_or(0).max(0) as usize;
    let fill = text_arg(args, 2)
        .and_then(|s| s.chars().next())
        .unwrap_or(' ');
    let missing = width.saturating_sub(text.chars().count());
    let padding: String = std::iter::repeat_n(fill, missing).collect();
    Ok(Value::Text(if left {
        padding + &text
    } else {
        text + &padding
    }))
}

fn pad_left(args: &[Value]) -> Result<Value, String> {
    pad(args, "pad_left", true)
}

fn pad_right(args: &[Value]) -> Result<Value, String> {
    pad(args, "pad_right", false)
}

fn date_arg(args: &[Value], index: usize, function: &str) -> Result<Option<NaiveDateTime>, String> {
    let Some(text) = text_arg(args, index) else {
        return Ok(None);
    };
    parse_date_time(&text)
        .or_else(|| parse_date(&text).and_then(|d| d.and_hms_opt(0, 0, 0)))
        .map(Some)
        .ok_or_else(|| format!("{function}: '{text}' is not a date"))
}

fn today(_: &[Value]) -> Result<Value, String> {
    Ok(Value::Text(
        Local::now().date_naive().format(DATE_FORMAT).to_string(),
    ))
}

fn now(_: &[Value]) -> Result<Value, String> {
    Ok(Value::Text(format_date_time(&Local::now().naive_local())))
}

fn add_days(args: &[Value]) -> Result<Value, String> {
    let (Some(date), Some(days)) = (date_arg(args, 0, "add_days")?, int_arg(args, 1, "add_days")?)
    else {
        return Ok(Value::Null);
    };
    let shifted = Duration::try_days(days)
        .and_then(|d| date.checked_add_signed(d))
        .ok_or("add_days: date out of range")?;
    Ok(Value::Text(format_date_time(&shifted)))
}

fn date_part(args: &[Value], function: &str, f: fn(NaiveDate) -> i64) -> Result<Value, String> {
    Ok(date_arg(args, 0, function)?.map_or(Value::Null, |d| Value::Int(f(d.date()))))
}

fn day(args: &[Value]) -> Result<Value, String> {
    date_part(args, "day", |d| i64::from(d.day()))
}

fn month(args: &[Value]) -> Result<Value, String> {
    date_part(args, "month", |d| i64::from(d.month()))
}

fn year(args: &[Value]) -> Result<Value, String> {
    date_part(args, "year", |d| i64::from(d.year()))
}

fn format_date(args: &[Value]) -> Result<Value, String> {
    let Some(date) = date_arg(args, 0, "format_date")? else {
        return Ok(Value::Null);
    };
    let pattern = text_arg(args, 1).unwrap_or_else(|| DATE_FORMAT.to_string());
    let items: Vec<_> = chrono::format::StrftimeItems::new(&pattern).collect();
    if items.contains(&chrono::format::Item::Error) {
        return Err(format!("format_date: invalid pattern '{pattern}'"));
    }
    Ok(Value::Text(date.format_with_items(items.into_iter()).to_string()))
}
