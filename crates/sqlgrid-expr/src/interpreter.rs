//! Tree-walking interpreter.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, Literal, Program, Stmt, UnaryOp};
use crate::builtins;
use crate::error::{Result, ScriptError};
use crate::script::{ParameterKind, ScriptParameter};
use crate::value::Value;

/// Row access for row parameters. Fields are addressed by column caption.
pub trait RowContext {
    /// Reads the field with this caption, `None` if no column has it.
    fn value(&self, caption: &str) -> Option<serde_json::Value>;

    /// Writes the field with this caption. Returns false if no column has it.
    fn set_value(&mut self, caption: &str, value: serde_json::Value) -> bool;
}

/// An argument bound to a script parameter.
pub enum Argument<'a> {
    Row(&'a mut dyn RowContext),
    Value(Value),
}

impl Argument<'_> {
    const fn kind(&self) -> ParameterKind {
        match self {
            Self::Row(_) => ParameterKind::Row,
            Self::Value(_) => ParameterKind::Value,
        }
    }
}

enum Flow {
    Next,
    Return(Value),
}

pub(crate) struct Interpreter<'s, 'a, 'r> {
    parameters: &'s [ScriptParameter],
    args: &'a mut [Argument<'r>],
    scopes: Vec<HashMap<String, Value>>,
}

impl<'s, 'a, 'r> Interpreter<'s, 'a, 'r> {
    /// Binds arguments to parameters, checking count and kind.
    pub(crate) fn new(parameters: &'s [ScriptParameter], args: &'a mut [Argument<'r>]) -> Result<Self> {
        if parameters.len() != args.len() {
            return Err(ScriptError::ArgumentCount {
                expected: parameters.len(),
                found: args.len(),
            });
        }
        if let Some(mismatch) = parameters
            .iter()
            .zip(args.iter())
            .find(|(p, a)| p.kind != a.kind())
        {
            return Err(ScriptError::ArgumentKind(mismatch.0.name.clone()));
        }
        Ok(Self {
            parameters,
            args,
            scopes: vec![HashMap::new()],
        })
    }

    /// Runs the program. Yields the returned value, else the value of a
    /// trailing expression statement, else null.
    pub(crate) fn run(&mut self, program: &Program) -> Result<Value> {
        let mut last = Value::Null;
        for (i, stmt) in program.statements.iter().enumerate() {
            if let Stmt::Expr { expr, .. } = stmt {
                let value = self.eval(expr)?;
                if i + 1 == program.statements.len() {
                    last = value;
                }
                continue;
            }
            if let Flow::Return(value) = self.exec(stmt)? {
                return Ok(value);
            }
        }
        Ok(last)
    }

    fn exec_block(&mut self, statements: &[Stmt]) -> Result<Flow> {
        self.scopes.push(HashMap::new());
        let mut flow = Flow::Next;
        for stmt in statements {
            match self.exec(stmt) {
                Ok(Flow::Next) => {}
                Ok(returned) => {
                    flow = returned;
                    break;
                }
                Err(err) => {
                    self.scopes.pop();
                    return Err(err);
                }
            }
        }
        self.scopes.pop();
        Ok(flow)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow> {
        let line = stmt.span().line;
        match stmt {
            Stmt::Let { name, value, .. } => {
                let value = self.eval(value)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone(), value);
                }
            }
            Stmt::Assign { name, value, .. } => {
                let value = self.eval(value)?;
                let slot = self
                    .scopes
                    .iter_mut()
                    .rev()
                    .find_map(|scope| scope.get_mut(name))
                    .ok_or_else(|| {
                        ScriptError::runtime(line, format!("Undefined variable '{name}'"))
                    })?;
                *slot = value;
            }
            Stmt::FieldAssign { caption, value, .. } => {
                let value = self.eval(value)?;
                let row = self.default_row(line)?;
                self.set_field(row, caption, value, line)?;
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let condition = self.eval(condition)?;
                if truthy(&condition, line)? {
                    return self.exec_block(then_branch);
                }
                if let Some(branch) = else_branch {
                    return self.exec_block(branch);
                }
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Block { body, .. } => return self.exec_block(body),
            Stmt::Expr { expr, .. } => {
                self.eval(expr)?;
            }
        }
        Ok(Flow::Next)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        let line = expr.span().line;
        match expr {
            Expr::Literal { value, .. } => Ok(match value {
                Literal::Integer(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::String(s) => Value::Text(s.clone()),
                Literal::Boolean(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),
            Expr::Variable { name, .. } => self.lookup(name, line),
            Expr::Field { caption, .. } => {
                let row = self.default_row(line)?;
                Ok(self.get_field(row, caption))
            }
            Expr::Unary { op, operand, .. } => {
                let value = self.eval(operand)?;
                unary(*op, value, line)
            }
            Expr::Binary {
                left, op, right, ..
            } => match op {
                BinaryOp::And => {
                    let left = self.eval(left)?;
                    if !truthy(&left, line)? {
                        return Ok(Value::Bool(false));
                    }
                    let right = self.eval(right)?;
                    Ok(Value::Bool(truthy(&right, line)?))
                }
                BinaryOp::Or => {
                    let left = self.eval(left)?;
                    if truthy(&left, line)? {
                        return Ok(Value::Bool(true));
                    }
                    let right = self.eval(right)?;
                    Ok(Value::Bool(truthy(&right, line)?))
                }
                _ => {
                    let left = self.eval(left)?;
                    let right = self.eval(right)?;
                    binary(*op, left, right, line)
                }
            },
            Expr::Call { name, args, .. } => {
                let builtin = builtins::lookup(name).ok_or_else(|| {
                    ScriptError::runtime(line, format!("Unknown function '{name}'"))
                })?;
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                (builtin.call)(&values).map_err(|message| ScriptError::runtime(line, message))
            }
            Expr::Method {
                receiver,
                method,
                args,
                ..
            } => {
                let Expr::Variable { name, .. } = receiver.as_ref() else {
                    return Err(ScriptError::runtime(
                        line,
                        "Methods can only be called on row parameters",
                    ));
                };
                let row = self.row_parameter(name, line)?;
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                match (method.as_str(), values.as_slice()) {
                    ("value", [caption]) => Ok(self.get_field(row, &caption.to_string())),
                    ("set", [caption, value]) => self
                        .set_field(row, &caption.to_string(), value.clone(), line)
                        .map(Value::Bool),
                    _ => Err(ScriptError::runtime(
                        line,
                        format!("Unknown method '{method}'"),
                    )),
                }
            }
        }
    }

    fn lookup(&self, name: &str, line: u32) -> Result<Value> {
        if let Some(value) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Ok(value.clone());
        }
        let index = self.parameters.iter().position(|p| p.name == name);
        match index.map(|i| &self.args[i]) {
            Some(Argument::Value(value)) => Ok(value.clone()),
            Some(Argument::Row(_)) => Err(ScriptError::runtime(
                line,
                format!("Row parameter '{name}' can only be used through its methods"),
            )),
            None => Err(ScriptError::runtime(
                line,
                format!("Undefined variable '{name}'"),
            )),
        }
    }

    /// Index of the first row argument, used by `[Caption]`.
    fn default_row(&self, line: u32) -> Result<usize> {
        self.args
            .iter()
            .position(|a| matches!(a, Argument::Row(_)))
            .ok_or_else(|| ScriptError::runtime(line, "No row parameter bound"))
    }

    fn row_parameter(&self, name: &str, line: u32) -> Result<usize> {
        self.parameters
            .iter()
            .position(|p| p.name == name && p.kind == ParameterKind::Row)
            .ok_or_else(|| ScriptError::runtime(line, format!("'{name}' is not a row parameter")))
    }

    /// Unknown captions read as null.
    fn get_field(&self, index: usize, caption: &str) -> Value {
        match &self.args[index] {
            Argument::Row(row) => row
                .value(caption)
                .map_or(Value::Null, |v| Value::from_json(&v)),
            Argument::Value(_) => Value::Null,
        }
    }

    /// Unknown captions are skipped; returns whether a field was written.
    fn set_field(
        &mut self,
        index: usize,
        caption: &str,
        value: Value,
        line: u32,
    ) -> Result<bool> {
        let Argument::Row(row) = &mut self.args[index] else {
            return Err(ScriptError::runtime(line, "Argument is not a row"));
        };
        Ok(row.set_value(caption, value.into_json()))
    }
}

fn overflow(line: u32) -> ScriptError {
    ScriptError::runtime(line, "Integer overflow")
}

fn binary(op: BinaryOp, left: Value, right: Value, line: u32) -> Result<Value> {
    use BinaryOp::{Add, Div, Eq, Gt, GtEq, Lt, LtEq, Mod, Mul, NotEq, Sub};

    match op {
        Eq => return Ok(Value::Bool(left.loose_eq(&right))),
        NotEq => return Ok(Value::Bool(!left.loose_eq(&right))),
        Lt | LtEq | Gt | GtEq => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let ordering = left.compare(&right).ok_or_else(|| {
                ScriptError::runtime(
                    line,
                    format!(
                        "Cannot compare {} with {}",
                        left.type_name(),
                        right.type_name()
                    ),
                )
            })?;
            return Ok(Value::Bool(match op {
                Lt => ordering.is_lt(),
                LtEq => ordering.is_le(),
                Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }));
        }
        _ => {}
    }

    // `+` concatenates as soon as one side is text.
    if op == Add && (matches!(left, Value::Text(_)) || matches!(right, Value::Text(_))) {
        return Ok(Value::Text(format!("{left}{right}")));
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        let (a, b) = (*a, *b);
        return match op {
            Add => a.checked_add(b).map(Value::Int).ok_or_else(|| overflow(line)),
            Sub => a.checked_sub(b).map(Value::Int).ok_or_else(|| overflow(line)),
            Mul => a.checked_mul(b).map(Value::Int).ok_or_else(|| overflow(line)),
            Div | Mod if b == 0 => Err(ScriptError::runtime(line, "Division by zero")),
            // Exact quotients stay integral, others widen to float.
            #[allow(clippy::cast_precision_loss)]
            Div => match a.checked_rem(b) {
                None => Err(overflow(line)),
                Some(0) => a.checked_div(b).map(Value::Int).ok_or_else(|| overflow(line)),
                Some(_) => Ok(Value::Float(a as f64 / b as f64)),
            },
            Mod => a.checked_rem(b).map(Value::Int).ok_or_else(|| overflow(line)),
            _ => Err(ScriptError::runtime(
                line,
                format!("Unsupported operator {}", op.as_str()),
            )),
        };
    }

    let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
        return Err(ScriptError::runtime(
            line,
            format!(
                "Operator {} cannot be applied to {} and {}",
                op.as_str(),
                left.type_name(),
                right.type_name()
            ),
        ));
    };
    match op {
        Add => Ok(Value::Float(a + b)),
        Sub => Ok(Value::Float(a - b)),
        Mul => Ok(Value::Float(a * b)),
        Div | Mod if b == 0.0 => Err(ScriptError::runtime(line, "Division by zero")),
        Div => Ok(Value::Float(a / b)),
        Mod => Ok(Value::Float(a % b)),
        _ => Err(ScriptError::runtime(
            line,
            format!("Unsupported operator {}", op.as_str()),
        )),
    }
}
