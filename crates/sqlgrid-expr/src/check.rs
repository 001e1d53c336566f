//! Semantic checks run after a clean parse.

use crate::ast::{Expr, Program, Stmt};
use crate::builtins::{self, MODULES};
use crate::diagnostic::Diagnostic;
use crate::script::{ParameterKind, ScriptDefinition, ScriptKind};

/// Methods callable on row parameters, with their argument counts.
pub const ROW_METHODS: &[(&str, usize)] = &[("value", 1), ("set", 2)];

struct Binding {
    name: String,
    line: u32,
    used: bool,
}

struct Checker<'a> {
    definition: &'a ScriptDefinition,
    scopes: Vec<Vec<Binding>>,
    diagnostics: Vec<Diagnostic>,
}

/// Checks a parsed program against its definition and returns every
/// diagnostic found, sorted by line.
#[must_use]
pub fn check(program: &Program, definition: &ScriptDefinition) -> Vec<Diagnostic> {
    let mut checker = Checker {
        definition,
        scopes: vec![Vec::new()],
        diagnostics: Vec::new(),
    };
    checker.check_definition();

    let returns = checker.check_statements(&program.statements);
    checker.pop_scope();

    if definition.kind == ScriptKind::Evaluate && !returns && !program.ends_with_expression() {
        let line = program.statements.last().map_or(1, |s| s.span().line);
        checker
            .diagnostics
            .push(Diagnostic::error(line, "Script does not return a value"));
    }

    let mut diagnostics = checker.diagnostics;
    diagnostics.sort_by_key(|d| d.line);
    diagnostics
}

impl Checker<'_> {
    fn error(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(line, message));
    }

    fn warning(&mut self, line: u32, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::warning(line, message));
    }

    fn check_definition(&mut self) {
        for import in &self.definition.imports {
            if !MODULES.contains(&import.as_str()) {
                self.error(1, format!("Unknown import '{import}'"));
            }
        }
        let parameters = &self.definition.parameters;
        for (i, parameter) in parameters.iter().enumerate() {
            if parameters[..i].iter().any(|p| p.name == parameter.name) {
                self.error(1, format!("Duplicate parameter '{}'", parameter.name));
            }
        }
    }

    fn parameter_kind(&self, name: &str) -> Option<ParameterKind> {
        self.definition
            .parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.kind)
    }

    fn has_row_parameter(&self) -> bool {
        self.definition
            .parameters
            .iter()
            .any(|p| p.kind == ParameterKind::Row)
    }

    fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            for binding in scope.into_iter().filter(|b| !b.used) {
                self.warning(
                    binding.line,
                    format!("Variable '{}' is never used", binding.name),
                );
            }
        }
    }

    /// Marks a local as used. Returns false if no local has that name.
    fn use_local(&mut self, name: &str) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.iter_mut().rev().find(|b| b.name == name) {
                binding.used = true;
                return true;
            }
        }
        false
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.iter().any(|b| b.name == name))
    }

    /// Checks statements in the current scope. Returns true when every
    /// path through them reaches a `return`.
    fn check_statements(&mut self, statements: &[Stmt]) -> bool {
        let mut returns = false;
        let mut reported = false;
        for stmt in statements {
            if returns && !reported {
                self.warning(stmt.span().line, "Unreachable code detected");
                reported = true;
            }
            returns |= self.check_statement(stmt);
        }
        returns
    }

    fn check_block(&mut self, statements: &[Stmt]) -> bool {
        self.push_scope();
        let returns = self.check_statements(statements);
        self.pop_scope();
        returns
    }

    fn check_statement(&mut self, stmt: &Stmt) -> bool {
        let line = stmt.span().line;
        match stmt {
            Stmt::Let { name, value, .. } => {
                self.check_expr(value);
                let redefined = self
                    .scopes
                    .last()
                    .is_some_and(|scope| scope.iter().any(|b| &b.name == name));
                if redefined {
                    self.error(line, format!("Variable '{name}' is already defined"));
                } else if self.parameter_kind(name).is_some() {
                    self.error(line, format!("Variable '{name}' shadows a parameter"));
                } else if builtins::lookup(name).is_some() {
                    self.warning(line, format!("Variable '{name}' shadows a function"));
                }
                if let Some(scope) = self.scopes.last_mut() {
                    scope.push(Binding {
                        name: name.clone(),
                        line,
                        used: false,
                    });
                }
                false
            }
            Stmt::Assign { name, value, .. } => {
                self.check_expr(value);
                if self.parameter_kind(name).is_some() {
                    self.error(line, format!("Cannot assign to parameter '{name}'"));
                } else if !self.is_local(name) {
                    self.error(line, format!("Undefined variable '{name}'"));
                }
                false
            }
            Stmt::FieldAssign { caption, value, .. } => {
                self.check_expr(value);
                self.require_row(line, caption);
                false
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_expr(condition);
                let then_returns = self.check_block(then_branch);
                let else_returns = else_branch
                    .as_ref()
                    .is_some_and(|branch| self.check_block(branch));
                then_returns && else_returns
            }
            Stmt::Return { value, .. } => {
                match (value, self.definition.kind) {
                    (Some(expr), ScriptKind::Evaluate) => self.check_expr(expr),
                    (Some(expr), ScriptKind::Execute) => {
                        self.check_expr(expr);
                        self.warning(line, "Return value is ignored by execute scripts");
                    }
                    (None, ScriptKind::Evaluate) => {
                        self.error(line, "Return requires a value in evaluate scripts");
                    }
                    (None, ScriptKind::Execute) => {}
                }
                true
            }
            Stmt::Block { body, .. } => self.check_block(body),
            Stmt::Expr { expr, .. } => {
                self.check_expr(expr);
                false
            }
        }
    }

    fn require_row(&mut self, line: u32, caption: &str) {
        if !self.has_row_parameter() {
            self.error(
                line,
                format!("Field [{caption}] needs a row parameter"),
            );
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        let line = expr.span().line;
        match expr {
            Expr::Literal { .. } => {}
            Expr::Variable { name, .. } => {
                if self.use_local(name) {
                    return;
                }
                match self.parameter_kind(name) {
                    Some(ParameterKind::Value) => {}
                    Some(ParameterKind::Row) => self.error(
                        line,
                        format!("Row parameter '{name}' can only be used through its methods"),
                    ),
                    None => self.error(line, format!("Undefined variable '{name}'")),
                }
            }
            Expr::Field { caption, .. } => self.require_row(line, caption),
            Expr::Unary { operand, .. } => self.check_expr(operand),
            Expr::Binary { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
            Expr::Call { name, args, .. } => {
                for arg in args {
                    self.check_expr(arg);
                }
                self.check_call(line, name, args.len());
            }
            Expr::Method {
                receiver,
                method,
                args,
                ..
            } => {
                for arg in args {
                    self.check_expr(arg);
                }
                self.check_method(line, receiver, method, args.len());
            }
        }
    }

    fn check_call(&mut self, line: u32, name: &str, count: usize) {
        let Some(builtin) = builtins::lookup(name) else {
            self.error(line, format!("Unknown function '{name}'"));
            return;
        };
        if let Some(module) = builtin.module {
            if !self.definition.imports.iter().any(|i| i == module) {
                self.error(
                    line,
                    format!("Function '{name}' requires import '{module}'"),
                );
            }
        }
        if !builtin.accepts(count) {
            self.error(
                line,
                format!(
                    "Function '{name}' expects {} arguments, got {count}",
                    builtin.arity()
                ),
            );
        }
    }

    fn check_method(&mut self, line: u32, receiver: &Expr, method: &str, count: usize) {
        let is_row = matches!(
            receiver,
            Expr::Variable { name, .. }
                if !self.is_local(name) && self.parameter_kind(name) == Some(ParameterKind::Row)
        );
        if !is_row {
            self.check_expr(receiver);
            self.error(line, "Methods can only be called on row parameters");
            return;
        }
        match ROW_METHODS.iter().find(|(name, _)| *name == method) {
            None => self.error(line, format!("Unknown method '{method}'")),
            Some((_, expected)) if *expected != count => self.error(
                line,
                format!("Method '{method}' expects {expected} arguments, got {count}"),
            ),
            Some(_) => {}
        }
    }
}
