//! Compiled scripts.

use tracing::debug;

use crate::ast::Program;
use crate::check::check;
use crate::diagnostic::Diagnostic;
use crate::error::{Result, ScriptError};
use crate::interpreter::{Argument, Interpreter};
use crate::parser::Parser;
use crate::script::{ScriptDefinition, ScriptKind};
use crate::value::Value;

/// A script that parsed and passed every check. Immutable, so it can be
/// shared between threads and run concurrently.
#[derive(Debug)]
pub struct CompiledScript {
    definition: ScriptDefinition,
    hash: String,
    program: Program,
    warnings: Vec<Diagnostic>,
}

impl CompiledScript {
    /// Parses and checks a definition.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Compile`] with every diagnostic when at least
    /// one of them is an error. Syntax errors suppress the semantic pass.
    pub fn compile(definition: ScriptDefinition) -> Result<Self> {
        let hash = definition.content_hash();
        let (program, parse_errors) = Parser::new(&definition.source).parse_program();

        let diagnostics: Vec<Diagnostic> = if parse_errors.is_empty() {
            check(&program, &definition)
        } else {
            parse_errors
                .into_iter()
                .map(|e| Diagnostic::error(e.span.line, e.message))
                .collect()
        };

        if diagnostics.iter().any(Diagnostic::is_error) {
            debug!(
                hash = %hash,
                errors = diagnostics.iter().filter(|d| d.is_error()).count(),
                "Script failed to compile"
            );
            return Err(ScriptError::Compile(diagnostics));
        }

        debug!(hash = %hash, warnings = diagnostics.len(), "Compiled script");
        Ok(Self {
            definition,
            hash,
            program,
            warnings: diagnostics,
        })
    }

    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub const fn kind(&self) -> ScriptKind {
        self.definition.kind
    }

    #[must_use]
    pub const fn definition(&self) -> &ScriptDefinition {
        &self.definition
    }

    /// Warnings produced by compilation.
    #[must_use]
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Runs an evaluate script and returns its value.
    ///
    /// # Errors
    ///
    /// Returns an error if the script is an execute script, the arguments
    /// do not match the parameters, or the script fails at runtime.
    pub fn evaluate(&self, args: &mut [Argument<'_>]) -> Result<Value> {
        if self.definition.kind != ScriptKind::Evaluate {
            return Err(ScriptError::WrongKind(self.definition.kind));
        }
        Interpreter::new(&self.definition.parameters, args)?.run(&self.program)
    }

    /// Runs an execute script for its side effects.
    ///
    /// # Errors
    ///
    /// Returns an error if the script is an evaluate script, the arguments
    /// do not match the parameters, or the script fails at runtime.
    pub fn execute(&self, args: &mut [Argument<'_>]) -> Result<()> {
        if self.definition.kind != ScriptKind::Execute {
            return Err(ScriptError::WrongKind(self.definition.kind));
        }
        Interpreter::new(&self.definition.parameters, args)?.run(&self.program)?;
        Ok(())
    }
}
