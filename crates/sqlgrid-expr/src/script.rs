//! Script definitions and content hashing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a script produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptKind {
    /// Returns a value.
    Evaluate,
    /// Runs for its side effects on row parameters.
    Execute,
}

impl ScriptKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Evaluate => "evaluate",
            Self::Execute => "execute",
        }
    }
}

/// How a parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterKind {
    /// A row, read with `p.value("Caption")` and written with `p.set(...)`.
    Row,
    /// A plain value.
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptParameter {
    pub name: String,
    pub kind: ParameterKind,
}

/// Everything that determines a compiled script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDefinition {
    pub kind: ScriptKind,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ScriptParameter>,
    pub source: String,
}

impl ScriptDefinition {
    #[must_use]
    pub fn new(kind: ScriptKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            imports: Vec::new(),
            parameters: Vec::new(),
            source: source.into(),
        }
    }

    /// A value-returning script.
    #[must_use]
    pub fn evaluate(source: impl Into<String>) -> Self {
        Self::new(ScriptKind::Evaluate, source)
    }

    /// A side-effect script.
    #[must_use]
    pub fn execute(source: impl Into<String>) -> Self {
        Self::new(ScriptKind::Execute, source)
    }

    #[must_use]
    pub fn import(mut self, module: impl Into<String>) -> Self {
        self.imports.push(module.into());
        self
    }

    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.push(ScriptParameter {
            name: name.into(),
            kind,
        });
        self
    }

    #[must_use]
    pub fn row_parameter(self, name: impl Into<String>) -> Self {
        self.parameter(name, ParameterKind::Row)
    }

    /// Hex SHA-256 over kind, imports, parameters and source. Two
    /// definitions share a hash exactly when they compile to the same
    /// script.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update([0]);
        for import in &self.imports {
            hasher.update(import.as_bytes());
            hasher.update([0]);
        }
        hasher.update([1]);
        for parameter in &self.parameters {
            hasher.update(parameter.name.as_bytes());
            hasher.update(match parameter.kind {
                ParameterKind::Row => b":row\0",
                ParameterKind::Value => b":val\0",
            });
        }
        hasher.update([1]);
        hasher.update(self.source.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let base = ScriptDefinition::evaluate("[A] + 1").row_parameter("eval");
        assert_eq!(base.content_hash(), base.clone().content_hash());
        assert_eq!(base.content_hash().len(), 64);

        let other_source = ScriptDefinition::evaluate("[A] + 2").row_parameter("eval");
        let other_kind = ScriptDefinition::execute("[A] + 1").row_parameter("eval");
        let other_import = base.clone().import("math");
        let other_param = ScriptDefinition::evaluate("[A] + 1").row_parameter("row");
        for other in [other_source, other_kind, other_import, other_param] {
            assert_ne!(base.content_hash(), other.content_hash());
        }
    }

    #[test]
    fn test_hash_separates_imports_from_source() {
        let a = ScriptDefinition::evaluate("x").import("math");
        let b = ScriptDefinition::evaluate("mathx");
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
