//! `<#caption#>` parameters embedded in statement text.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{GridError, Result};
use crate::provider::Dialect;
use crate::resolve::ColumnProjection;
use crate::row::Row;
use crate::synth::{BoundParameter, SynthesizedStatement};

static PARAMETER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<#(.*?)#>").expect("valid parameter regex"));

/// Distinct parameter names in order of first appearance.
#[must_use]
pub fn parameter_names(script: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for capture in PARAMETER.captures_iter(script) {
        let name = &capture[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Parameter markup for a caption.
#[must_use]
pub fn parameter_markup(name: &str) -> String {
    format!("<#{name}#>")
}

/// Row and projections that supply parameter values.
#[derive(Debug, Clone, Copy)]
pub struct ParameterSource<'a> {
    /// Projections searched by caption.
    pub columns: &'a [ColumnProjection],
    /// Row holding the values by internal field name.
    pub row: &'a Row,
}

/// Replaces every `<#caption#>` with a provider placeholder and binds the
/// row value of the projection with that caption.
///
/// Each distinct name gets its own parameter index, reused for repeated
/// occurrences. Without a source the text is passed through unchanged.
///
/// # Errors
///
/// Returns [`GridError::ParameterNotFound`] before binding anything if a
/// name matches no caption.
pub fn bind_parameters(
    dialect: &dyn Dialect,
    script: &str,
    source: Option<ParameterSource<'_>>,
) -> Result<SynthesizedStatement> {
    let Some(source) = source else {
        return Ok(SynthesizedStatement::new(script));
    };

    let names = parameter_names(script);
    let columns = names
        .iter()
        .map(|name| {
            source
                .columns
                .iter()
                .find(|c| &c.caption == name)
                .ok_or_else(|| GridError::ParameterNotFound(name.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sql = script.to_string();
    let mut params = Vec::with_capacity(names.len());
    for (index, (name, column)) in names.iter().zip(columns).enumerate() {
        let value = dialect.convert_to_storage(
            source.row.value(&column.internal_field_name),
            column.value_type,
        )?;
        sql = sql.replace(&parameter_markup(name), &dialect.placeholder(index));
        params.push(BoundParameter::new(index, value));
    }

    Ok(SynthesizedStatement { sql, params })
}
