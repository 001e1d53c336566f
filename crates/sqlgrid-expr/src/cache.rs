//! Content-addressed cache of compiled scripts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::compiled::CompiledScript;
use crate::error::Result;
use crate::script::ScriptDefinition;

/// Compiled scripts keyed by [`ScriptDefinition::content_hash`].
///
/// Compilation happens under the lock, so concurrent requests for the
/// same definition compile it once. Failed compilations are not cached.
#[derive(Debug, Default)]
pub struct ScriptCache {
    entries: Mutex<HashMap<String, Arc<CompiledScript>>>,
    compiles: AtomicUsize,
}

impl ScriptCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached script for this definition, compiling it on a
    /// miss.
    ///
    /// # Errors
    ///
    /// Returns the compile error of a definition that does not compile.
    pub fn get_or_compile(&self, definition: &ScriptDefinition) -> Result<Arc<CompiledScript>> {
        let hash = definition.content_hash();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(script) = entries.get(&hash) {
            return Ok(Arc::clone(script));
        }

        self.compiles.fetch_add(1, Ordering::Relaxed);
        let script = Arc::new(CompiledScript::compile(definition.clone())?);
        debug!(hash = %hash, cached = entries.len() + 1, "Cached compiled script");
        entries.insert(hash, Arc::clone(&script));
        Ok(script)
    }

    /// Number of compilations attempted, successful or not.
    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
