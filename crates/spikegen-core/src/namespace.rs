//! Flat name → value table consulted while rendering.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dtype::{NumericType, Scalar};
use crate::error::{CoreError, Result};
use crate::function::Function;
use crate::variable::{Variable, VariableTable};

/// Storage binding for an array, keyed by its storage name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayBinding {
    pub storage_name: String,
    pub dtype: NumericType,
    pub len: usize,
}

/// What a free name resolves to.
#[derive(Debug, Clone)]
pub enum NamespaceEntry {
    Literal(Scalar),
    ArrayBinding(ArrayBinding),
    FunctionRef(Function),
}

impl NamespaceEntry {
    pub fn as_literal(&self) -> Option<Scalar> {
        match self {
            NamespaceEntry::Literal(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            NamespaceEntry::FunctionRef(f) => Some(f),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            NamespaceEntry::Literal(_) => "literal",
            NamespaceEntry::ArrayBinding(_) => "array binding",
            NamespaceEntry::FunctionRef(_) => "function",
        }
    }
}

impl From<Scalar> for NamespaceEntry {
    fn from(value: Scalar) -> Self {
        NamespaceEntry::Literal(value)
    }
}

impl From<Function> for NamespaceEntry {
    fn from(f: Function) -> Self {
        NamespaceEntry::FunctionRef(f)
    }
}

/// What to do when a function's private namespace names an existing entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Log a warning and keep the entry already present.
    #[default]
    WarnKeepExisting,
    /// Replace the existing entry.
    Overwrite,
    /// Fail with [`CoreError::NamespaceCollision`].
    Error,
}

/// Ordered flat namespace.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: IndexMap<String, NamespaceEntry>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, entry: impl Into<NamespaceEntry>) -> Self {
        self.insert(name, entry.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: NamespaceEntry) -> Option<NamespaceEntry> {
        self.entries.insert(name.into(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&NamespaceEntry> {
        self.entries.get(name)
    }

    /// Remove `name`, keeping the order of the remaining entries.
    pub fn remove(&mut self, name: &str) -> Option<NamespaceEntry> {
        self.entries.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NamespaceEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The function registered under `name`, if any.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.get(name).and_then(NamespaceEntry::as_function)
    }

    /// Names of all function entries, in order.
    pub fn function_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| matches!(e, NamespaceEntry::FunctionRef(_)))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge the private namespace of `function` into this one.
    ///
    /// Returns the names that were added or replaced.
    pub fn merge_function_namespace(
        &mut self,
        function: &str,
        private: &Namespace,
        policy: CollisionPolicy,
    ) -> Result<Vec<String>> {
        let mut merged = Vec::new();
        for (name, entry) in private.iter() {
            if let Some(existing) = self.get(name) {
                match policy {
                    CollisionPolicy::WarnKeepExisting => {
                        warn!(
                            entry = %name,
                            %function,
                            existing = existing.kind(),
                            "namespace already contains name; keeping existing entry"
                        );
                        continue;
                    }
                    CollisionPolicy::Overwrite => {
                        debug!(entry = %name, %function, "overwriting namespace entry");
                    }
                    CollisionPolicy::Error => {
                        return Err(CoreError::NamespaceCollision {
                            name: name.to_string(),
                            function: function.to_string(),
                        });
                    }
                }
            }
            self.insert(name, entry.clone());
            merged.push(name.to_string());
        }
        Ok(merged)
    }
}

impl<N: Into<String>, E: Into<NamespaceEntry>> FromIterator<(N, E)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (N, E)>>(iter: I) -> Self {
        let mut ns = Namespace::new();
        for (name, entry) in iter {
            ns.insert(name, entry.into());
        }
        ns
    }
}

/// Flatten the caller namespace and the variable table into one namespace.
///
/// Caller entries come first; every array variable then contributes an
/// [`ArrayBinding`] under its storage name (once per storage name).
pub fn prepare_namespace(caller: &Namespace, variables: &VariableTable) -> Namespace {
    let mut ns = caller.clone();
    for (_, var) in variables.iter() {
        if let Variable::Array(array) = var {
            if ns.contains(&array.storage_name) {
                continue;
            }
            ns.insert(
                array.storage_name.clone(),
                NamespaceEntry::ArrayBinding(ArrayBinding {
                    storage_name: array.storage_name.clone(),
                    dtype: array.dtype,
                    len: array.current_len(),
                }),
            );
        }
    }
    ns
}
