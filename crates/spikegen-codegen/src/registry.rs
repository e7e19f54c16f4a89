//! Target registry.
//!
//! Targets are registered values keyed by id. The default target id comes
//! from [`Preferences`]; it is resolved only when a request names none.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::codeobject::{CodeObject, GeneratedCode};
use crate::error::{CodegenError, Result};
use crate::language::Language;
use crate::preferences::Preferences;
use crate::runtime::RuntimeTarget;
use crate::template::Templater;

/// A code generation backend: a language, its templates, and the kind of
/// code object it produces.
pub trait Target: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn language(&self) -> &dyn Language;

    fn templater(&self) -> &Templater;

    /// Wrap generated code in this target's code object.
    fn instantiate(&self, generated: GeneratedCode) -> Result<Box<dyn CodeObject>>;
}

/// Registered targets plus the preferences requests are generated under.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: IndexMap<String, Arc<dyn Target>>,
    preferences: Preferences,
}

impl TargetRegistry {
    /// An empty registry with default preferences.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_preferences(preferences: Preferences) -> Self {
        Self {
            targets: IndexMap::new(),
            preferences,
        }
    }

    /// A registry with the in-process `runtime` target registered.
    pub fn with_builtin_targets(preferences: Preferences) -> Result<Self> {
        let mut registry = Self::from_preferences(preferences);
        registry.register(Arc::new(RuntimeTarget::new()?));
        Ok(registry)
    }

    /// Register `target`, replacing any target with the same id.
    pub fn register(&mut self, target: Arc<dyn Target>) -> Option<Arc<dyn Target>> {
        let id = target.id().to_string();
        let previous = self.targets.insert(id.clone(), target);
        if previous.is_some() {
            debug!(target_id = %id, "replaced registered target");
        } else {
            debug!(target_id = %id, "registered target");
        }
        previous
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Target>> {
        self.targets.get(id).cloned().ok_or_else(|| {
            let mut known: Vec<String> = self.targets.keys().cloned().collect();
            known.sort();
            CodegenError::UnknownTarget {
                id: id.to_string(),
                known,
            }
        })
    }

    /// The target named by the `codegen.target` preference.
    pub fn default_target(&self) -> Result<Arc<dyn Target>> {
        self.resolve(&self.preferences.codegen.target)
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Registered ids, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codeobject::InvokeOutcome;
    use crate::languages::ReferenceLanguage;

    #[derive(Debug, Default)]
    struct Dummy {
        id: &'static str,
        templater: Templater,
    }

    #[derive(Debug)]
    struct DummyObject(GeneratedCode);

    impl CodeObject for DummyObject {
        fn generated(&self) -> &GeneratedCode {
            &self.0
        }

        fn invoke(&mut self) -> Result<InvokeOutcome> {
            Ok(InvokeOutcome::default())
        }
    }

    impl Target for Dummy {
        fn id(&self) -> &str {
            self.id
        }

        fn language(&self) -> &dyn Language {
            &ReferenceLanguage
        }

        fn templater(&self) -> &Templater {
            &self.templater
        }

        fn instantiate(&self, generated: GeneratedCode) -> Result<Box<dyn CodeObject>> {
            Ok(Box::new(DummyObject(generated)))
        }
    }

    fn dummy(id: &'static str) -> Arc<dyn Target> {
        Arc::new(Dummy {
            id,
            ..Dummy::default()
        })
    }

    #[test]
    fn unknown_id_lists_sorted_ids() {
        let mut registry = TargetRegistry::new();
        registry.register(dummy("runtime"));
        registry.register(dummy("cpp_standalone"));
        registry.register(dummy("android_standalone"));

        let err = registry.resolve("quantum").unwrap_err();
        match err {
            CodegenError::UnknownTarget { id, known } => {
                assert_eq!(id, "quantum");
                assert_eq!(known, vec!["android_standalone", "cpp_standalone", "runtime"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = TargetRegistry::new();
        assert!(registry.register(dummy("runtime")).is_none());
        assert!(registry.register(dummy("runtime")).is_some());
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["runtime"]);
    }

    #[test]
    fn default_target_follows_preferences() {
        let mut prefs = Preferences::default();
        prefs.codegen.target = "cpp_standalone".to_string();
        let mut registry = TargetRegistry::from_preferences(prefs);
        assert!(matches!(
            registry.default_target(),
            Err(CodegenError::UnknownTarget { .. })
        ));
        registry.register(dummy("cpp_standalone"));
        assert_eq!(registry.default_target().unwrap().id(), "cpp_standalone");
    }

    #[test]
    fn builtin_registry_has_runtime() {
        let registry = TargetRegistry::with_builtin_targets(Preferences::default()).unwrap();
        assert_eq!(registry.default_target().unwrap().id(), "runtime");
    }
}
