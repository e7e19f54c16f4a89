//! User-visible functions and their per-language implementations.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::dtype::{NumericType, Scalar};
use crate::namespace::{Namespace, NamespaceEntry};

/// In-process evaluator used by the runtime path.
pub type NativeFn = Arc<dyn Fn(&[Scalar]) -> Scalar + Send + Sync>;

/// How one language spells and supports a function.
#[derive(Debug, Clone, Default)]
pub struct FunctionImplementation {
    /// Name emitted at call sites.
    pub name: String,
    /// Helper definitions emitted once per code object.
    pub support_code: Option<String>,
    /// Preprocessor-style `(name, value)` definitions.
    pub defines: Vec<(String, String)>,
    /// Private names the implementation needs in the code object's namespace.
    pub namespace: Namespace,
}

impl FunctionImplementation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_support_code(mut self, code: impl Into<String>) -> Self {
        self.support_code = Some(code.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }

    pub fn with_namespace_entry(mut self, name: impl Into<String>, entry: NamespaceEntry) -> Self {
        self.namespace.insert(name, entry);
        self
    }
}

/// A named function callable from abstract code.
#[derive(Clone)]
pub struct Function {
    name: String,
    arity: Option<usize>,
    return_type: Option<NumericType>,
    implementations: IndexMap<String, FunctionImplementation>,
    native: Option<NativeFn>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: None,
            return_type: None,
            implementations: IndexMap::new(),
            native: None,
        }
    }

    /// Fix the number of arguments call sites must pass.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Declare the result type; `None` means "same as the arguments".
    pub fn with_return_type(mut self, dtype: NumericType) -> Self {
        self.return_type = Some(dtype);
        self
    }

    /// Add (or replace) the implementation for `language`.
    pub fn with_implementation(
        mut self,
        language: impl Into<String>,
        implementation: FunctionImplementation,
    ) -> Self {
        self.add_implementation(language, implementation);
        self
    }

    pub fn add_implementation(
        &mut self,
        language: impl Into<String>,
        implementation: FunctionImplementation,
    ) {
        self.implementations.insert(language.into(), implementation);
    }

    pub fn with_native(mut self, f: impl Fn(&[Scalar]) -> Scalar + Send + Sync + 'static) -> Self {
        self.native = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn return_type(&self) -> Option<NumericType> {
        self.return_type
    }

    pub fn implementation(&self, language: &str) -> Option<&FunctionImplementation> {
        self.implementations.get(language)
    }

    /// Evaluate in-process, or `None` when no native evaluator exists.
    pub fn call(&self, args: &[Scalar]) -> Option<Scalar> {
        self.native.as_ref().map(|f| f(args))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("return_type", &self.return_type)
            .field("implementations", &self.implementations)
            .field("native", &self.native.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implementations_are_per_language() {
        let f = Function::new("clip")
            .with_arity(3)
            .with_implementation("cpp", FunctionImplementation::new("_clip"))
            .with_implementation("java", FunctionImplementation::new("clamp"));
        assert_eq!(f.implementation("cpp").unwrap().name, "_clip");
        assert_eq!(f.implementation("java").unwrap().name, "clamp");
        assert!(f.implementation("reference").is_none());
    }

    #[test]
    fn native_evaluation() {
        let double = Function::new("double").with_native(|args| Scalar::Float(args[0].as_f64() * 2.0));
        assert_eq!(double.call(&[Scalar::Int(4)]), Some(Scalar::Float(8.0)));
        assert_eq!(Function::new("opaque").call(&[]), None);
    }

    #[test]
    fn implementation_builder() {
        let imp = FunctionImplementation::new("_rand")
            .with_support_code("double _rand(int i);")
            .with_define("_RAND_SEED", "42")
            .with_namespace_entry("_rand_buffer_len", NamespaceEntry::Literal(Scalar::Int(1024)));
        assert_eq!(imp.defines, vec![("_RAND_SEED".to_string(), "42".to_string())]);
        assert!(imp.namespace.contains("_rand_buffer_len"));
    }
}
