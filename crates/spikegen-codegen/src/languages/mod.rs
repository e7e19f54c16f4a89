//! Built-in languages.

mod cpp;
mod java;
mod reference;

pub use cpp::{pointer_name, CppLanguage};
pub use java::JavaLanguage;
pub use reference::ReferenceLanguage;

/// Id of the reference text language.
pub const REFERENCE: &str = "reference";
/// Id of the C++ language.
pub const CPP: &str = "cpp";
/// Id of the Java + RenderScript language.
pub const JAVA: &str = "java";
