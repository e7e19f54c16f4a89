//! Code generation preferences, loaded from TOML.
//!
//! ```toml
//! [codegen]
//! target = "cpp_standalone"
//! keyword-policy = "reject"
//!
//! [cpp]
//! flush-denormals = true
//! extra-compile-args = ["-O3", "-march=native"]
//! ```
//!
//! Every field has a default, so an empty document is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};
use spikegen_core::{CollisionPolicy, NumericType};

use crate::codeobject::KeywordPolicy;
use crate::error::{CodegenError, Result};

/// All code generation preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Preferences {
    pub codegen: CodegenPreferences,
    pub cpp: CppPreferences,
    pub java: JavaPreferences,
    pub standalone: StandalonePreferences,
}

/// `[codegen]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CodegenPreferences {
    /// Target used when a request names none.
    pub target: String,
    /// Type of floating-point locals declared by abstract code.
    pub default_float: NumericType,
    /// Resolution of caller/compiler template keyword collisions.
    pub keyword_policy: KeywordPolicy,
    /// Resolution of function namespace collisions.
    pub collision_policy: CollisionPolicy,
}

impl Default for CodegenPreferences {
    fn default() -> Self {
        Self {
            target: "runtime".to_string(),
            default_float: NumericType::Float64,
            keyword_policy: KeywordPolicy::default(),
            collision_policy: CollisionPolicy::default(),
        }
    }
}

/// `[cpp]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CppPreferences {
    /// Qualifier placed on array pointer aliases; empty disables it.
    pub restrict_keyword: String,
    /// Emit the x86 flush-to-zero preamble.
    pub flush_denormals: bool,
    /// Compiler invoked by standalone builds.
    pub compiler: String,
    pub extra_compile_args: Vec<String>,
    /// Emit index bounds assertions for non-dense iteration.
    pub debug_asserts: bool,
}

impl Default for CppPreferences {
    fn default() -> Self {
        Self {
            restrict_keyword: "__restrict".to_string(),
            flush_denormals: false,
            compiler: "g++".to_string(),
            extra_compile_args: vec!["-O3".to_string()],
            debug_asserts: false,
        }
    }
}

/// `[java]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct JavaPreferences {
    /// Keep `float64` as `double` instead of narrowing it to `float`.
    pub double_precision: bool,
}

/// `[standalone]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StandalonePreferences {
    pub make_command: String,
}

impl Default for StandalonePreferences {
    fn default() -> Self {
        Self {
            make_command: "make".to_string(),
        }
    }
}

impl Preferences {
    /// Parse preferences from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CodegenError::Preferences {
            detail: e.to_string(),
        })
    }

    /// Load preferences from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CodegenError::Preferences {
            detail: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CodegenError::Preferences {
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let prefs = Preferences::from_toml_str("").unwrap();
        assert_eq!(prefs, Preferences::default());
        assert_eq!(prefs.codegen.target, "runtime");
        assert_eq!(prefs.codegen.default_float, NumericType::Float64);
        assert_eq!(prefs.cpp.restrict_keyword, "__restrict");
        assert!(!prefs.java.double_precision);
        assert_eq!(prefs.standalone.make_command, "make");
    }

    #[test]
    fn parse_all_sections() {
        let toml = r#"
[codegen]
target = "cpp_standalone"
default-float = "float32"
keyword-policy = "reject"
collision-policy = "overwrite"

[cpp]
restrict-keyword = ""
flush-denormals = true
compiler = "clang++"
extra-compile-args = ["-O2", "-march=native"]
debug-asserts = true

[java]
double-precision = true

[standalone]
make-command = "gmake"
"#;
        let prefs = Preferences::from_toml_str(toml).unwrap();
        assert_eq!(prefs.codegen.target, "cpp_standalone");
        assert_eq!(prefs.codegen.default_float, NumericType::Float32);
        assert_eq!(prefs.codegen.keyword_policy, KeywordPolicy::Reject);
        assert_eq!(prefs.codegen.collision_policy, CollisionPolicy::Overwrite);
        assert!(prefs.cpp.restrict_keyword.is_empty());
        assert!(prefs.cpp.flush_denormals);
        assert_eq!(prefs.cpp.compiler, "clang++");
        assert_eq!(prefs.cpp.extra_compile_args, vec!["-O2", "-march=native"]);
        assert!(prefs.cpp.debug_asserts);
        assert!(prefs.java.double_precision);
        assert_eq!(prefs.standalone.make_command, "gmake");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let prefs = Preferences::from_toml_str("[cpp]\nflush-denormals = true\n").unwrap();
        assert!(prefs.cpp.flush_denormals);
        assert_eq!(prefs.cpp.compiler, "g++");
        assert_eq!(prefs.codegen.target, "runtime");
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = Preferences::from_toml_str("[codegen]\ndefault-float = \"complex\"\n").unwrap_err();
        assert!(matches!(err, CodegenError::Preferences { .. }));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spikegen.toml");
        let mut prefs = Preferences::default();
        prefs.codegen.target = "android_standalone".into();
        std::fs::write(&path, prefs.to_toml_string().unwrap()).unwrap();
        assert_eq!(Preferences::from_file(&path).unwrap(), prefs);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Preferences::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
