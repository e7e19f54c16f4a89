//! Standalone project devices for spikegen.
//!
//! A standalone target turns each code object into source text instead of
//! running it. Its [`Device`] collects those objects and writes a complete
//! project for an external toolchain:
//!
//! - [`cpp`]: `cpp_standalone`, a make-based C++ program
//! - [`android`]: `android_standalone`, RenderScript kernels driven from Java
//!
//! ```no_run
//! use spikegen_codegen::{create_codeobject, CodeObjectRequest, Preferences, TargetRegistry};
//! use spikegen_core::{NumericType, Variable, VariableTable};
//! use spikegen_standalone::{register_targets, BuildOptions, Device};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = TargetRegistry::with_builtin_targets(Preferences::default())?;
//! let devices = register_targets(&mut registry)?;
//! let request = CodeObjectRequest::new("neurons_stateupdate", "stateupdate")
//!     .with_target("cpp_standalone")
//!     .with_variables(
//!         VariableTable::new().with("v", Variable::array("_array_neurons_v", NumericType::Float64, 100)),
//!     )
//!     .with_code("v = v * 0.5");
//! create_codeobject(&registry, request)?;
//! let result = devices.cpp.build(&BuildOptions::new("output"))?;
//! assert!(result.succeeded());
//! # Ok(())
//! # }
//! ```

pub mod android;
pub mod cpp;
pub mod error;
pub mod project;
pub mod writer;

use std::sync::Arc;

use spikegen_codegen::TargetRegistry;
use tracing::debug;

pub use android::{AndroidDevice, ANDROID_STANDALONE};
pub use cpp::{CppDevice, CPP_STANDALONE};
pub use error::{Result, StandaloneError};
pub use project::{
    BuildOptions, BuildResult, CodeObjectStore, Device, ProjectManifest, StandaloneCodeObject, StandaloneTarget,
    ToolOutcome, MANIFEST,
};
pub use writer::{ProjectWriter, WriteStatus};

/// The devices behind the registered standalone targets.
#[derive(Debug, Clone)]
pub struct StandaloneDevices {
    pub cpp: Arc<CppDevice>,
    pub android: Arc<AndroidDevice>,
}

/// Register `cpp_standalone` and `android_standalone` in `registry`,
/// configured from its preferences.
pub fn register_targets(registry: &mut TargetRegistry) -> Result<StandaloneDevices> {
    let preferences = registry.preferences().clone();
    let cpp = Arc::new(CppDevice::new(&preferences));
    let android = Arc::new(AndroidDevice::new(&preferences));
    registry.register(Arc::new(cpp.target()?));
    registry.register(Arc::new(android.target()?));
    debug!(targets = ?registry.ids().collect::<Vec<_>>(), "registered standalone targets");
    Ok(StandaloneDevices { cpp, android })
}
