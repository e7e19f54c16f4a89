//! Shared machinery for standalone devices.
//!
//! A standalone target never runs code in-process. Each code object it
//! creates is recorded in a [`CodeObjectStore`] shared with its [`Device`],
//! and [`Device::build`] later turns everything recorded into a project on
//! disk, optionally driving the external toolchain over it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spikegen_codegen::{CodeObject, CodegenError, GeneratedCode, InvokeOutcome, Language, Target, Templater};
use spikegen_core::{NumericType, Scalar};
use tracing::{info, warn};

use crate::error::{Result, StandaloneError};
use crate::writer::ProjectWriter;

/// File name of the JSON manifest written into every project.
pub const MANIFEST: &str = "manifest.json";

/// Code objects recorded by a standalone target, keyed by name.
#[derive(Debug, Default)]
pub struct CodeObjectStore {
    objects: Mutex<IndexMap<String, GeneratedCode>>,
}

impl CodeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `generated`; a later object with the same name replaces it in place.
    pub fn record(&self, generated: GeneratedCode) {
        self.lock().insert(generated.name.clone(), generated);
    }

    /// Recorded objects, in first-recorded order.
    pub fn snapshot(&self) -> Vec<GeneratedCode> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, GeneratedCode>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A target whose code objects are built, not invoked.
pub struct StandaloneTarget {
    id: &'static str,
    language: Box<dyn Language>,
    templater: Templater,
    store: Arc<CodeObjectStore>,
}

impl StandaloneTarget {
    pub fn new(
        id: &'static str,
        language: Box<dyn Language>,
        templater: Templater,
        store: Arc<CodeObjectStore>,
    ) -> Self {
        Self {
            id,
            language,
            templater,
            store,
        }
    }
}

impl fmt::Debug for StandaloneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandaloneTarget")
            .field("id", &self.id)
            .field("language", &self.language.id())
            .field("templates", &self.templater.names().collect::<Vec<_>>())
            .field("recorded", &self.store.len())
            .finish()
    }
}

impl Target for StandaloneTarget {
    fn id(&self) -> &str {
        self.id
    }

    fn language(&self) -> &dyn Language {
        self.language.as_ref()
    }

    fn templater(&self) -> &Templater {
        &self.templater
    }

    fn instantiate(&self, generated: GeneratedCode) -> spikegen_codegen::Result<Box<dyn CodeObject>> {
        self.store.record(generated.clone());
        Ok(Box::new(StandaloneCodeObject { generated }))
    }
}

/// Code object of a standalone target. Invoking it is an error.
#[derive(Debug)]
pub struct StandaloneCodeObject {
    generated: GeneratedCode,
}

impl CodeObject for StandaloneCodeObject {
    fn generated(&self) -> &GeneratedCode {
        &self.generated
    }

    fn invoke(&mut self) -> spikegen_codegen::Result<InvokeOutcome> {
        Err(CodegenError::NotExecutable {
            target: self.generated.target.clone(),
        })
    }
}

/// What [`Device::build`] should do.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub project_dir: PathBuf,
    /// Run the make command after writing the project.
    pub compile: bool,
    /// Run the built program (`make run`); implies `compile`.
    pub run: bool,
    /// Simulated time, in seconds.
    pub duration: f64,
    /// Time step, in seconds.
    pub dt: f64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("output"),
            compile: true,
            run: false,
            duration: 0.1,
            dt: 1e-4,
        }
    }
}

impl BuildOptions {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }

    /// Write the project only.
    pub fn write_only(mut self) -> Self {
        self.compile = false;
        self.run = false;
        self
    }

    pub fn with_run(mut self) -> Self {
        self.compile = true;
        self.run = true;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(StandaloneError::InvalidOptions {
                detail: format!("dt must be positive, got {}", self.dt),
            });
        }
        if !(self.duration.is_finite() && self.duration >= 0.0) {
            return Err(StandaloneError::InvalidOptions {
                detail: format!("duration must be non-negative, got {}", self.duration),
            });
        }
        Ok(())
    }
}

/// Captured result of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    /// The command line, for reporting.
    pub command: String,
    /// Exit code; `None` if the tool could not be started or was killed.
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutcome {
    /// Run `program args..` in `dir`. Failing to start the tool is reported
    /// in the outcome, not as an error.
    pub fn run(program: &str, args: &[&str], dir: &Path) -> Self {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        info!(%command, dir = %dir.display(), "running tool");
        let outcome = match Command::new(program).args(args).current_dir(dir).output() {
            Ok(output) => ToolOutcome {
                command,
                status: output.status.code(),
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => ToolOutcome {
                command,
                status: None,
                success: false,
                stdout: String::new(),
                stderr: format!("failed to invoke {program}: {e}"),
            },
        };
        if outcome.success {
            info!(command = %outcome.command, "tool succeeded");
        } else {
            warn!(command = %outcome.command, status = ?outcome.status, stderr = %outcome.stderr, "tool failed");
        }
        outcome
    }
}

/// What a build produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildResult {
    pub project_dir: PathBuf,
    /// Files (re)written by this build, relative to the project dir.
    pub files_written: Vec<String>,
    /// Files left alone because their content was already current.
    pub files_unchanged: Vec<String>,
    pub manifest: ProjectManifest,
    pub compile: Option<ToolOutcome>,
    pub run: Option<ToolOutcome>,
}

impl BuildResult {
    /// Whether every tool that ran succeeded.
    pub fn succeeded(&self) -> bool {
        self.compile.iter().chain(self.run.iter()).all(|o| o.success)
    }
}

/// JSON summary of a written project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub device: String,
    pub codeobjects: Vec<ManifestCodeObject>,
    pub arrays: Vec<ManifestArray>,
    /// Every file the device wrote, in first-write order.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCodeObject {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestArray {
    pub storage_name: String,
    pub dtype: NumericType,
    pub len: usize,
}

/// One storage array of the whole program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectArray {
    pub storage_name: String,
    pub dtype: NumericType,
    pub len: usize,
    /// Values to start from, when the array has storage attached.
    pub initial: Option<Vec<Scalar>>,
}

/// Every storage array declared by `objects`, deduplicated by storage name
/// in first-seen order.
pub fn collect_arrays(objects: &[GeneratedCode]) -> Result<Vec<ProjectArray>> {
    let mut arrays: IndexMap<String, ProjectArray> = IndexMap::new();
    for object in objects {
        for (_, array) in object.variables.arrays() {
            let len = array.current_len();
            if let Some(existing) = arrays.get(&array.storage_name) {
                if existing.dtype != array.dtype || existing.len != len {
                    return Err(StandaloneError::ConflictingArray {
                        storage_name: array.storage_name.clone(),
                    });
                }
                continue;
            }
            let initial = array.data.as_ref().map(|handle| {
                let data = handle.read();
                (0..data.len()).filter_map(|i| data.get(i)).collect::<Vec<_>>()
            });
            arrays.insert(
                array.storage_name.clone(),
                ProjectArray {
                    storage_name: array.storage_name.clone(),
                    dtype: array.dtype,
                    len,
                    initial,
                },
            );
        }
    }
    Ok(arrays.into_values().collect())
}

/// The section `section` of `object`'s artifact.
pub fn require_section<'a>(object: &'a GeneratedCode, section: &str) -> Result<&'a str> {
    object
        .artifact
        .section(section)
        .ok_or_else(|| StandaloneError::MissingSection {
            codeobject: object.name.clone(),
            section: section.to_string(),
        })
}

/// A standalone project backend.
pub trait Device: Send + Sync + fmt::Debug {
    /// Id of the target feeding this device.
    fn id(&self) -> &str;

    fn store(&self) -> &CodeObjectStore;

    /// Make invocation used for `compile` and `run`, e.g. `make -j4`.
    fn make_command(&self) -> &str;

    /// Write every project file except the manifest.
    fn write_project(
        &self,
        writer: &mut ProjectWriter,
        objects: &[GeneratedCode],
        arrays: &[ProjectArray],
        options: &BuildOptions,
    ) -> Result<()>;

    /// Write the project for everything recorded so far, then compile and
    /// run it as `options` asks.
    fn build(&self, options: &BuildOptions) -> Result<BuildResult> {
        options.validate()?;
        let mut make = self.make_command().split_whitespace();
        let program = make.next().ok_or_else(|| StandaloneError::InvalidOptions {
            detail: "make command is empty".to_string(),
        })?;
        let make_args: Vec<&str> = make.collect();

        let objects = self.store().snapshot();
        let arrays = collect_arrays(&objects)?;
        info!(
            device = self.id(),
            dir = %options.project_dir.display(),
            codeobjects = objects.len(),
            arrays = arrays.len(),
            "writing project"
        );

        let mut writer = ProjectWriter::new(&options.project_dir)?;
        self.write_project(&mut writer, &objects, &arrays, options)?;
        let manifest = ProjectManifest {
            device: self.id().to_string(),
            codeobjects: objects
                .iter()
                .map(|o| ManifestCodeObject {
                    name: o.name.clone(),
                    template: o.template.clone(),
                })
                .collect(),
            arrays: arrays
                .iter()
                .map(|a| ManifestArray {
                    storage_name: a.storage_name.clone(),
                    dtype: a.dtype,
                    len: a.len,
                })
                .collect(),
            files: writer.files().map(|(name, _)| name.to_string()).collect(),
        };
        let mut json = serde_json::to_string_pretty(&manifest)?;
        json.push('\n');
        writer.write(MANIFEST, &json)?;

        let files_written = writer.written();
        let files_unchanged = writer.unchanged();
        info!(
            device = self.id(),
            written = files_written.len(),
            unchanged = files_unchanged.len(),
            "project written"
        );

        let mut result = BuildResult {
            project_dir: options.project_dir.clone(),
            files_written,
            files_unchanged,
            manifest,
            compile: None,
            run: None,
        };
        if options.compile || options.run {
            let compiled = ToolOutcome::run(program, &make_args, &options.project_dir);
            let compiled_ok = compiled.success;
            result.compile = Some(compiled);
            if options.run && compiled_ok {
                let mut run_args = make_args.clone();
                run_args.push("run");
                result.run = Some(ToolOutcome::run(program, &run_args, &options.project_dir));
            }
        }
        Ok(result)
    }
}

/// Lines of every `keyword` value across `objects`, deduplicated in first-seen order.
pub(crate) fn merged_keyword_lines(objects: &[GeneratedCode], keyword: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for object in objects {
        if let Some(value) = object.keywords.get(keyword) {
            for line in value.lines().filter(|l| !l.trim().is_empty()) {
                if !lines.contains(&line) {
                    lines.push(line);
                }
            }
        }
    }
    lines.join("\n")
}
