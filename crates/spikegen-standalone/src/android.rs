//! Android standalone device: RenderScript kernels driven from Java.
//!
//! Writes `renderscript.rs` (every kernel plus the storage pointers),
//! `Simulation.java` (arrays, allocations, bindings and the time loop),
//! `sources.txt` and a `makefile` that installs both into an app tree.
//!
//! Code object templates must declare `rs`, `java_declarations`,
//! `java_setup` and `java_step` sections.

use std::sync::Arc;

use spikegen_codegen::language::join_lines;
use spikegen_codegen::languages::JavaLanguage;
use spikegen_codegen::{GeneratedCode, Keywords, Language, Preferences, Templater};
use spikegen_core::{NumericType, Scalar};

use crate::cpp::render;
use crate::error::Result;
use crate::project::{
    merged_keyword_lines, require_section, BuildOptions, CodeObjectStore, Device, ProjectArray,
    StandaloneTarget,
};
use crate::writer::ProjectWriter;

/// Id of the Android standalone target.
pub const ANDROID_STANDALONE: &str = "android_standalone";

/// Java package of the generated sources unless overridden.
pub const DEFAULT_PACKAGE: &str = "org.spikegen.simulation";

const TEMPLATES: [(&str, &str); 3] = [
    ("stateupdate", include_str!("../templates/android/stateupdate.tmpl")),
    ("threshold", include_str!("../templates/android/threshold.tmpl")),
    ("reset", include_str!("../templates/android/reset.tmpl")),
];

const RENDERSCRIPT: &str = include_str!("../templates/android/project/renderscript.rs.tmpl");
const SIMULATION: &str = include_str!("../templates/android/project/Simulation.java.tmpl");
const MAKEFILE: &str = include_str!("../templates/android/project/makefile.tmpl");

const SOURCES: [&str; 2] = ["Simulation.java", "renderscript.rs"];

#[derive(Debug)]
pub struct AndroidDevice {
    store: Arc<CodeObjectStore>,
    language: JavaLanguage,
    package: String,
    make_command: String,
}

impl AndroidDevice {
    pub fn new(preferences: &Preferences) -> Self {
        Self {
            store: Arc::new(CodeObjectStore::new()),
            language: JavaLanguage::from_preferences(&preferences.java),
            package: DEFAULT_PACKAGE.to_string(),
            make_command: preferences.standalone.make_command.clone(),
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// The target whose code objects this device builds.
    pub fn target(&self) -> Result<StandaloneTarget> {
        Ok(StandaloneTarget::new(
            ANDROID_STANDALONE,
            Box::new(self.language),
            Templater::from_sources(TEMPLATES)?,
            Arc::clone(&self.store),
        ))
    }

    fn array_keywords(&self, arrays: &[ProjectArray]) -> Result<Keywords> {
        let mut rs_arrays = Vec::new();
        let mut java_arrays = Vec::new();
        let mut alloc_decls = Vec::new();
        let mut java_inits = Vec::new();
        let mut alloc_inits = Vec::new();
        let mut bindings = Vec::new();
        let mut copy_back = Vec::new();
        for array in arrays {
            let s = &array.storage_name;
            let java_ty = self.language.java_type(array.dtype);
            rs_arrays.push(format!("{} *{s};", self.language.type_name(array.dtype)?));
            java_arrays.push(format!("{java_ty}[] {s};"));
            alloc_decls.push(format!("Allocation {s}_alloc;"));
            match array.initial.as_ref().filter(|v| !v.is_empty()) {
                Some(values) => {
                    let literals: Vec<String> = values.iter().map(|v| self.java_literal(*v, array.dtype)).collect();
                    java_inits.push(format!("{s} = new {java_ty}[] {{{}}};", literals.join(", ")));
                }
                None => java_inits.push(format!("{s} = new {java_ty}[{}];", array.len)),
            }
            alloc_inits.push(format!(
                "{s}_alloc = Allocation.createSized(mRS, Element.{}(mRS), {});",
                self.language.allocation_element(array.dtype),
                array.len
            ));
            // Allocation has no boolean[] copies.
            if array.dtype != NumericType::Bool {
                alloc_inits.push(format!("{s}_alloc.copyFrom({s});"));
                copy_back.push(format!("{s}_alloc.copyTo({s});"));
            }
            bindings.push(format!("mScript.bind_{s}({s}_alloc);"));
        }

        let mut keywords = Keywords::new();
        keywords.insert("rs_array_declarations".to_string(), join_lines(&rs_arrays));
        keywords.insert("java_array_declarations".to_string(), join_lines(&java_arrays));
        keywords.insert("allocation_declarations".to_string(), join_lines(&alloc_decls));
        keywords.insert("java_array_initialisations".to_string(), join_lines(&java_inits));
        keywords.insert("allocation_initialisations".to_string(), join_lines(&alloc_inits));
        keywords.insert("memory_bindings".to_string(), join_lines(&bindings));
        keywords.insert("copy_back".to_string(), join_lines(&copy_back));
        Ok(keywords)
    }

    /// Java spelling of an element; `long` arrays need the `L` suffix.
    fn java_literal(&self, value: Scalar, dtype: NumericType) -> String {
        let text = self.language.literal(value.cast(dtype));
        match dtype {
            NumericType::Int64 => format!("{text}L"),
            _ => text,
        }
    }
}

impl Device for AndroidDevice {
    fn id(&self) -> &str {
        ANDROID_STANDALONE
    }

    fn store(&self) -> &CodeObjectStore {
        &self.store
    }

    fn make_command(&self) -> &str {
        &self.make_command
    }

    fn write_project(
        &self,
        writer: &mut ProjectWriter,
        objects: &[GeneratedCode],
        arrays: &[ProjectArray],
        options: &BuildOptions,
    ) -> Result<()> {
        let mut kernels = Vec::new();
        let mut declarations = Vec::new();
        let mut setup = Vec::new();
        let mut steps = Vec::new();
        for object in objects {
            kernels.push(require_section(object, "rs")?.trim_end().to_string());
            declarations.push(require_section(object, "java_declarations")?.trim_end().to_string());
            setup.push(require_section(object, "java_setup")?.trim_end().to_string());
            steps.push(require_section(object, "java_step")?.trim_end().to_string());
        }

        let mut keywords = self.array_keywords(arrays)?;
        keywords.insert("package".to_string(), self.package.clone());
        keywords.insert("hashdefine_lines".to_string(), merged_keyword_lines(objects, "hashdefine_lines"));
        keywords.insert(
            "rs_scalar_declarations".to_string(),
            merged_keyword_lines(objects, "rs_scalar_declarations"),
        );
        let mut support_code: Vec<&str> = Vec::new();
        for block in objects.iter().flat_map(|o| &o.support_code) {
            if !support_code.contains(&block.as_str()) {
                support_code.push(block);
            }
        }
        keywords.insert("support_code".to_string(), support_code.join("\n\n"));
        keywords.insert("kernels".to_string(), kernels.join("\n\n"));
        keywords.insert("codeobject_declarations".to_string(), join_lines(&declarations));
        keywords.insert("codeobject_setup".to_string(), join_lines(&setup));
        keywords.insert("step_code".to_string(), join_lines(&steps));
        keywords.insert(
            "time_type".to_string(),
            self.language.java_type(NumericType::Float64).to_string(),
        );
        let time = |x: f64| self.language.literal(Scalar::Float(x));
        keywords.insert("dt".to_string(), time(options.dt));
        keywords.insert("duration".to_string(), time(options.duration));

        writer.write("Simulation.java", &render("Simulation.java", SIMULATION, &keywords)?)?;
        writer.write("renderscript.rs", &render("renderscript.rs", RENDERSCRIPT, &keywords)?)?;

        let mut listing = SOURCES.join("\n");
        listing.push('\n');
        writer.write("sources.txt", &listing)?;
        writer.write("makefile", &render("makefile", MAKEFILE, &keywords)?)?;
        Ok(())
    }
}
