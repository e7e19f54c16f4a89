//! C++ standalone device.
//!
//! Project layout:
//!
//! ```text
//! <project>/
//!   spikelib/        clocks and network support library
//!   objects/<name>.cpp, objects/<name>.h
//!   arrays.cpp, arrays.h
//!   main.cpp
//!   makefile         sources in first-write order
//!   manifest.json
//!   results/         filled by the program with one file per array
//! ```
//!
//! Code object templates must declare `cpp` and `h` sections. Every object
//! exposes `void _run_<name>(double t)`, called once per time step in
//! creation order.

use std::sync::Arc;

use spikegen_codegen::language::join_lines;
use spikegen_codegen::languages::CppLanguage;
use spikegen_codegen::preferences::CppPreferences;
use spikegen_codegen::{GeneratedCode, Keywords, Language, Preferences, Template, Templater};
use spikegen_core::float_repr;

use crate::error::Result;
use crate::project::{
    require_section, BuildOptions, CodeObjectStore, Device, ProjectArray, StandaloneTarget,
};
use crate::writer::ProjectWriter;

/// Id of the C++ standalone target.
pub const CPP_STANDALONE: &str = "cpp_standalone";

const TEMPLATES: [(&str, &str); 3] = [
    ("stateupdate", include_str!("../templates/cpp/stateupdate.tmpl")),
    ("threshold", include_str!("../templates/cpp/threshold.tmpl")),
    ("reset", include_str!("../templates/cpp/reset.tmpl")),
];

const SPIKELIB: [(&str, &str); 4] = [
    ("spikelib/clocks.h", include_str!("../spikelib/clocks.h")),
    ("spikelib/clocks.cpp", include_str!("../spikelib/clocks.cpp")),
    ("spikelib/network.h", include_str!("../spikelib/network.h")),
    ("spikelib/network.cpp", include_str!("../spikelib/network.cpp")),
];

const ARRAYS_H: &str = include_str!("../templates/cpp/project/arrays.h.tmpl");
const ARRAYS_CPP: &str = include_str!("../templates/cpp/project/arrays.cpp.tmpl");
const MAIN_CPP: &str = include_str!("../templates/cpp/project/main.cpp.tmpl");
const MAKEFILE: &str = include_str!("../templates/cpp/project/makefile.tmpl");

/// Assembles `cpp_standalone` code objects into a make-based C++ project.
#[derive(Debug)]
pub struct CppDevice {
    store: Arc<CodeObjectStore>,
    language: CppLanguage,
    prefs: CppPreferences,
    make_command: String,
}

impl CppDevice {
    pub fn new(preferences: &Preferences) -> Self {
        Self {
            store: Arc::new(CodeObjectStore::new()),
            language: CppLanguage::from_preferences(&preferences.cpp),
            prefs: preferences.cpp.clone(),
            make_command: preferences.standalone.make_command.clone(),
        }
    }

    /// The target whose code objects this device builds.
    pub fn target(&self) -> Result<StandaloneTarget> {
        Ok(StandaloneTarget::new(
            CPP_STANDALONE,
            Box::new(self.language.clone()),
            Templater::from_sources(TEMPLATES)?,
            Arc::clone(&self.store),
        ))
    }

    fn array_keywords(&self, arrays: &[ProjectArray]) -> Result<Keywords> {
        let mut externs = Vec::new();
        let mut definitions = Vec::new();
        let mut statics = Vec::new();
        let mut allocations = Vec::new();
        let mut writes = Vec::new();
        let mut deallocations = Vec::new();
        for array in arrays {
            let s = &array.storage_name;
            let ty = self.language.type_name(array.dtype)?;
            let len = array.len;
            externs.push(format!("extern {ty} *{s};"));
            externs.push(format!("extern const int _num{s};"));
            definitions.push(format!("{ty} *{s} = 0;"));
            definitions.push(format!("const int _num{s} = {len};"));
            allocations.push(format!("{s} = new {ty}[{len}]();"));
            if let Some(values) = array.initial.as_ref().filter(|v| !v.is_empty()) {
                let literals: Vec<String> = values
                    .iter()
                    .map(|v| self.language.literal(v.cast(array.dtype)))
                    .collect();
                statics.push(format!("static const {ty} _static{s}[{len}] = {{{}}};", literals.join(", ")));
                allocations.push(format!("for (int i = 0; i < {len}; i++) {s}[i] = _static{s}[i];"));
            }
            writes.push(format!(
                "{{ std::ofstream out(\"results/{s}.txt\"); for (int i = 0; i < _num{s}; i++) out << {s}[i] << \"\\n\"; }}"
            ));
            deallocations.push(format!("delete[] {s};"));
            deallocations.push(format!("{s} = 0;"));
        }

        let mut keywords = Keywords::new();
        keywords.insert("array_externs".to_string(), join_lines(&externs));
        keywords.insert("array_definitions".to_string(), join_lines(&definitions));
        keywords.insert("static_arrays".to_string(), join_lines(&statics));
        keywords.insert("array_allocations".to_string(), join_lines(&allocations));
        keywords.insert("array_writes".to_string(), join_lines(&writes));
        keywords.insert("array_deallocations".to_string(), join_lines(&deallocations));
        Ok(keywords)
    }
}

impl Device for CppDevice {
    fn id(&self) -> &str {
        CPP_STANDALONE
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
        for (path, text) in SPIKELIB {
            writer.write(path, text)?;
        }

        let mut includes = Vec::new();
        let mut additions = Vec::new();
        for object in objects {
            let source = require_section(object, "cpp")?;
            let header = require_section(object, "h")?;
            writer.write(&format!("objects/{}.cpp", object.name), source)?;
            writer.write(&format!("objects/{}.h", object.name), header)?;
            includes.push(format!("#include \"objects/{}.h\"", object.name));
            additions.push(format!("net.add(_run_{});", object.name));
        }

        let keywords = self.array_keywords(arrays)?;
        writer.write("arrays.h", &render("arrays.h", ARRAYS_H, &keywords)?)?;
        writer.write("arrays.cpp", &render("arrays.cpp", ARRAYS_CPP, &keywords)?)?;

        let mut keywords = Keywords::new();
        keywords.insert("object_includes".to_string(), join_lines(&includes));
        keywords.insert("network_additions".to_string(), join_lines(&additions));
        keywords.insert("dt".to_string(), float_repr(options.dt));
        keywords.insert("duration".to_string(), float_repr(options.duration));
        writer.write("main.cpp", &render("main.cpp", MAIN_CPP, &keywords)?)?;
        writer.create_dir("results")?;

        let mut keywords = Keywords::new();
        keywords.insert("compiler".to_string(), self.prefs.compiler.clone());
        keywords.insert("compile_flags".to_string(), self.prefs.extra_compile_args.join(" "));
        keywords.insert("sources".to_string(), writer.sources("cpp").join(" "));
        writer.write("makefile", &render("makefile", MAKEFILE, &keywords)?)?;
        Ok(())
    }
}

/// Render a single-section project template.
pub(crate) fn render(name: &str, text: &str, keywords: &Keywords) -> Result<String> {
    Ok(Template::parse(name, text)?.render(keywords)?.to_string())
}
