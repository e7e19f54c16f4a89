use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use spikegen_codegen::{
    create_codeobject, CodeObject, CodeObjectRequest, CodegenError, Preferences, TargetRegistry, TemplateError,
};
use spikegen_core::{ArrayData, ArrayHandle, ArrayVariable, NumericType, Scalar, Variable, VariableTable};
use spikegen_standalone::{
    register_targets, BuildOptions, Device, ProjectManifest, StandaloneDevices, StandaloneError, MANIFEST,
};

fn setup(preferences: Preferences) -> (TargetRegistry, StandaloneDevices) {
    let mut registry = TargetRegistry::with_builtin_targets(preferences).unwrap();
    let devices = register_targets(&mut registry).unwrap();
    (registry, devices)
}

fn neuron_variables(prefix: &str, v: &ArrayHandle) -> VariableTable {
    VariableTable::new()
        .with(
            "v",
            Variable::Array(ArrayVariable::new(format!("_array_{prefix}_v"), NumericType::Float64, 0).with_data(v.clone())),
        )
        .with(
            "_spikespace",
            Variable::array(format!("_array_{prefix}__spikespace"), NumericType::Int32, v.len() + 1),
        )
        .with("t", Variable::attribute(NumericType::Float64, || Scalar::Float(0.0)))
}

fn read(dir: &Path, file: &str) -> String {
    fs::read_to_string(dir.join(file)).unwrap()
}

/// Modification time of every regular file below `root`, sorted by path.
fn modification_times(root: &Path) -> Vec<(PathBuf, SystemTime)> {
    let mut times = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let metadata = entry.metadata().unwrap();
            if metadata.is_dir() {
                pending.push(entry.path());
            } else {
                times.push((entry.path(), metadata.modified().unwrap()));
            }
        }
    }
    times.sort();
    times
}

#[test]
fn unknown_target_lists_every_registered_id() {
    let (registry, _devices) = setup(Preferences::default());
    let err = create_codeobject(&registry, CodeObjectRequest::new("lost", "stateupdate").with_target("quantum"))
        .unwrap_err();
    match err {
        CodegenError::UnknownTarget { known, .. } => {
            assert_eq!(known, vec!["android_standalone", "cpp_standalone", "runtime"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn standalone_code_objects_cannot_be_invoked() {
    let (registry, devices) = setup(Preferences::default());
    let v = ArrayHandle::from_f64(vec![0.0; 2]);
    let mut codeobject = create_codeobject(
        &registry,
        CodeObjectRequest::new("inert_stateupdate", "stateupdate")
            .with_target("cpp_standalone")
            .with_variables(neuron_variables("inert", &v))
            .with_code("v = v + 1.0"),
    )
    .unwrap();
    let err = codeobject.invoke().unwrap_err();
    assert!(matches!(err, CodegenError::NotExecutable { ref target } if target == "cpp_standalone"));
    assert_eq!(devices.cpp.store().len(), 1);
    assert!(devices.android.store().is_empty());
}

#[test]
fn cpp_code_objects_render_source_and_header() {
    let (registry, _devices) = setup(Preferences::default());
    let v = ArrayHandle::from_f64(vec![0.0, 1.0, 2.0]);
    let codeobject = create_codeobject(
        &registry,
        CodeObjectRequest::new("rendered_stateupdate", "stateupdate")
            .with_target("cpp_standalone")
            .with_variables(neuron_variables("rendered", &v))
            .with_code("v += t"),
    )
    .unwrap();
    let source = codeobject.artifact().section("cpp").unwrap();
    assert!(source.contains("void _run_rendered_stateupdate(double t)"));
    assert!(source.contains("    double * __restrict _ptr_array_rendered_v = _array_rendered_v;"));
    assert!(source.contains("    const int N = 3;"));
    assert!(source.contains("        double v = _ptr_array_rendered_v[_idx];"));
    assert!(source.contains("        _ptr_array_rendered_v[_idx] = v;"));
    let header = codeobject.artifact().section("h").unwrap();
    assert!(header.contains("void _run_rendered_stateupdate(double t);"));
}

#[test]
fn threshold_requires_a_spikespace_keyword() {
    let (registry, _devices) = setup(Preferences::default());
    let v = ArrayHandle::from_f64(vec![0.0; 2]);
    let err = create_codeobject(
        &registry,
        CodeObjectRequest::new("unspaced_thresholder", "threshold")
            .with_target("cpp_standalone")
            .with_variables(neuron_variables("unspaced", &v))
            .with_code("_cond := v > 1.0"),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CodegenError::Template(TemplateError::MissingSlot { ref slot, .. }) if slot == "spikespace"
    ));
}

fn record_cpp_network(registry: &TargetRegistry, prefix: &str) {
    let v = ArrayHandle::from_f64(vec![0.0, 1.0, 2.0]);
    let spikespace = format!("_array_{prefix}__spikespace");
    let requests = [
        CodeObjectRequest::new(format!("{prefix}_stateupdate"), "stateupdate").with_code("v += 0.1"),
        CodeObjectRequest::new(format!("{prefix}_thresholder"), "threshold")
            .with_code("_cond := v > 1.0")
            .with_keyword("spikespace", spikespace.clone()),
        CodeObjectRequest::new(format!("{prefix}_resetter"), "reset")
            .with_code("v = 0.0")
            .with_keyword("spikespace", spikespace.clone()),
    ];
    for request in requests {
        create_codeobject(
            registry,
            request
                .with_target("cpp_standalone")
                .with_variables(neuron_variables(prefix, &v)),
        )
        .unwrap();
    }
}

#[test]
fn cpp_project_layout() {
    let (registry, devices) = setup(Preferences::default());
    record_cpp_network(&registry, "layout");
    let dir = tempfile::tempdir().unwrap();
    let result = devices
        .cpp
        .build(&BuildOptions::new(dir.path()).write_only().with_duration(0.01))
        .unwrap();
    assert!(result.compile.is_none());
    assert!(result.run.is_none());
    assert!(result.succeeded());
    assert!(result.files_unchanged.is_empty());

    for file in [
        "spikelib/clocks.h",
        "spikelib/network.cpp",
        "objects/layout_stateupdate.cpp",
        "objects/layout_thresholder.h",
        "objects/layout_resetter.cpp",
        "arrays.h",
        "arrays.cpp",
        "main.cpp",
        "makefile",
        MANIFEST,
    ] {
        assert!(dir.path().join(file).is_file(), "missing {file}");
    }
    assert!(dir.path().join("results").is_dir());

    let makefile = read(dir.path(), "makefile");
    assert!(makefile.contains(
        "SRCS = spikelib/clocks.cpp spikelib/network.cpp objects/layout_stateupdate.cpp \
         objects/layout_thresholder.cpp objects/layout_resetter.cpp arrays.cpp main.cpp\n"
    ));
    assert!(makefile.contains("CXX = g++\n"));
    assert!(makefile.contains("CXXFLAGS = -O3 -I.\n"));
    assert!(makefile.contains("\n\t./$(PROGRAM)\n"));

    let main = read(dir.path(), "main.cpp");
    let first = main.find("net.add(_run_layout_stateupdate);").unwrap();
    let second = main.find("net.add(_run_layout_thresholder);").unwrap();
    let third = main.find("net.add(_run_layout_resetter);").unwrap();
    assert!(first < second && second < third);
    assert!(main.contains("#include \"objects/layout_resetter.h\""));
    assert!(main.contains("net.run(defaultclock, 0.01);"));

    let arrays = read(dir.path(), "arrays.cpp");
    assert!(arrays.contains("static const double _static_array_layout_v[3] = {0.0, 1.0, 2.0};"));
    assert!(arrays.contains("    _array_layout__spikespace = new int32_t[4]();"));
    assert!(read(dir.path(), "arrays.h").contains("extern double *_array_layout_v;"));

    let threshold = read(dir.path(), "objects/layout_thresholder.cpp");
    assert!(threshold.contains("            _array_layout__spikespace[_num_spikes++] = _idx;"));
    let reset = read(dir.path(), "objects/layout_resetter.cpp");
    assert!(reset.contains("        const int32_t _idx = _array_layout__spikespace[_index_spikes];"));

    let manifest: ProjectManifest = serde_json::from_str(&read(dir.path(), MANIFEST)).unwrap();
    assert_eq!(manifest, result.manifest);
    assert_eq!(manifest.device, "cpp_standalone");
    let names: Vec<&str> = manifest.codeobjects.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["layout_stateupdate", "layout_thresholder", "layout_resetter"]);
    assert_eq!(manifest.arrays.len(), 2);
    assert_eq!(manifest.files.last().map(String::as_str), Some("makefile"));
}

#[test]
fn rebuilding_an_unchanged_project_rewrites_nothing() {
    let (registry, devices) = setup(Preferences::default());
    record_cpp_network(&registry, "stable");
    let dir = tempfile::tempdir().unwrap();
    let options = BuildOptions::new(dir.path()).write_only();

    let first = devices.cpp.build(&options).unwrap();
    let before = modification_times(dir.path());
    // Coarse filesystem timestamps would hide a rewrite within the same second.
    thread::sleep(Duration::from_millis(1100));

    let second = devices.cpp.build(&options).unwrap();
    assert!(second.files_written.is_empty());
    assert_eq!(second.files_unchanged, first.files_written);
    assert_eq!(modification_times(dir.path()), before);

    let third = devices.cpp.build(&options.clone().with_duration(1.0)).unwrap();
    assert_eq!(third.files_written, vec!["main.cpp"]);
    let after = modification_times(dir.path());
    let changed: Vec<&Path> = before
        .iter()
        .zip(&after)
        .filter(|(old, new)| old.1 != new.1)
        .map(|(old, _)| old.0.as_path())
        .collect();
    assert_eq!(changed, vec![dir.path().join("main.cpp")]);
}

#[test]
fn toolchain_failures_are_outcomes_not_errors() {
    let mut preferences = Preferences::default();
    preferences.standalone.make_command = "spikegen-missing-make -j2".to_string();
    let (registry, devices) = setup(preferences);
    record_cpp_network(&registry, "unbuilt");
    let dir = tempfile::tempdir().unwrap();

    let result = devices.cpp.build(&BuildOptions::new(dir.path()).with_run()).unwrap();
    let compile = result.compile.as_ref().unwrap();
    assert!(!compile.success);
    assert_eq!(compile.status, None);
    assert_eq!(compile.command, "spikegen-missing-make -j2");
    assert!(result.run.is_none());
    assert!(!result.succeeded());
}

#[test]
fn empty_make_command_is_rejected() {
    let mut preferences = Preferences::default();
    preferences.standalone.make_command = "  ".to_string();
    let (_registry, devices) = setup(preferences);
    let dir = tempfile::tempdir().unwrap();
    let err = devices.android.build(&BuildOptions::new(dir.path())).unwrap_err();
    assert!(matches!(err, StandaloneError::InvalidOptions { .. }));
}

#[test]
fn android_project_layout() {
    let (registry, devices) = setup(Preferences::default());
    let v = ArrayHandle::from_f64(vec![0.0; 4]);
    let flags = "_array_droid__spikespace";
    let requests = [
        CodeObjectRequest::new("droid_stateupdate", "stateupdate").with_code("v += t"),
        CodeObjectRequest::new("droid_thresholder", "threshold")
            .with_code("_cond := v > 1.0")
            .with_keyword("spikespace", flags),
        CodeObjectRequest::new("droid_resetter", "reset")
            .with_code("v = 0.0")
            .with_keyword("spikespace", flags),
    ];
    for request in requests {
        create_codeobject(
            &registry,
            request
                .with_target("android_standalone")
                .with_variables(neuron_variables("droid", &v)),
        )
        .unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let result = devices
        .android
        .build(&BuildOptions::new(dir.path()).write_only())
        .unwrap();
    assert_eq!(
        result.files_written,
        vec!["Simulation.java", "renderscript.rs", "sources.txt", "makefile", MANIFEST]
    );
    assert_eq!(read(dir.path(), "sources.txt"), "Simulation.java\nrenderscript.rs\n");

    let script = read(dir.path(), "renderscript.rs");
    assert!(script.starts_with("#pragma version(1)\n#pragma rs java_package_name(org.spikegen.simulation)\n"));
    assert!(script.contains("float *_array_droid_v;\nint32_t *_array_droid__spikespace;"));
    assert_eq!(script.matches("float t;").count(), 1);
    assert!(script.contains("int32_t __attribute__((kernel)) update_droid_stateupdate(int32_t _idx) {"));
    assert!(script.contains("    _array_droid__spikespace[_idx] = _cond ? 1 : 0;"));
    assert!(script.contains("    if (_array_droid__spikespace[_idx]) {"));

    let java = read(dir.path(), "Simulation.java");
    assert!(java.contains("package org.spikegen.simulation;"));
    assert!(java.contains("    private static final float DT = "));
    assert!(java.contains("    private float t;"));
    assert!(java.contains("    float[] _array_droid_v;"));
    assert!(java.contains("        _array_droid_v = new float[] {0.0f, 0.0f, 0.0f, 0.0f};"));
    assert!(java.contains("        mScript.bind__array_droid_v(_array_droid_v_alloc);"));
    assert!(java.contains("        _idx_droid_thresholder = indexAllocation(4);"));
    let update = java.find("mScript.forEach_update_droid_stateupdate(").unwrap();
    let threshold = java.find("mScript.forEach_threshold_droid_thresholder(").unwrap();
    let reset = java.find("mScript.forEach_reset_droid_resetter(").unwrap();
    assert!(update < threshold && threshold < reset);
    assert!(java.contains("            mScript.set_t(t);"));

    assert!(read(dir.path(), "makefile").contains("PACKAGE = org.spikegen.simulation\n"));
}

#[test]
fn android_support_code_is_emitted_once_per_project() {
    let (registry, devices) = setup(Preferences::default());
    let v = ArrayHandle::from_f64(vec![0.5; 3]);
    for name in ["rounding_first", "rounding_second"] {
        create_codeobject(
            &registry,
            CodeObjectRequest::new(name, "stateupdate")
                .with_target("android_standalone")
                .with_variables(neuron_variables("rounding", &v))
                .with_code("v = int(v)"),
        )
        .unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    devices
        .android
        .build(&BuildOptions::new(dir.path()).write_only())
        .unwrap();
    let script = read(dir.path(), "renderscript.rs");
    assert_eq!(script.matches("static inline int32_t int_(float value)").count(), 1);
    let helper = script.find("static inline int32_t int_(float value)").unwrap();
    let first_kernel = script.find("update_rounding_first(").unwrap();
    assert!(helper < first_kernel);
    assert_eq!(script.matches("v = int_(v);").count(), 2);
}

#[test]
fn floor_division_and_modulo_agree_between_runtime_and_cpp() {
    let (registry, _devices) = setup(Preferences::default());
    let variables = || {
        let int_array = |storage: &str| {
            Variable::Array(
                ArrayVariable::new(storage, NumericType::Int64, 0)
                    .with_data(ArrayHandle::new(ArrayData::Int64(vec![-7, 7]))),
            )
        };
        VariableTable::new()
            .with("q", int_array("_array_signs_q"))
            .with("m", int_array("_array_signs_m"))
    };
    let code = "q = q // 2\nm = m % 3";

    let runtime_vars = variables();
    let q = runtime_vars.array("q").unwrap().data.clone().unwrap();
    let m = runtime_vars.array("m").unwrap().data.clone().unwrap();
    let mut runtime = create_codeobject(
        &registry,
        CodeObjectRequest::new("signs_runtime", "stateupdate")
            .with_target("runtime")
            .with_variables(runtime_vars)
            .with_code(code),
    )
    .unwrap();
    runtime.invoke().unwrap();
    assert_eq!(*q.read(), ArrayData::Int64(vec![-4, 3]));
    assert_eq!(*m.read(), ArrayData::Int64(vec![2, 1]));

    let cpp = create_codeobject(
        &registry,
        CodeObjectRequest::new("signs_cpp", "stateupdate")
            .with_target("cpp_standalone")
            .with_variables(variables())
            .with_code(code),
    )
    .unwrap();
    let source = cpp.artifact().section("cpp").unwrap();
    assert!(source.contains("q = _floordiv(q, 2);"));
    assert!(source.contains("m = _mod(m, 3);"));
    assert!(source.contains("return (a % b != 0 && ((a < 0) != (b < 0))) ? q - 1 : q;"));
    assert!(source.contains("return (m != 0 && ((m < 0) != (b < 0))) ? m + b : m;"));
    let helper = source.find("_floordiv(T a, U b)").unwrap();
    let kernel = source.find("void _run_signs_cpp(double t)").unwrap();
    assert!(helper < kernel);
}
