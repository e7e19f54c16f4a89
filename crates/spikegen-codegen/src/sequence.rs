//! Sequence compilation: abstract statements → per-iteration code.
//!
//! [`SequencePlan::build`] does the backend-neutral analysis (reference
//! checking, read/write partition, prologue and epilogue, array and function
//! bookkeeping). [`compile`] turns a plan into lines and template keywords
//! for one [`Language`].

use indexmap::{IndexMap, IndexSet};
use spikegen_core::{
    BinaryOp, CollisionPolicy, CoreError, Expr, Function, Namespace, NamespaceEntry, NumericType, Scalar,
    Statement, StatementOp, Variable, VariableTable,
};
use tracing::{debug, trace};

use crate::error::{CodegenError, Result};
use crate::language::{join_lines, FunctionFragments, Keywords, Language};
use crate::library;
use crate::render::RenderContext;

/// Index name used for arrays without an entry in `variable_indices`.
pub const DEFAULT_INDEX: &str = "_idx";

const MAX_SUBEXPRESSION_DEPTH: usize = 32;

/// Inputs of one sequence compilation.
#[derive(Debug, Clone, Copy)]
pub struct SequenceInput<'a> {
    pub statements: &'a [Statement],
    pub variables: &'a VariableTable,
    pub namespace: &'a Namespace,
    /// Array name → index name; missing entries use [`DEFAULT_INDEX`].
    pub variable_indices: &'a IndexMap<String, String>,
    /// The template visits every index densely.
    pub iterate_all: bool,
    pub collision_policy: CollisionPolicy,
}

/// Load of one array element into a local of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStep {
    pub name: String,
    pub storage_name: String,
    pub index: String,
    pub dtype: NumericType,
    /// The local is never written.
    pub constant: bool,
}

/// Store of a local back into its array element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStep {
    pub name: String,
    pub storage_name: String,
    pub index: String,
}

/// One storage array the generated code touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDecl {
    pub storage_name: String,
    pub dtype: NumericType,
    pub len: usize,
    pub constant: bool,
    /// Logical names bound to this storage, first-seen order.
    pub names: Vec<String>,
}

/// A constant emitted as a named declaration rather than inlined.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedConstant {
    pub name: String,
    pub dtype: NumericType,
    pub value: Scalar,
}

/// A late-bound scalar the generated code receives from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRef {
    pub name: String,
    pub dtype: NumericType,
}

/// Backend-neutral result of analysing a statement sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequencePlan {
    /// Arrays loaded before the statements, first-reference order.
    pub read_set: Vec<String>,
    /// Arrays stored after the statements, first-reference order.
    pub write_set: Vec<String>,
    /// Index arrays loaded before anything indexed through them.
    pub index_loads: Vec<LoadStep>,
    pub loads: Vec<LoadStep>,
    /// Bare declarations of write-only locals.
    pub declarations: Vec<(String, NumericType)>,
    /// Statements with declarations of existing arrays turned into writes.
    pub statements: Vec<Statement>,
    pub stores: Vec<StoreStep>,
    /// Storage arrays, deduplicated by storage name.
    pub arrays: Vec<ArrayDecl>,
    pub named_constants: Vec<NamedConstant>,
    pub attributes: Vec<AttributeRef>,
    /// Called functions, first-use order.
    pub functions: Vec<String>,
    /// Index names used, first-use order.
    pub index_names: Vec<String>,
    pub iterate_all: bool,
}

impl SequencePlan {
    /// Analyse `input`. Fails before producing anything when a name cannot
    /// be resolved.
    pub fn build(input: &SequenceInput<'_>) -> Result<SequencePlan> {
        let variables = input.variables;
        let index_of = |name: &str| -> String {
            input
                .variable_indices
                .get(name)
                .cloned()
                .unwrap_or_else(|| DEFAULT_INDEX.to_string())
        };

        check_references(input)?;

        let mut read_set: IndexSet<String> = IndexSet::new();
        let mut write_set: IndexSet<String> = IndexSet::new();
        let mut functions: IndexSet<String> = IndexSet::new();
        let mut scalars: IndexSet<String> = IndexSet::new();
        let mut statements = Vec::with_capacity(input.statements.len());

        for stmt in input.statements {
            let mut names = Vec::new();
            expand_names(&stmt.expr, variables, &mut names, 0)?;
            for name in &names {
                if variables.array(name).is_some() {
                    read_set.insert(name.clone());
                } else {
                    scalars.insert(name.clone());
                }
            }
            let mut called = Vec::new();
            expand_functions(&stmt.expr, variables, &mut called, 0);
            functions.extend(called);

            match variables.array(&stmt.target) {
                Some(array) => {
                    if stmt.op != StatementOp::Declare {
                        read_set.insert(stmt.target.clone());
                    }
                    write_set.insert(stmt.target.clone());
                    let mut rewritten = stmt.clone();
                    if rewritten.op == StatementOp::Declare {
                        rewritten.op = StatementOp::Assign;
                    }
                    rewritten.dtype = array.dtype;
                    statements.push(rewritten);
                }
                None => statements.push(stmt.clone()),
            }
        }

        // Arrays used as indices by other arrays are loaded first.
        let mut index_loads = Vec::new();
        let mut index_names: IndexSet<String> = IndexSet::new();
        for name in read_set.iter().chain(write_set.iter()) {
            let index = index_of(name);
            index_names.insert(index.clone());
            if let Some(index_array) = variables.array(&index) {
                if !index_loads.iter().any(|l: &LoadStep| l.name == index) {
                    let outer = index_of(&index);
                    index_names.insert(outer.clone());
                    index_loads.push(LoadStep {
                        name: index.clone(),
                        storage_name: index_array.storage_name.clone(),
                        index: outer,
                        dtype: index_array.dtype,
                        constant: true,
                    });
                }
            }
        }
        let index_loaded: IndexSet<String> = index_loads.iter().map(|l| l.name.clone()).collect();

        let mut loads = Vec::new();
        for name in &read_set {
            if index_loaded.contains(name) {
                continue;
            }
            if let Some(array) = variables.array(name) {
                loads.push(LoadStep {
                    name: name.clone(),
                    storage_name: array.storage_name.clone(),
                    index: index_of(name),
                    dtype: array.dtype,
                    constant: !write_set.contains(name),
                });
            }
        }

        let declarations = write_set
            .iter()
            .filter(|name| !read_set.contains(*name))
            .filter_map(|name| variables.array(name).map(|a| (name.clone(), a.dtype)))
            .collect();

        let stores = write_set
            .iter()
            .filter_map(|name| {
                variables.array(name).map(|a| StoreStep {
                    name: name.clone(),
                    storage_name: a.storage_name.clone(),
                    index: index_of(name),
                })
            })
            .collect();

        let mut arrays: Vec<ArrayDecl> = Vec::new();
        let touched = index_loaded
            .iter()
            .chain(read_set.iter())
            .chain(write_set.iter());
        for name in touched {
            let Some(array) = variables.array(name) else {
                continue;
            };
            match arrays.iter_mut().find(|d| d.storage_name == array.storage_name) {
                Some(decl) => {
                    if !decl.names.contains(name) {
                        decl.names.push(name.clone());
                    }
                }
                None => arrays.push(ArrayDecl {
                    storage_name: array.storage_name.clone(),
                    dtype: array.dtype,
                    len: array.current_len(),
                    constant: array.constant,
                    names: vec![name.clone()],
                }),
            }
        }

        let mut named_constants = Vec::new();
        let mut attributes = Vec::new();
        for name in &scalars {
            match variables.get(name) {
                Some(Variable::Constant(c)) if !c.frozen => named_constants.push(NamedConstant {
                    name: name.clone(),
                    dtype: c.dtype,
                    value: c.value,
                }),
                Some(Variable::Attribute(a)) => attributes.push(AttributeRef {
                    name: name.clone(),
                    dtype: a.dtype,
                }),
                _ => {}
            }
        }

        let plan = SequencePlan {
            read_set: read_set.into_iter().collect(),
            write_set: write_set.into_iter().collect(),
            index_loads,
            loads,
            declarations,
            statements,
            stores,
            arrays,
            named_constants,
            attributes,
            functions: functions.into_iter().collect(),
            index_names: index_names.into_iter().collect(),
            iterate_all: input.iterate_all,
        };
        trace!(
            read = ?plan.read_set,
            write = ?plan.write_set,
            "partitioned array accesses"
        );
        Ok(plan)
    }

    /// Locals visible to statements before any of them runs.
    pub fn initial_locals(&self) -> Vec<String> {
        let mut locals: Vec<String> = vec![DEFAULT_INDEX.to_string()];
        locals.extend(self.index_names.iter().cloned());
        locals.extend(self.index_loads.iter().map(|l| l.name.clone()));
        locals
    }
}

/// A sequence compiled for one language.
#[derive(Debug, Clone)]
pub struct CompiledSequence {
    pub plan: SequencePlan,
    /// Prologue, statements and epilogue, one entry per line.
    pub code_lines: Vec<String>,
    /// Template keywords produced by the compiler.
    pub keywords: Keywords,
    /// Namespace after merging function namespaces and removing function entries.
    pub namespace: Namespace,
    pub functions: FunctionFragments,
}

/// Compile a statement sequence for `language`.
pub fn compile(language: &dyn Language, input: SequenceInput<'_>) -> Result<CompiledSequence> {
    let plan = SequencePlan::build(&input)?;

    let mut namespace = input.namespace.clone();
    let mut fragments = FunctionFragments::default();

    let mut operators = Vec::new();
    for stmt in &plan.statements {
        expand_operators(&stmt.expr, input.variables, &mut operators, 0);
    }
    for op in operators {
        if let Some(code) = language.operator_support_code(op) {
            fragments.add_support_code(code);
        }
    }

    // Called functions first, then the namespace's own function entries.
    let mut function_names = plan.functions.clone();
    for name in input.namespace.function_names() {
        if !function_names.contains(&name) {
            function_names.push(name);
        }
    }
    for name in &function_names {
        let function = resolve_function(input.namespace, name)?;
        match function.implementation(language.id()) {
            Some(implementation) => {
                if let Some(code) = &implementation.support_code {
                    fragments.add_support_code(code);
                }
                for define in &implementation.defines {
                    if !fragments.defines.contains(define) {
                        fragments.defines.push(define.clone());
                    }
                }
                namespace.merge_function_namespace(name, &implementation.namespace, input.collision_policy)?;
            }
            None if plan.functions.contains(name) => {
                return Err(CodegenError::NoImplementation {
                    function: name.clone(),
                    language: language.id().to_string(),
                });
            }
            None => trace!(function = %name, language = language.id(), "uncalled function has no implementation"),
        }
        if matches!(namespace.get(name), Some(NamespaceEntry::FunctionRef(_))) {
            namespace.remove(name);
        }
    }

    let mut ctx = RenderContext::new(language, input.variables, input.namespace)
        .with_locals(plan.initial_locals());
    let mut code_lines = Vec::new();
    for load in &plan.index_loads {
        code_lines.push(language.load_line(load)?);
    }
    for constant in &plan.named_constants {
        code_lines.push(language.named_constant_line(&constant.name, constant.dtype, constant.value)?);
    }
    for load in &plan.loads {
        code_lines.push(language.load_line(load)?);
    }
    for (name, dtype) in &plan.declarations {
        code_lines.push(language.declare_line(name, *dtype)?);
    }
    for stmt in &plan.statements {
        code_lines.push(language.translate_statement(stmt, &ctx)?);
        if stmt.op == StatementOp::Declare {
            ctx.declare_local(&stmt.target);
        }
    }
    for store in &plan.stores {
        code_lines.push(language.store_line(store)?);
    }

    let mut keywords = language.compile_fragments(&plan, &fragments)?;
    keywords.insert("vector_code".to_string(), join_lines(&code_lines));
    if !fragments.support_code.is_empty() {
        keywords.insert("support_code".to_string(), fragments.support_code.join("\n\n"));
    }
    debug!(language = language.id(), lines = code_lines.len(), "compiled statement sequence");

    Ok(CompiledSequence {
        plan,
        code_lines,
        keywords,
        namespace,
        functions: fragments,
    })
}

fn resolve_function(namespace: &Namespace, name: &str) -> Result<Function> {
    namespace
        .function(name)
        .or_else(|| library::builtin(name))
        .cloned()
        .ok_or_else(|| {
            CoreError::UnresolvedReference {
                name: name.to_string(),
                context: Some(format!("call to {name}()")),
            }
            .into()
        })
}

/// Every name must be a variable, namespace entry, index name or an earlier local.
fn check_references(input: &SequenceInput<'_>) -> Result<()> {
    let mut known: IndexSet<String> = IndexSet::new();
    known.insert(DEFAULT_INDEX.to_string());
    known.extend(input.variable_indices.values().cloned());

    let resolvable = |name: &str, known: &IndexSet<String>| {
        input.variables.contains(name)
            || known.contains(name)
            || matches!(
                input.namespace.get(name),
                Some(NamespaceEntry::Literal(_)) | Some(NamespaceEntry::ArrayBinding(_))
            )
    };

    for stmt in input.statements {
        let context = Some(stmt.to_string());
        let mut names = Vec::new();
        expand_names(&stmt.expr, input.variables, &mut names, 0)?;
        for name in &names {
            if !resolvable(name, &known) {
                return Err(CoreError::UnresolvedReference {
                    name: name.clone(),
                    context,
                }
                .into());
            }
        }

        let mut called = Vec::new();
        expand_functions(&stmt.expr, input.variables, &mut called, 0);
        for name in &called {
            if input.namespace.function(name).is_none() && library::builtin(name).is_none() {
                return Err(CoreError::UnresolvedReference {
                    name: name.clone(),
                    context,
                }
                .into());
            }
        }

        match input.variables.get(&stmt.target) {
            Some(Variable::Array(_)) => {}
            Some(_) => {
                return Err(CoreError::InvalidVariable {
                    name: stmt.target.clone(),
                    detail: format!("only arrays and locals can be assigned (in `{stmt}`)"),
                }
                .into());
            }
            None if stmt.op == StatementOp::Declare => {
                known.insert(stmt.target.clone());
            }
            None if known.contains(&stmt.target) => {}
            None => {
                return Err(CoreError::UnresolvedReference {
                    name: stmt.target.clone(),
                    context,
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Collect names read by `expr`, looking through subexpressions.
fn expand_names(
    expr: &Expr,
    variables: &VariableTable,
    out: &mut Vec<String>,
    depth: usize,
) -> Result<()> {
    for name in expr.names() {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
        if let Some(Variable::Subexpression(sub)) = variables.get(name) {
            if depth >= MAX_SUBEXPRESSION_DEPTH {
                return Err(CoreError::InvalidVariable {
                    name: name.to_string(),
                    detail: "subexpression refers back to itself".to_string(),
                }
                .into());
            }
            expand_names(&sub.expr, variables, out, depth + 1)?;
        }
    }
    Ok(())
}

fn expand_operators(expr: &Expr, variables: &VariableTable, out: &mut Vec<BinaryOp>, depth: usize) {
    expr.walk(&mut |e| {
        if let Expr::Binary { op, .. } = e {
            if !out.contains(op) {
                out.push(*op);
            }
        }
    });
    if depth >= MAX_SUBEXPRESSION_DEPTH {
        return;
    }
    for name in expr.names() {
        if let Some(Variable::Subexpression(sub)) = variables.get(name) {
            expand_operators(&sub.expr, variables, out, depth + 1);
        }
    }
}

fn expand_functions(expr: &Expr, variables: &VariableTable, out: &mut Vec<String>, depth: usize) {
    for name in expr.functions() {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    if depth >= MAX_SUBEXPRESSION_DEPTH {
        return;
    }
    for name in expr.names() {
        if let Some(Variable::Subexpression(sub)) = variables.get(name) {
            expand_functions(&sub.expr, variables, out, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::{CppLanguage, ReferenceLanguage};
    use spikegen_core::{Function, FunctionImplementation};

    fn parse(code: &str) -> Vec<Statement> {
        Statement::parse_block(code, NumericType::Float64).unwrap()
    }

    fn input<'a>(
        statements: &'a [Statement],
        variables: &'a VariableTable,
        namespace: &'a Namespace,
        indices: &'a IndexMap<String, String>,
    ) -> SequenceInput<'a> {
        SequenceInput {
            statements,
            variables,
            namespace,
            variable_indices: indices,
            iterate_all: true,
            collision_policy: CollisionPolicy::default(),
        }
    }

    #[test]
    fn scenario_a_reference_load_update_store() {
        let variables = VariableTable::new().with("v", Variable::array("_array_v", NumericType::Float64, 3));
        let indices: IndexMap<String, String> = [("v".to_string(), "i".to_string())].into_iter().collect();
        let statements = parse("v := v + 1.0");
        let ns = Namespace::new();
        let compiled = compile(&ReferenceLanguage, input(&statements, &variables, &ns, &indices)).unwrap();

        assert_eq!(compiled.plan.read_set, vec!["v"]);
        assert_eq!(compiled.plan.write_set, vec!["v"]);
        assert_eq!(
            compiled.code_lines,
            vec!["float64 v = _array_v[i]", "v = v + 1.0", "_array_v[i] = v"]
        );
    }

    #[test]
    fn scenario_b_constant_inlined() {
        let variables = VariableTable::new().with("v", Variable::array("_array_v", NumericType::Float64, 3));
        let ns = Namespace::new().with("tau", Scalar::Float(10.0));
        let statements = parse("dv := v / tau");
        let indices = IndexMap::new();
        let compiled = compile(&ReferenceLanguage, input(&statements, &variables, &ns, &indices)).unwrap();

        assert_eq!(compiled.plan.read_set, vec!["v"]);
        assert!(compiled.plan.write_set.is_empty());
        assert_eq!(
            compiled.code_lines,
            vec!["const float64 v = _array_v[_idx]", "const float64 dv = v / 10.0"]
        );
        assert!(compiled.code_lines.iter().all(|l| !l.contains("tau")));
    }

    #[test]
    fn scenario_c_shared_storage_declared_once() {
        let variables = VariableTable::new()
            .with("a", Variable::array("arr0", NumericType::Float64, 4))
            .with("b", Variable::array("arr0", NumericType::Float64, 4));
        let statements = parse("c := a + b");
        let (ns, indices) = (Namespace::new(), IndexMap::new());
        let compiled = compile(&CppLanguage::default(), input(&statements, &variables, &ns, &indices)).unwrap();

        assert_eq!(compiled.plan.arrays.len(), 1);
        assert_eq!(compiled.plan.arrays[0].names, vec!["a", "b"]);
        let pointers = &compiled.keywords["pointers_lines"];
        assert_eq!(pointers.lines().count(), 1);
        assert_eq!(pointers, "double * __restrict _ptr_arr0 = arr0;");
    }

    #[test]
    fn scenario_d_unresolved_reference_fails_early() {
        let variables = VariableTable::new().with("v", Variable::array("_array_v", NumericType::Float64, 3));
        let statements = parse("v = v + ghost");
        let (ns, indices) = (Namespace::new(), IndexMap::new());
        let err = compile(&ReferenceLanguage, input(&statements, &variables, &ns, &indices)).unwrap_err();
        match err {
            CodegenError::Core(CoreError::UnresolvedReference { name, context }) => {
                assert_eq!(name, "ghost");
                assert_eq!(context.as_deref(), Some("v = v + ghost"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn write_only_array_gets_bare_declaration() {
        let variables = VariableTable::new()
            .with("v", Variable::array("_array_v", NumericType::Float64, 3))
            .with("w", Variable::array("_array_w", NumericType::Float64, 3));
        let statements = parse("w := 2 * v");
        let (ns, indices) = (Namespace::new(), IndexMap::new());
        let compiled = compile(&ReferenceLanguage, input(&statements, &variables, &ns, &indices)).unwrap();
        assert_eq!(compiled.plan.read_set, vec!["v"]);
        assert_eq!(compiled.plan.write_set, vec!["w"]);
        assert_eq!(
            compiled.code_lines,
            vec![
                "const float64 v = _array_v[_idx]",
                "float64 w",
                "w = 2 * v",
                "_array_w[_idx] = w",
            ]
        );
    }

    #[test]
    fn statement_order_is_preserved() {
        let variables = VariableTable::new().with("v", Variable::array("_array_v", NumericType::Float64, 3));
        let statements = parse("a := v\nb := a * 2\nv = b - a");
        let (ns, indices) = (Namespace::new(), IndexMap::new());
        let compiled = compile(&ReferenceLanguage, input(&statements, &variables, &ns, &indices)).unwrap();
        let body = &compiled.code_lines[1..4];
        assert_eq!(body, ["const float64 a = v", "const float64 b = a * 2", "v = b - a"]);
    }

    #[test]
    fn index_arrays_load_first() {
        let variables = VariableTable::new()
            .with("w", Variable::array("_array_w", NumericType::Float64, 10))
            .with("v_post", Variable::array("_array_v", NumericType::Float64, 4))
            .with("_postsynaptic_idx", Variable::array("_array_post", NumericType::Int32, 10));
        let indices: IndexMap<String, String> =
            [("v_post".to_string(), "_postsynaptic_idx".to_string())].into_iter().collect();
        let statements = parse("v_post += w");
        let ns = Namespace::new();
        let compiled = compile(&ReferenceLanguage, input(&statements, &variables, &ns, &indices)).unwrap();
        assert_eq!(compiled.code_lines[0], "const int32 _postsynaptic_idx = _array_post[_idx]");
        assert!(compiled.code_lines.contains(&"float64 v_post = _array_v[_postsynaptic_idx]".to_string()));
        assert_eq!(compiled.code_lines.last().unwrap(), "_array_v[_postsynaptic_idx] = v_post");
    }

    #[test]
    fn function_support_code_is_deduplicated() {
        let variables = VariableTable::new().with("v", Variable::array("_array_v", NumericType::Float64, 3));
        let statements = parse("a := clip(v, 0, 1)\nv = clip(a * 2, 0, 1)");
        let (ns, indices) = (Namespace::new(), IndexMap::new());
        let compiled = compile(&CppLanguage::default(), input(&statements, &variables, &ns, &indices)).unwrap();
        assert_eq!(compiled.functions.support_code.len(), 1);
        assert_eq!(compiled.keywords["support_code"].matches("inline double _clip").count(), 1);
    }

    #[test]
    fn function_namespace_merged_and_entry_removed() {
        let custom = Function::new("noise").with_implementation(
            "cpp",
            FunctionImplementation::new("_noise")
                .with_define("_NOISE_SCALE", "0.5")
                .with_namespace_entry("_noise_table_len", NamespaceEntry::Literal(Scalar::Int(64))),
        );
        let ns = Namespace::new().with("noise", custom);
        let variables = VariableTable::new().with("v", Variable::array("_array_v", NumericType::Float64, 3));
        let statements = parse("v += noise(v)");
        let indices = IndexMap::new();
        let compiled = compile(&CppLanguage::default(), input(&statements, &variables, &ns, &indices)).unwrap();
        assert!(compiled.namespace.contains("_noise_table_len"));
        assert!(!compiled.namespace.contains("noise"));
        assert_eq!(compiled.keywords["hashdefine_lines"], "#define _NOISE_SCALE 0.5");
        assert!(compiled.code_lines.contains(&"v += _noise(v);".to_string()));
    }

    #[test]
    fn uncalled_namespace_functions_are_resolved_too() {
        let helper = Function::new("helper").with_implementation(
            "cpp",
            FunctionImplementation::new("_helper")
                .with_support_code("inline double _helper(double x) { return x; }")
                .with_namespace_entry("_helper_scale", NamespaceEntry::Literal(Scalar::Float(2.0))),
        );
        let reference_only = Function::new("plot").with_implementation("reference", FunctionImplementation::new("plot"));
        let ns = Namespace::new().with("helper", helper).with("plot", reference_only);
        let variables = VariableTable::new().with("v", Variable::array("_array_v", NumericType::Float64, 3));
        let statements = parse("v = v * 2");
        let indices = IndexMap::new();
        let compiled = compile(&CppLanguage::default(), input(&statements, &variables, &ns, &indices)).unwrap();
        assert!(compiled.namespace.function_names().is_empty());
        assert!(compiled.namespace.contains("_helper_scale"));
        assert_eq!(compiled.functions.support_code, vec!["inline double _helper(double x) { return x; }"]);
    }

    #[test]
    fn called_function_without_implementation_fails() {
        let reference_only = Function::new("plot").with_implementation("reference", FunctionImplementation::new("plot"));
        let ns = Namespace::new().with("plot", reference_only);
        let variables = VariableTable::new().with("v", Variable::array("_array_v", NumericType::Float64, 3));
        let statements = parse("v = plot(v)");
        let indices = IndexMap::new();
        let err = compile(&CppLanguage::default(), input(&statements, &variables, &ns, &indices)).unwrap_err();
        assert!(matches!(err, CodegenError::NoImplementation { ref function, .. } if function == "plot"));
    }

    #[test]
    fn assigning_a_constant_is_rejected() {
        let variables = VariableTable::new().with("tau", Variable::constant(10.0));
        let statements = parse("tau = 3.0");
        let (ns, indices) = (Namespace::new(), IndexMap::new());
        let err = compile(&ReferenceLanguage, input(&statements, &variables, &ns, &indices)).unwrap_err();
        assert!(matches!(err, CodegenError::Core(CoreError::InvalidVariable { .. })));
    }

    #[test]
    fn subexpression_reads_count_as_reads() {
        let variables = VariableTable::new()
            .with("v", Variable::array("_array_v", NumericType::Float64, 3))
            .with("g", Variable::array("_array_g", NumericType::Float64, 3))
            .with("I", Variable::subexpression(NumericType::Float64, Expr::parse("g * v").unwrap()));
        let statements = parse("v += I");
        let (ns, indices) = (Namespace::new(), IndexMap::new());
        let compiled = compile(&ReferenceLanguage, input(&statements, &variables, &ns, &indices)).unwrap();
        assert_eq!(compiled.plan.read_set, vec!["g", "v"]);
        assert!(compiled.code_lines.contains(&"v += (g * v)".to_string()));
    }

    #[test]
    fn named_constants_and_attributes_are_tracked() {
        let variables = VariableTable::new()
            .with("v", Variable::array("_array_v", NumericType::Float64, 3))
            .with("El", Variable::named_constant(-0.07, NumericType::Float64))
            .with("t", Variable::attribute(NumericType::Float64, || Scalar::Float(0.0)));
        let statements = parse("v = El + t");
        let (ns, indices) = (Namespace::new(), IndexMap::new());
        let compiled = compile(&ReferenceLanguage, input(&statements, &variables, &ns, &indices)).unwrap();
        assert_eq!(compiled.plan.named_constants.len(), 1);
        assert_eq!(compiled.plan.attributes[0].name, "t");
        assert_eq!(compiled.code_lines[0], "const float64 El = -0.07");
    }
}
