//! Code objects: one generation request turned into a named artifact.
//!
//! [`create_codeobject`] resolves the target, compiles the statements with the
//! target's language, renders the requested template and hands the result to
//! the target, which decides whether the object can run in-process or only
//! be built.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spikegen_core::{
    find_name, prepare_namespace, ArrayHandle, CollisionPolicy, Function, Namespace,
    NamespaceEntry, NumericType, Scalar, Statement, Variable, VariableTable,
};
use tracing::{debug, warn};

use crate::error::{CodegenError, Result};
use crate::language::Keywords;
use crate::library;
use crate::registry::{Target, TargetRegistry};
use crate::sequence::{self, SequenceInput, SequencePlan, DEFAULT_INDEX};
use crate::template::{Artifact, TemplateMeta};

/// Keyword and variable name of the iteration count.
pub const ITERATION_COUNT: &str = "N";

/// What to do when a caller-supplied template keyword is also produced by
/// the compiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeywordPolicy {
    /// Keep the compiler's value and log a warning.
    #[default]
    CompilerWins,
    /// Fail with [`CodegenError::KeywordCollision`].
    Reject,
}

/// How a request picks its target.
#[derive(Clone)]
pub enum TargetSelector {
    /// A registered target id.
    Id(String),
    /// A target instance, bypassing the registry.
    Target(Arc<dyn Target>),
}

impl fmt::Debug for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSelector::Id(id) => f.debug_tuple("Id").field(id).finish(),
            TargetSelector::Target(t) => f.debug_tuple("Target").field(&t.id()).finish(),
        }
    }
}

impl From<&str> for TargetSelector {
    fn from(id: &str) -> Self {
        TargetSelector::Id(id.to_string())
    }
}

impl From<String> for TargetSelector {
    fn from(id: String) -> Self {
        TargetSelector::Id(id)
    }
}

impl From<Arc<dyn Target>> for TargetSelector {
    fn from(target: Arc<dyn Target>) -> Self {
        TargetSelector::Target(target)
    }
}

/// Everything needed to generate one code object.
#[derive(Debug, Clone, Default)]
pub struct CodeObjectRequest {
    /// Base name; a trailing `*` always numbers the final name.
    pub name: String,
    pub statements: Vec<Statement>,
    /// Abstract code text, parsed at creation with the `default-float`
    /// preference and appended after `statements`.
    pub abstract_code: Option<String>,
    pub namespace: Namespace,
    pub variables: VariableTable,
    /// Template name in the target's templater.
    pub template: String,
    /// Array name → index name, for arrays not indexed by `_idx`.
    pub variable_indices: IndexMap<String, String>,
    /// `None` selects the registry's default target.
    pub target: Option<TargetSelector>,
    /// Extra template keywords supplied by the caller.
    pub template_keywords: Keywords,
    /// Overrides the preference when set.
    pub keyword_policy: Option<KeywordPolicy>,
    /// Overrides the preference when set.
    pub collision_policy: Option<CollisionPolicy>,
}

impl CodeObjectRequest {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            ..Self::default()
        }
    }

    pub fn with_statements(mut self, statements: Vec<Statement>) -> Self {
        self.statements = statements;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.abstract_code = Some(code.into());
        self
    }

    pub fn with_variables(mut self, variables: VariableTable) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_index(mut self, array: impl Into<String>, index: impl Into<String>) -> Self {
        self.variable_indices.insert(array.into(), index.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<TargetSelector>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.template_keywords.insert(name.into(), value.into());
        self
    }

    pub fn with_keyword_policy(mut self, policy: KeywordPolicy) -> Self {
        self.keyword_policy = Some(policy);
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = Some(policy);
        self
    }
}

/// The target-independent result of a request, handed to
/// [`Target::instantiate`].
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    /// Process-unique name.
    pub name: String,
    pub target: String,
    pub template: String,
    pub meta: TemplateMeta,
    pub artifact: Artifact,
    /// Namespace after flattening and function namespace merges.
    pub namespace: Namespace,
    /// Variable table, including the `_num<name>` length entries.
    pub variables: VariableTable,
    pub plan: SequencePlan,
    /// Per-iteration code in the target's language.
    pub code_lines: Vec<String>,
    /// Keywords the template was rendered with.
    pub keywords: Keywords,
    /// Functions the statements call, resolved at creation.
    pub functions: IndexMap<String, Function>,
    /// Deduplicated support code blocks, first-use order.
    pub support_code: Vec<String>,
}

/// Result of one in-process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeOutcome {
    /// Indices the per-iteration code ran for.
    pub iterations: usize,
    /// Indices where the threshold condition held, for threshold kernels.
    pub spikes: Option<Vec<usize>>,
}

/// A named, invocable-or-buildable unit of generated code.
pub trait CodeObject: Send + fmt::Debug {
    fn generated(&self) -> &GeneratedCode;

    /// Execute once. Targets that only emit sources fail with
    /// [`CodegenError::NotExecutable`].
    fn invoke(&mut self) -> Result<InvokeOutcome>;

    fn name(&self) -> &str {
        &self.generated().name
    }

    fn target(&self) -> &str {
        &self.generated().target
    }

    fn artifact(&self) -> &Artifact {
        &self.generated().artifact
    }

    fn namespace(&self) -> &Namespace {
        &self.generated().namespace
    }

    fn variables(&self) -> &VariableTable {
        &self.generated().variables
    }

    fn plan(&self) -> &SequencePlan {
        &self.generated().plan
    }
}

/// Generate a code object for `request`.
pub fn create_codeobject(
    registry: &TargetRegistry,
    request: CodeObjectRequest,
) -> Result<Box<dyn CodeObject>> {
    let target = match &request.target {
        Some(TargetSelector::Id(id)) => registry.resolve(id)?,
        Some(TargetSelector::Target(target)) => Arc::clone(target),
        None => registry.default_target()?,
    };
    let template = target
        .templater()
        .get(&request.template)
        .ok_or_else(|| CodegenError::UnknownTemplate {
            target: target.id().to_string(),
            template: request.template.clone(),
        })?;

    let prefs = &registry.preferences().codegen;
    let keyword_policy = request.keyword_policy.unwrap_or(prefs.keyword_policy);
    let collision_policy = request.collision_policy.unwrap_or(prefs.collision_policy);

    let mut statements = request.statements;
    if let Some(code) = &request.abstract_code {
        statements.extend(Statement::parse_block(code, prefs.default_float)?);
    }

    request.variables.validate()?;
    let variables = with_length_variables(request.variables);
    let mut namespace = prepare_namespace(&request.namespace, &variables);
    for (name, array) in variables.arrays() {
        let key = format!("_num{name}");
        if array.constant && !namespace.contains(&key) && !variables.contains(&key) {
            let len = i64::try_from(array.current_len()).unwrap_or(i64::MAX);
            namespace.insert(key, NamespaceEntry::Literal(Scalar::Int(len)));
        }
    }

    let abstract_code: Vec<String> = statements.iter().map(ToString::to_string).collect();
    debug!(
        backend = target.id(),
        template = template.name(),
        abstract_code = %abstract_code.join("\n"),
        "generating code object"
    );
    let compiled = sequence::compile(
        target.language(),
        SequenceInput {
            statements: &statements,
            variables: &variables,
            namespace: &namespace,
            variable_indices: &request.variable_indices,
            iterate_all: template.meta().iterate_all,
            collision_policy,
        },
    )?;
    debug!(code = %compiled.code_lines.join("\n"), "inner code");

    let mut functions = IndexMap::new();
    for name in &compiled.plan.functions {
        if let Some(function) = namespace.function(name).or_else(|| library::builtin(name)) {
            functions.insert(name.clone(), function.clone());
        }
    }

    let name = find_name(&request.name);
    let mut keywords = compiled.keywords;
    keywords.insert("name".to_string(), name.clone());
    if let Some(count) = static_iteration_count(&variables, &namespace, &compiled.plan) {
        keywords.insert(ITERATION_COUNT.to_string(), count.to_string());
    }
    merge_keywords(&mut keywords, request.template_keywords, keyword_policy)?;

    let artifact = template.render(&keywords)?;
    debug!(codeobject = %name, code = %artifact, "final code");

    let generated = GeneratedCode {
        name,
        target: target.id().to_string(),
        template: template.name().to_string(),
        meta: template.meta().clone(),
        artifact,
        namespace: compiled.namespace,
        variables,
        plan: compiled.plan,
        code_lines: compiled.code_lines,
        keywords,
        functions,
        support_code: compiled.functions.support_code,
    };
    target.instantiate(generated)
}

/// Iteration count known at generation time: a constant or namespace
/// literal `N`, else the length of the first array indexed by `_idx`.
pub fn static_iteration_count(
    variables: &VariableTable,
    namespace: &Namespace,
    plan: &SequencePlan,
) -> Option<usize> {
    let declared = match variables.get(ITERATION_COUNT) {
        Some(Variable::Constant(c)) => Some(c.value),
        Some(_) => return None,
        None => namespace.get(ITERATION_COUNT).and_then(NamespaceEntry::as_literal),
    };
    if let Some(value) = declared {
        return usize::try_from(value.as_i64()).ok();
    }
    plan.loads
        .iter()
        .map(|l| (l.index.as_str(), l.name.as_str()))
        .chain(plan.stores.iter().map(|s| (s.index.as_str(), s.name.as_str())))
        .find(|(index, _)| *index == DEFAULT_INDEX)
        .and_then(|(_, name)| variables.array(name))
        .map(|array| array.current_len())
}

/// Add `_num<name>` attributes for arrays whose length may change, so the
/// length is re-read on every invocation.
fn with_length_variables(mut variables: VariableTable) -> VariableTable {
    let dynamic: Vec<(String, Option<ArrayHandle>, usize)> = variables
        .arrays()
        .filter(|(_, array)| !array.constant)
        .map(|(name, array)| (name.to_string(), array.data.clone(), array.len))
        .collect();
    for (name, data, len) in dynamic {
        let key = format!("_num{name}");
        if variables.contains(&key) {
            continue;
        }
        let accessor = move || {
            let current = data.as_ref().map_or(len, |handle| handle.len());
            Scalar::Int(i64::try_from(current).unwrap_or(i64::MAX))
        };
        variables.insert(key, Variable::attribute(NumericType::Int32, accessor));
    }
    variables
}

/// Merge caller keywords into the compiler's under `policy`.
fn merge_keywords(compiler: &mut Keywords, caller: Keywords, policy: KeywordPolicy) -> Result<()> {
    for (keyword, value) in caller {
        if compiler.contains_key(&keyword) {
            match policy {
                KeywordPolicy::CompilerWins => {
                    warn!(%keyword, "template keyword set by caller and compiler; keeping compiler value");
                    continue;
                }
                KeywordPolicy::Reject => return Err(CodegenError::KeywordCollision { keyword }),
            }
        }
        compiler.insert(keyword, value);
    }
    Ok(())
}
