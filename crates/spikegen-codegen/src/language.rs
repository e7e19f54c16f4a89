//! The per-backend language seam.
//!
//! A [`Language`] knows how to spell types, literals, operators and
//! statements, and contributes language-local template fragments once a
//! [`SequencePlan`] has been built. Everything backend-neutral (read/write
//! analysis, prologue/epilogue ordering, function resolution) lives in
//! [`crate::sequence`].

use std::fmt;

use indexmap::IndexMap;
use spikegen_core::{BinaryOp, Expr, NumericType, Scalar, Statement, StatementOp, UnaryOp};

use crate::error::{CodegenError, Result};
use crate::render::{render, RenderContext};
use crate::sequence::{LoadStep, SequencePlan, StoreStep};

/// Template keywords: slot name → text.
pub type Keywords = IndexMap<String, String>;

/// How a binary operator is written in a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSpelling {
    /// `left <sym> right`
    Infix(&'static str),
    /// `name(left, right)`
    Call(&'static str),
}

/// Support code and defines collected from the functions a sequence calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionFragments {
    /// Deduplicated support code blocks, first-use order.
    pub support_code: Vec<String>,
    /// Deduplicated `(name, value)` defines, first-use order.
    pub defines: Vec<(String, String)>,
}

impl FunctionFragments {
    /// Append a support code block unless it is already present.
    pub fn add_support_code(&mut self, code: &str) {
        if !self.support_code.iter().any(|c| c == code) {
            self.support_code.push(code.to_string());
        }
    }
}

/// A code generation language.
pub trait Language: Send + Sync + fmt::Debug {
    /// Stable identifier, also used to key function implementations.
    fn id(&self) -> &'static str;

    /// Spellings of the numeric types the language can express.
    fn type_table(&self) -> &'static [(NumericType, &'static str)];

    /// Spelling of a numeric type in generated code.
    fn type_name(&self, dtype: NumericType) -> Result<String> {
        self.type_table()
            .iter()
            .find(|(t, _)| *t == dtype)
            .map(|(_, name)| (*name).to_string())
            .ok_or_else(|| CodegenError::UnmappedType {
                language: self.id().to_string(),
                dtype,
            })
    }

    /// Spelling of a literal.
    fn literal(&self, value: Scalar) -> String;

    fn binary_operator(&self, op: BinaryOp) -> Result<OperatorSpelling>;

    /// Support code a [`OperatorSpelling::Call`] spelling relies on.
    fn operator_support_code(&self, _op: BinaryOp) -> Option<&'static str> {
        None
    }

    /// Prefix for a unary operator, and the precedence its operand must reach
    /// to go unparenthesized.
    fn unary_operator(&self, op: UnaryOp) -> (&'static str, u8);

    /// Qualifier for locals that are never reassigned.
    fn const_qualifier(&self) -> Option<&'static str> {
        Some("const")
    }

    fn terminator(&self) -> &'static str {
        ";"
    }

    /// How the prologue and epilogue address one element of a storage array.
    fn array_access(&self, storage: &str, index: &str) -> String {
        format!("{storage}[{index}]")
    }

    fn render_expression(&self, expr: &Expr, ctx: &RenderContext<'_>) -> Result<String> {
        render(expr, ctx)
    }

    /// Translate one statement whose names are all locals or scalars.
    fn translate_statement(&self, stmt: &Statement, ctx: &RenderContext<'_>) -> Result<String> {
        let rhs = self.render_expression(&stmt.expr, ctx)?;
        let term = self.terminator();
        let line = match stmt.op {
            StatementOp::Declare => {
                let ty = self.type_name(stmt.dtype)?;
                match self.const_qualifier() {
                    Some(q) if stmt.constant => format!("{q} {ty} {} = {rhs}{term}", stmt.target),
                    _ => format!("{ty} {} = {rhs}{term}", stmt.target),
                }
            }
            op => format!("{} {} {rhs}{term}", stmt.target, op.symbol()),
        };
        Ok(line)
    }

    /// Prologue line loading one array element into a local.
    fn load_line(&self, load: &LoadStep) -> Result<String> {
        let ty = self.type_name(load.dtype)?;
        let access = self.array_access(&load.storage_name, &load.index);
        let term = self.terminator();
        Ok(match self.const_qualifier() {
            Some(q) if load.constant => format!("{q} {ty} {} = {access}{term}", load.name),
            _ => format!("{ty} {} = {access}{term}", load.name),
        })
    }

    /// Bare declaration of a write-only local.
    fn declare_line(&self, name: &str, dtype: NumericType) -> Result<String> {
        Ok(format!("{} {name}{}", self.type_name(dtype)?, self.terminator()))
    }

    /// Epilogue line storing a local back to its array.
    fn store_line(&self, store: &StoreStep) -> Result<String> {
        let access = self.array_access(&store.storage_name, &store.index);
        Ok(format!("{access} = {}{}", store.name, self.terminator()))
    }

    /// Declaration of a named (non-inlined) constant.
    fn named_constant_line(&self, name: &str, dtype: NumericType, value: Scalar) -> Result<String> {
        let ty = self.type_name(dtype)?;
        let lit = self.literal(value.cast(dtype));
        let term = self.terminator();
        Ok(match self.const_qualifier() {
            Some(q) => format!("{q} {ty} {name} = {lit}{term}"),
            None => format!("{ty} {name} = {lit}{term}"),
        })
    }

    /// Language-local template fragments for a compiled plan.
    fn compile_fragments(
        &self,
        _plan: &SequencePlan,
        _functions: &FunctionFragments,
    ) -> Result<Keywords> {
        Ok(Keywords::new())
    }

    /// Code that flushes denormals to zero, if the language has any.
    fn denormal_preamble(&self) -> Option<String> {
        None
    }
}

/// Error for an operator a language cannot express.
pub(crate) fn unsupported(language: &dyn Language, op: BinaryOp) -> CodegenError {
    CodegenError::UnsupportedOperator {
        language: language.id().to_string(),
        op: op.symbol().to_string(),
    }
}

/// Join lines, skipping empties.
pub fn join_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for line in lines {
        let line = line.as_ref();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}
