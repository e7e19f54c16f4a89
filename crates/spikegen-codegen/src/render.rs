//! Expression rendering.
//!
//! A pure traversal of the expression tree. The only rewrites are the ones
//! the active [`Language`] asks for: operator and literal spelling, call-site
//! function names, frozen constants inlined as literals, and subexpressions
//! inlined in parentheses.

use std::collections::HashSet;

use spikegen_core::expr::NEG_PRECEDENCE;
use spikegen_core::{
    CoreError, Expr, Function, Namespace, NamespaceEntry, Scalar, UnaryOp, Variable,
    VariableTable,
};

use crate::error::{CodegenError, Result};
use crate::language::{Language, OperatorSpelling};
use crate::library;

const MAX_SUBEXPRESSION_DEPTH: usize = 32;

/// Everything a name can resolve against while rendering.
pub struct RenderContext<'a> {
    pub language: &'a dyn Language,
    pub variables: &'a VariableTable,
    pub namespace: &'a Namespace,
    locals: HashSet<String>,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        language: &'a dyn Language,
        variables: &'a VariableTable,
        namespace: &'a Namespace,
    ) -> Self {
        Self {
            language,
            variables,
            namespace,
            locals: HashSet::new(),
        }
    }

    pub fn with_locals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locals.extend(names.into_iter().map(Into::into));
        self
    }

    /// Make `name` visible to later statements.
    pub fn declare_local(&mut self, name: &str) {
        self.locals.insert(name.to_string());
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.locals.contains(name)
    }

    /// Resolve a called function: request namespace first, then the default library.
    pub fn function(&self, name: &str) -> Result<&Function> {
        self.namespace
            .function(name)
            .or_else(|| library::builtin(name))
            .ok_or_else(|| {
                CodegenError::Core(CoreError::UnresolvedReference {
                    name: name.to_string(),
                    context: Some(format!("call to {name}()")),
                })
            })
    }
}

/// Render `expr` in the context's language.
pub fn render(expr: &Expr, ctx: &RenderContext<'_>) -> Result<String> {
    render_at(expr, ctx, 0)
}

fn render_at(expr: &Expr, ctx: &RenderContext<'_>, depth: usize) -> Result<String> {
    match expr {
        Expr::Literal(value) => Ok(ctx.language.literal(*value)),
        Expr::Name(name) => render_name(name, ctx, depth),
        Expr::Unary { op, operand } => {
            let (prefix, min_prec) = ctx.language.unary_operator(*op);
            let inner = render_operand(operand, min_prec, false, ctx, depth)?;
            // `- -x` must not collapse into a decrement.
            if *op == UnaryOp::Neg && inner.starts_with('-') {
                Ok(format!("{prefix}({inner})"))
            } else {
                Ok(format!("{prefix}{inner}"))
            }
        }
        Expr::Binary { op, left, right } => {
            let spelling = ctx.language.binary_operator(*op)?;
            match spelling {
                OperatorSpelling::Infix(sym) => {
                    let prec = op.precedence();
                    let right_assoc = op.is_right_associative();
                    let l = render_operand(left, prec, right_assoc, ctx, depth)?;
                    let r = render_operand(right, prec, !right_assoc, ctx, depth)?;
                    Ok(format!("{l} {sym} {r}"))
                }
                OperatorSpelling::Call(name) => {
                    let l = render_at(left, ctx, depth)?;
                    let r = render_at(right, ctx, depth)?;
                    Ok(format!("{name}({l}, {r})"))
                }
            }
        }
        Expr::Call { function, args } => {
            let f = ctx.function(function)?;
            let implementation = f.implementation(ctx.language.id()).ok_or_else(|| {
                CodegenError::NoImplementation {
                    function: function.clone(),
                    language: ctx.language.id().to_string(),
                }
            })?;
            let rendered = args
                .iter()
                .map(|a| render_at(a, ctx, depth))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("{}({})", implementation.name, rendered.join(", ")))
        }
    }
}

fn render_name(name: &str, ctx: &RenderContext<'_>, depth: usize) -> Result<String> {
    if let Some(var) = ctx.variables.get(name) {
        return match var {
            Variable::Constant(c) if c.frozen => Ok(ctx.language.literal(c.value.cast(c.dtype))),
            Variable::Subexpression(sub) => {
                if depth >= MAX_SUBEXPRESSION_DEPTH {
                    return Err(CoreError::InvalidVariable {
                        name: name.to_string(),
                        detail: "subexpression refers back to itself".to_string(),
                    }
                    .into());
                }
                Ok(format!("({})", render_at(&sub.expr, ctx, depth + 1)?))
            }
            _ => Ok(name.to_string()),
        };
    }
    if ctx.is_local(name) {
        return Ok(name.to_string());
    }
    match ctx.namespace.get(name) {
        Some(NamespaceEntry::Literal(value)) => Ok(ctx.language.literal(*value)),
        Some(NamespaceEntry::ArrayBinding(_)) => Ok(name.to_string()),
        Some(NamespaceEntry::FunctionRef(_)) | None => Err(CoreError::UnresolvedReference {
            name: name.to_string(),
            context: None,
        }
        .into()),
    }
}

/// Render a child of an operator, parenthesizing when it binds looser than
/// `parent_prec` (or equally, when `strict`).
fn render_operand(
    child: &Expr,
    parent_prec: u8,
    strict: bool,
    ctx: &RenderContext<'_>,
    depth: usize,
) -> Result<String> {
    let text = render_at(child, ctx, depth)?;
    let prec = precedence_in(child, ctx);
    if prec < parent_prec || (strict && prec == parent_prec) {
        Ok(format!("({text})"))
    } else {
        Ok(text)
    }
}

/// Precedence of `expr` as it will appear in the rendered text.
fn precedence_in(expr: &Expr, ctx: &RenderContext<'_>) -> u8 {
    match expr {
        Expr::Binary { op, .. } => match ctx.language.binary_operator(*op) {
            Ok(OperatorSpelling::Infix(_)) => op.precedence(),
            _ => u8::MAX,
        },
        Expr::Literal(value) if is_negative(*value) => NEG_PRECEDENCE,
        Expr::Name(name) => match ctx.variables.get(name) {
            Some(Variable::Constant(c)) if c.frozen && is_negative(c.value) => NEG_PRECEDENCE,
            Some(_) => u8::MAX,
            None if ctx.is_local(name) => u8::MAX,
            None => match ctx.namespace.get(name) {
                Some(NamespaceEntry::Literal(v)) if is_negative(*v) => NEG_PRECEDENCE,
                _ => u8::MAX,
            },
        },
        other => other.precedence(),
    }
}

fn is_negative(value: Scalar) -> bool {
    match value {
        Scalar::Int(i) => i < 0,
        Scalar::Float(x) => x.is_sign_negative(),
        Scalar::Bool(_) => false,
    }
}
