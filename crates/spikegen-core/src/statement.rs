//! Abstract code statements and the line-oriented block parser.

use std::fmt;

use crate::dtype::NumericType;
use crate::error::{CoreError, Result};
use crate::expr::{BinaryOp, Expr, UnaryOp};

/// The assignment form of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementOp {
    /// `:=` introduces a new local.
    Declare,
    /// `=` overwrites.
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl StatementOp {
    pub fn symbol(self) -> &'static str {
        match self {
            StatementOp::Declare => ":=",
            StatementOp::Assign => "=",
            StatementOp::AddAssign => "+=",
            StatementOp::SubAssign => "-=",
            StatementOp::MulAssign => "*=",
            StatementOp::DivAssign => "/=",
        }
    }

    /// Arithmetic operator of an in-place update.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            StatementOp::AddAssign => Some(BinaryOp::Add),
            StatementOp::SubAssign => Some(BinaryOp::Sub),
            StatementOp::MulAssign => Some(BinaryOp::Mul),
            StatementOp::DivAssign => Some(BinaryOp::Div),
            StatementOp::Declare | StatementOp::Assign => None,
        }
    }
}

// Longest spellings first so `:=` is not read as `=`.
const STATEMENT_OPS: [(&str, StatementOp); 6] = [
    (":=", StatementOp::Declare),
    ("+=", StatementOp::AddAssign),
    ("-=", StatementOp::SubAssign),
    ("*=", StatementOp::MulAssign),
    ("/=", StatementOp::DivAssign),
    ("=", StatementOp::Assign),
];

/// One per-iteration assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub target: String,
    pub op: StatementOp,
    pub expr: Expr,
    pub dtype: NumericType,
    /// The declared local is never reassigned later in the block.
    pub constant: bool,
}

impl Statement {
    pub fn new(target: impl Into<String>, op: StatementOp, expr: Expr, dtype: NumericType) -> Self {
        Self {
            target: target.into(),
            op,
            expr,
            dtype,
            constant: false,
        }
    }

    /// `target := expr`
    pub fn declare(target: impl Into<String>, expr: Expr, dtype: NumericType) -> Self {
        Self::new(target, StatementOp::Declare, expr, dtype)
    }

    /// `target = expr`
    pub fn assign(target: impl Into<String>, expr: Expr, dtype: NumericType) -> Self {
        Self::new(target, StatementOp::Assign, expr, dtype)
    }

    pub fn with_constant(mut self, constant: bool) -> Self {
        self.constant = constant;
        self
    }

    /// Parse one `target op expr` line.
    pub fn parse(line: &str, default_dtype: NumericType) -> Result<Statement> {
        let (target, op, rhs_start) = split_assignment(line)?;
        let expr = Expr::parse(&line[rhs_start..]).map_err(|err| match err {
            CoreError::Parse { column, detail } => CoreError::Parse {
                column: column + rhs_start,
                detail,
            },
            other => other,
        })?;
        let dtype = if op == StatementOp::Declare && is_boolean(&expr) {
            NumericType::Bool
        } else {
            default_dtype
        };
        Ok(Statement::new(target, op, expr, dtype))
    }

    /// Parse multi-line abstract code.
    ///
    /// Blank lines and `#` comments are skipped. A declared local is marked
    /// `constant` when no later statement in the block assigns to it.
    pub fn parse_block(code: &str, default_dtype: NumericType) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        for (lineno, raw) in code.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let stmt = Statement::parse(line, default_dtype).map_err(|err| match err {
                CoreError::Parse { column, detail } => CoreError::Parse {
                    column,
                    detail: format!("line {}: {detail}", lineno + 1),
                },
                other => other,
            })?;
            statements.push(stmt);
        }
        mark_constants(&mut statements);
        Ok(statements)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.target, self.op.symbol(), self.expr)
    }
}

fn mark_constants(statements: &mut [Statement]) {
    for i in 0..statements.len() {
        if statements[i].op != StatementOp::Declare {
            continue;
        }
        let target = statements[i].target.clone();
        let reassigned = statements[i + 1..].iter().any(|s| s.target == target);
        statements[i].constant = !reassigned;
    }
}

fn is_boolean(expr: &Expr) -> bool {
    match expr {
        Expr::Binary { op, .. } => {
            op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or)
        }
        Expr::Unary { op: UnaryOp::Not, .. } => true,
        _ => false,
    }
}

/// Split a line into target, operator and the byte offset of the right-hand side.
fn split_assignment(line: &str) -> Result<(String, StatementOp, usize)> {
    let target_end = line
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(line.len(), |(i, _)| i);
    let target = &line[..target_end];
    if target.is_empty() || target.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(CoreError::Parse {
            column: 1,
            detail: format!("expected an assignment target in `{line}`"),
        });
    }

    let rest = &line[target_end..];
    let op_start = target_end + (rest.len() - rest.trim_start().len());
    let after_target = &line[op_start..];
    for (spelling, op) in STATEMENT_OPS {
        if let Some(tail) = after_target.strip_prefix(spelling) {
            // `==` is a comparison, not an assignment.
            if op == StatementOp::Assign && tail.starts_with('=') {
                break;
            }
            return Ok((target.to_string(), op, op_start + spelling.len()));
        }
    }
    Err(CoreError::Parse {
        column: op_start + 1,
        detail: format!("expected one of :=, =, +=, -=, *=, /= after `{target}`"),
    })
}
