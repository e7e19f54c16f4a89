//! Expression trees for abstract code right-hand sides.
//!
//! Expressions arrive already lowered from the model description; the
//! parser here accepts the small Python-like expression language abstract
//! code is written in (`v + dt * (-v / tau)`, `exp(-t / tau) > 0.5`, ...).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dtype::Scalar;
use crate::error::{CoreError, Result};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod => 6,
            BinaryOp::Pow => 8,
        }
    }

    /// Whether the operator groups right-to-left.
    pub fn is_right_associative(self) -> bool {
        matches!(self, BinaryOp::Pow)
    }

    /// Whether the operator yields a boolean.
    pub fn is_comparison(self) -> bool {
        self.precedence() == 4
    }

    /// Abstract-code spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Precedence of unary minus (between multiplicative operators and `**`).
pub const NEG_PRECEDENCE: u8 = 7;
/// Precedence of logical `not`.
pub const NOT_PRECEDENCE: u8 = 3;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Scalar),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Parse an expression from abstract-code syntax.
    pub fn parse(input: &str) -> Result<Expr> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression(0)?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(CoreError::Parse {
                column: tok.column,
                detail: format!("unexpected trailing token '{}'", tok.kind),
            }),
        }
    }

    /// Shorthand for a name reference.
    pub fn name(name: impl Into<String>) -> Expr {
        Expr::Name(name.into())
    }

    /// Shorthand for a literal.
    pub fn lit(value: impl Into<Scalar>) -> Expr {
        Expr::Literal(value.into())
    }

    /// Shorthand for a binary node.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Precedence of the expression's top-level node (atoms bind tightest).
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary { op: UnaryOp::Neg, .. } => NEG_PRECEDENCE,
            Expr::Unary { op: UnaryOp::Not, .. } => NOT_PRECEDENCE,
            Expr::Literal(_) | Expr::Name(_) | Expr::Call { .. } => u8::MAX,
        }
    }

    /// Free (non-function) names in order of first appearance, without duplicates.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Name(n) = e {
                if !out.contains(&n.as_str()) {
                    out.push(n.as_str());
                }
            }
        });
        out
    }

    /// Called function names in order of first appearance, without duplicates.
    pub fn functions(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Call { function, .. } = e {
                if !out.contains(&function.as_str()) {
                    out.push(function.as_str());
                }
            }
        });
        out
    }

    /// Pre-order traversal.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Name(_) => {}
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Name(n) => f.write_str(n),
            Expr::Unary { op, operand } => {
                let inner = parenthesize(operand, self.precedence(), false);
                match op {
                    UnaryOp::Neg => write!(f, "-{inner}"),
                    UnaryOp::Not => write!(f, "not {inner}"),
                }
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                let right_assoc = op.is_right_associative();
                write!(
                    f,
                    "{} {} {}",
                    parenthesize(left, prec, right_assoc || op.is_comparison()),
                    op.symbol(),
                    parenthesize(right, prec, !right_assoc)
                )
            }
            Expr::Call { function, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{function}({})", args.join(", "))
            }
        }
    }
}

fn parenthesize(expr: &Expr, parent: u8, strict: bool) -> String {
    let child = expr.precedence();
    if child < parent || (strict && child == parent) {
        format!("({expr})")
    } else {
        expr.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(s) | TokenKind::Ident(s) => f.write_str(s),
            TokenKind::Op(s) => f.write_str(s),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::Comma => f.write_str(","),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    column: usize,
}

const OPERATORS: [&str; 16] = [
    "**", "//", "<=", ">=", "==", "!=", "+", "-", "*", "/", "%", "<", ">", "!", "&", "|",
];

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            tokens.push(Token {
                kind: TokenKind::Number(chars[start..i].iter().collect()),
                column,
            });
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(chars[start..i].iter().collect()),
                column,
            });
            continue;
        }
        match c {
            '(' => tokens.push(Token { kind: TokenKind::LParen, column }),
            ')' => tokens.push(Token { kind: TokenKind::RParen, column }),
            ',' => tokens.push(Token { kind: TokenKind::Comma, column }),
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .ok_or_else(|| CoreError::Parse {
                        column,
                        detail: format!("unexpected character '{c}'"),
                    })?;
                // Single `!`, `&` and `|` only exist as prefixes of the two-character forms.
                if matches!(*op, "!" | "&" | "|") {
                    return Err(CoreError::Parse {
                        column,
                        detail: format!("unexpected character '{c}'"),
                    });
                }
                tokens.push(Token {
                    kind: TokenKind::Op(*op),
                    column,
                });
                i += op.len();
                continue;
            }
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn end_column(&self) -> usize {
        self.tokens.last().map_or(1, |t| t.column + t.kind.to_string().len())
    }

    fn peek_binary(&self) -> Option<BinaryOp> {
        let tok = self.peek()?;
        let op = match &tok.kind {
            TokenKind::Op(s) => match *s {
                "+" => BinaryOp::Add,
                "-" => BinaryOp::Sub,
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                "//" => BinaryOp::FloorDiv,
                "%" => BinaryOp::Mod,
                "**" => BinaryOp::Pow,
                "<" => BinaryOp::Lt,
                "<=" => BinaryOp::Le,
                ">" => BinaryOp::Gt,
                ">=" => BinaryOp::Ge,
                "==" => BinaryOp::Eq,
                "!=" => BinaryOp::Ne,
                _ => return None,
            },
            TokenKind::Ident(s) if s == "and" => BinaryOp::And,
            TokenKind::Ident(s) if s == "or" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing: parse operators binding at least as tight as `min_prec`.
    fn expression(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.prefix()?;
        let mut compared = false;
        while let Some(op) = self.peek_binary() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            let column = self.peek().map_or(1, |t| t.column);
            if op.is_comparison() {
                // `a < b < c` has no single reading across target languages.
                if compared {
                    return Err(CoreError::Parse {
                        column,
                        detail: format!(
                            "chained comparison '{}'; combine the comparisons with 'and'",
                            op.symbol()
                        ),
                    });
                }
                compared = true;
            }
            self.next();
            let next_min = if op.is_right_associative() { prec } else { prec + 1 };
            // `2 ** -1` is legal: the right operand of `**` may start with unary minus.
            let right = if op == BinaryOp::Pow {
                self.expression_allowing_unary(next_min)?
            } else {
                self.expression(next_min)?
            };
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn expression_allowing_unary(&mut self, min_prec: u8) -> Result<Expr> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Op("-"))) {
            self.next();
            let operand = self.expression_allowing_unary(min_prec)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.expression(min_prec)
    }

    fn prefix(&mut self) -> Result<Expr> {
        let end = self.end_column();
        let tok = self.next().ok_or(CoreError::Parse {
            column: end,
            detail: "unexpected end of expression".to_string(),
        })?;
        match tok.kind {
            TokenKind::Op("-") => {
                let operand = self.expression(NEG_PRECEDENCE)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Op("+") => self.expression(NEG_PRECEDENCE),
            TokenKind::Ident(ref s) if s == "not" => {
                let operand = self.expression(NOT_PRECEDENCE)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect_rparen()?;
                Ok(inner)
            }
            TokenKind::Number(text) => parse_number(&text, tok.column),
            TokenKind::Ident(name) => match name.as_str() {
                "True" | "true" => Ok(Expr::Literal(Scalar::Bool(true))),
                "False" | "false" => Ok(Expr::Literal(Scalar::Bool(false))),
                "and" | "or" => Err(CoreError::Parse {
                    column: tok.column,
                    detail: format!("operator '{name}' is missing its left operand"),
                }),
                _ => {
                    if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
                        self.next();
                        let args = self.arguments()?;
                        Ok(Expr::Call {
                            function: name,
                            args,
                        })
                    } else {
                        Ok(Expr::Name(name))
                    }
                }
            },
            other => Err(CoreError::Parse {
                column: tok.column,
                detail: format!("unexpected token '{other}'"),
            }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            match self.next() {
                Some(Token { kind: TokenKind::Comma, .. }) => continue,
                Some(Token { kind: TokenKind::RParen, .. }) => return Ok(args),
                Some(tok) => {
                    return Err(CoreError::Parse {
                        column: tok.column,
                        detail: format!("expected ',' or ')' in argument list, found '{}'", tok.kind),
                    })
                }
                None => {
                    return Err(CoreError::Parse {
                        column: self.end_column(),
                        detail: "unterminated argument list".to_string(),
                    })
                }
            }
        }
    }

    fn expect_rparen(&mut self) -> Result<()> {
        let end = self.end_column();
        match self.next() {
            Some(Token { kind: TokenKind::RParen, .. }) => Ok(()),
            Some(tok) => Err(CoreError::Parse {
                column: tok.column,
                detail: format!("expected ')', found '{}'", tok.kind),
            }),
            None => Err(CoreError::Parse {
                column: end,
                detail: "missing ')'".to_string(),
            }),
        }
    }
}

fn parse_number(text: &str, column: usize) -> Result<Expr> {
    let is_float = text.contains(['.', 'e', 'E']);
    let value = if is_float {
        text.parse::<f64>().map(Scalar::Float).ok()
    } else {
        text.parse::<i64>().map(Scalar::Int).ok()
    };
    value.map(Expr::Literal).ok_or_else(|| CoreError::Parse {
        column,
        detail: format!("invalid numeric literal '{text}'"),
    })
}
