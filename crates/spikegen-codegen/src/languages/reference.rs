//! Reference text language: abstract-code spelling with explicit loads and stores.

use spikegen_core::expr::{NEG_PRECEDENCE, NOT_PRECEDENCE};
use spikegen_core::{BinaryOp, NumericType, Scalar, UnaryOp};

use crate::error::Result;
use crate::language::{Language, OperatorSpelling};

use super::REFERENCE;

/// Renders code the way abstract code is written, for inspection and for
/// the in-process runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceLanguage;

impl Language for ReferenceLanguage {
    fn id(&self) -> &'static str {
        REFERENCE
    }

    fn type_table(&self) -> &'static [(NumericType, &'static str)] {
        &[
            (NumericType::Int32, "int32"),
            (NumericType::Int64, "int64"),
            (NumericType::Float32, "float32"),
            (NumericType::Float64, "float64"),
            (NumericType::Bool, "bool"),
        ]
    }

    fn literal(&self, value: Scalar) -> String {
        match value {
            Scalar::Bool(true) => "True".to_string(),
            Scalar::Bool(false) => "False".to_string(),
            other => other.to_string(),
        }
    }

    fn binary_operator(&self, op: BinaryOp) -> Result<OperatorSpelling> {
        Ok(OperatorSpelling::Infix(op.symbol()))
    }

    fn unary_operator(&self, op: UnaryOp) -> (&'static str, u8) {
        match op {
            UnaryOp::Neg => ("-", NEG_PRECEDENCE),
            UnaryOp::Not => ("not ", NOT_PRECEDENCE),
        }
    }

    fn terminator(&self) -> &'static str {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{render, RenderContext};
    use spikegen_core::{Expr, Namespace, VariableTable};

    #[test]
    fn rendering_reparses_to_the_same_tree() {
        let (vars, ns) = (VariableTable::new(), Namespace::new());
        let ctx = RenderContext::new(&ReferenceLanguage, &vars, &ns).with_locals(["a", "b", "c"]);
        for src in ["a + b * c", "(a + b) * c", "a ** b ** c", "(a ** b) ** c", "not a and b or c", "a // b % c"] {
            let expr = Expr::parse(src).unwrap();
            let text = render(&expr, &ctx).unwrap();
            assert_eq!(Expr::parse(&text).unwrap(), expr, "{src} -> {text}");
        }
    }

    #[test]
    fn literals() {
        assert_eq!(ReferenceLanguage.literal(Scalar::Bool(true)), "True");
        assert_eq!(ReferenceLanguage.literal(Scalar::Float(2.0)), "2.0");
        assert_eq!(ReferenceLanguage.literal(Scalar::Int(-3)), "-3");
    }
}
