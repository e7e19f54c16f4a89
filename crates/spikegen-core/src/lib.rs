//! Core model for spikegen code generation.
//!
//! Holds the backend-neutral pieces every code generation request is built
//! from: typed variables, the flat namespace, functions with per-language
//! implementations, and the abstract code (statements over expressions).
//!
//! ## Modules
//!
//! - [`dtype`]: Numeric element types and literal scalars
//! - [`expr`]: Expression tree and parser
//! - [`statement`]: Abstract code statements and the block parser
//! - [`variable`]: Arrays, constants, subexpressions and attributes
//! - [`namespace`]: Name → literal / array binding / function table
//! - [`function`]: Functions and their per-language implementations
//! - [`names`]: Process-unique code object names

pub mod dtype;
pub mod error;
pub mod expr;
pub mod function;
pub mod names;
pub mod namespace;
pub mod statement;
pub mod variable;

pub use dtype::{float_repr, NumericType, Scalar};
pub use error::{CoreError, Result};
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use function::{Function, FunctionImplementation, NativeFn};
pub use names::{find_name, NameRegistry};
pub use namespace::{prepare_namespace, ArrayBinding, CollisionPolicy, Namespace, NamespaceEntry};
pub use statement::{Statement, StatementOp};
pub use variable::{
    ArrayData, ArrayHandle, ArrayVariable, AttributeVariable, ConstantVariable, Subexpression,
    ValueAccessor, Variable, VariableTable,
};
