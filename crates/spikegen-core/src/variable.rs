//! Variables referenced by abstract code and the table that holds them.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;

use crate::dtype::{NumericType, Scalar};
use crate::error::{CoreError, Result};
use crate::expr::Expr;

/// Late-bound value source, consulted on every invocation.
pub type ValueAccessor = Arc<dyn Fn() -> Scalar + Send + Sync>;

/// Typed element storage for one array.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
}

impl ArrayData {
    /// Zero-filled storage of `len` elements.
    pub fn zeros(dtype: NumericType, len: usize) -> Self {
        match dtype {
            NumericType::Int32 => ArrayData::Int32(vec![0; len]),
            NumericType::Int64 => ArrayData::Int64(vec![0; len]),
            NumericType::Float32 => ArrayData::Float32(vec![0.0; len]),
            NumericType::Float64 => ArrayData::Float64(vec![0.0; len]),
            NumericType::Bool => ArrayData::Bool(vec![false; len]),
        }
    }

    pub fn dtype(&self) -> NumericType {
        match self {
            ArrayData::Int32(_) => NumericType::Int32,
            ArrayData::Int64(_) => NumericType::Int64,
            ArrayData::Float32(_) => NumericType::Float32,
            ArrayData::Float64(_) => NumericType::Float64,
            ArrayData::Bool(_) => NumericType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Int32(v) => v.len(),
            ArrayData::Int64(v) => v.len(),
            ArrayData::Float32(v) => v.len(),
            ArrayData::Float64(v) => v.len(),
            ArrayData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index`, or `None` when out of bounds.
    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            ArrayData::Int32(v) => v.get(index).map(|x| Scalar::Int(i64::from(*x))),
            ArrayData::Int64(v) => v.get(index).map(|x| Scalar::Int(*x)),
            ArrayData::Float32(v) => v.get(index).map(|x| Scalar::Float(f64::from(*x))),
            ArrayData::Float64(v) => v.get(index).map(|x| Scalar::Float(*x)),
            ArrayData::Bool(v) => v.get(index).map(|x| Scalar::Bool(*x)),
        }
    }

    /// Store `value` (converted to the element type) at `index`.
    ///
    /// Returns `false` when `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: Scalar) -> bool {
        if index >= self.len() {
            return false;
        }
        match self {
            ArrayData::Int32(v) => v[index] = value.as_i64() as i32,
            ArrayData::Int64(v) => v[index] = value.as_i64(),
            ArrayData::Float32(v) => v[index] = value.as_f64() as f32,
            ArrayData::Float64(v) => v[index] = value.as_f64(),
            ArrayData::Bool(v) => v[index] = value.as_bool(),
        }
        true
    }

    /// All elements widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len())
            .filter_map(|i| self.get(i))
            .map(|s| s.as_f64())
            .collect()
    }
}

/// Shared handle to array storage owned by the surrounding simulator.
#[derive(Debug, Clone)]
pub struct ArrayHandle(Arc<RwLock<ArrayData>>);

impl ArrayHandle {
    pub fn new(data: ArrayData) -> Self {
        Self(Arc::new(RwLock::new(data)))
    }

    pub fn zeros(dtype: NumericType, len: usize) -> Self {
        Self::new(ArrayData::zeros(dtype, len))
    }

    pub fn from_f64(values: Vec<f64>) -> Self {
        Self::new(ArrayData::Float64(values))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ArrayData> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ArrayData> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two handles refer to the same storage.
    pub fn same_storage(&self, other: &ArrayHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A variable backed by array storage, accessed at a per-iteration index.
#[derive(Debug, Clone)]
pub struct ArrayVariable {
    /// Program-wide unique storage name (e.g. `_array_neurons_v`).
    pub storage_name: String,
    /// Element type.
    pub dtype: NumericType,
    /// Logical length at generation time.
    pub len: usize,
    /// Whether the length is fixed for the lifetime of the generated code.
    pub constant: bool,
    /// Storage handle used by in-process execution.
    pub data: Option<ArrayHandle>,
}

impl ArrayVariable {
    pub fn new(storage_name: impl Into<String>, dtype: NumericType, len: usize) -> Self {
        Self {
            storage_name: storage_name.into(),
            dtype,
            len,
            constant: true,
            data: None,
        }
    }

    /// Attach shared storage; the logical length follows the storage.
    pub fn with_data(mut self, data: ArrayHandle) -> Self {
        self.len = data.len();
        self.data = Some(data);
        self
    }

    /// Mark the array as resizable between invocations.
    pub fn dynamic(mut self) -> Self {
        self.constant = false;
        self
    }

    /// Current length: the storage length when attached, else the declared length.
    pub fn current_len(&self) -> usize {
        self.data.as_ref().map_or(self.len, ArrayHandle::len)
    }
}

/// A scalar known at generation time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantVariable {
    pub value: Scalar,
    pub dtype: NumericType,
    /// Inline as a literal (`true`) or keep as a named constant declaration.
    pub frozen: bool,
}

/// A named alias for another expression; always inlined.
#[derive(Debug, Clone, PartialEq)]
pub struct Subexpression {
    pub dtype: NumericType,
    pub expr: Expr,
}

/// A scalar whose value is fetched through an accessor on each invocation.
#[derive(Clone)]
pub struct AttributeVariable {
    pub dtype: NumericType,
    pub accessor: ValueAccessor,
}

impl AttributeVariable {
    pub fn new(dtype: NumericType, accessor: impl Fn() -> Scalar + Send + Sync + 'static) -> Self {
        Self {
            dtype,
            accessor: Arc::new(accessor),
        }
    }

    /// Fetch the current value, converted to the declared type.
    pub fn value(&self) -> Scalar {
        (self.accessor)().cast(self.dtype)
    }
}

impl fmt::Debug for AttributeVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeVariable")
            .field("dtype", &self.dtype)
            .field("accessor", &"<fn>")
            .finish()
    }
}

/// A typed binding referenced by generated code.
#[derive(Debug, Clone)]
pub enum Variable {
    Array(ArrayVariable),
    Constant(ConstantVariable),
    Subexpression(Subexpression),
    Attribute(AttributeVariable),
}

impl Variable {
    /// Array variable shorthand.
    pub fn array(storage_name: impl Into<String>, dtype: NumericType, len: usize) -> Self {
        Variable::Array(ArrayVariable::new(storage_name, dtype, len))
    }

    /// Frozen constant shorthand; the type follows the value.
    pub fn constant(value: impl Into<Scalar>) -> Self {
        let value: Scalar = value.into();
        Variable::Constant(ConstantVariable {
            value,
            dtype: value.natural_type(),
            frozen: true,
        })
    }

    /// Named (non-inlined) constant shorthand.
    pub fn named_constant(value: impl Into<Scalar>, dtype: NumericType) -> Self {
        let value: Scalar = value.into();
        Variable::Constant(ConstantVariable {
            value: value.cast(dtype),
            dtype,
            frozen: false,
        })
    }

    /// Subexpression shorthand.
    pub fn subexpression(dtype: NumericType, expr: Expr) -> Self {
        Variable::Subexpression(Subexpression { dtype, expr })
    }

    /// Attribute shorthand.
    pub fn attribute(
        dtype: NumericType,
        accessor: impl Fn() -> Scalar + Send + Sync + 'static,
    ) -> Self {
        Variable::Attribute(AttributeVariable::new(dtype, accessor))
    }

    pub fn dtype(&self) -> NumericType {
        match self {
            Variable::Array(a) => a.dtype,
            Variable::Constant(c) => c.dtype,
            Variable::Subexpression(s) => s.dtype,
            Variable::Attribute(a) => a.dtype,
        }
    }

    /// Whether the value is fixed for the lifetime of the generated code.
    pub fn is_constant(&self) -> bool {
        match self {
            Variable::Array(a) => a.constant,
            Variable::Constant(_) => true,
            Variable::Subexpression(_) | Variable::Attribute(_) => false,
        }
    }

    /// Whether the variable holds a single value rather than an array.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Variable::Array(_))
    }

    pub fn as_array(&self) -> Option<&ArrayVariable> {
        match self {
            Variable::Array(a) => Some(a),
            _ => None,
        }
    }
}

/// Ordered name → variable table supplied with every generation request.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    vars: IndexMap<String, Variable>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, var: Variable) -> Self {
        self.insert(name, var);
        self
    }

    /// Insert or replace a variable, returning the previous definition.
    pub fn insert(&mut self, name: impl Into<String>, var: Variable) -> Option<Variable> {
        self.vars.insert(name.into(), var)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// The array variable named `name`, if that name is an array.
    pub fn array(&self, name: &str) -> Option<&ArrayVariable> {
        self.get(name).and_then(Variable::as_array)
    }

    /// Look up a variable or fail with an unresolvable-reference error.
    pub fn require(&self, name: &str) -> Result<&Variable> {
        self.get(name).ok_or_else(|| CoreError::UnresolvedReference {
            name: name.to_string(),
            context: None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Array variables in insertion order.
    pub fn arrays(&self) -> impl Iterator<Item = (&str, &ArrayVariable)> {
        self.vars
            .iter()
            .filter_map(|(k, v)| v.as_array().map(|a| (k.as_str(), a)))
    }

    /// Extend with every entry of `other`, replacing existing names.
    pub fn extend(&mut self, other: VariableTable) {
        self.vars.extend(other.vars);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Reject definitions that can never generate valid code.
    pub fn validate(&self) -> Result<()> {
        for (name, var) in self.iter() {
            if let Variable::Array(array) = var {
                if array.storage_name.is_empty() {
                    return Err(CoreError::InvalidVariable {
                        name: name.to_string(),
                        detail: "array variable has an empty storage name".to_string(),
                    });
                }
                if let Some(data) = &array.data {
                    let data_type = data.read().dtype();
                    if data_type != array.dtype {
                        return Err(CoreError::InvalidVariable {
                            name: name.to_string(),
                            detail: format!(
                                "declared as {} but storage holds {}",
                                array.dtype, data_type
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_data_get_set() {
        let mut data = ArrayData::zeros(NumericType::Int32, 3);
        assert!(data.set(1, Scalar::Float(4.7)));
        assert_eq!(data.get(1), Some(Scalar::Int(4)));
        assert!(!data.set(3, Scalar::Int(1)));
        assert_eq!(data.get(3), None);
    }

    #[test]
    fn shared_handles_see_writes() {
        let handle = ArrayHandle::from_f64(vec![1.0, 2.0]);
        let alias = handle.clone();
        alias.write().set(0, Scalar::Float(9.0));
        assert_eq!(handle.read().get(0), Some(Scalar::Float(9.0)));
        assert!(handle.same_storage(&alias));
    }

    #[test]
    fn attribute_value_is_late_bound() {
        use std::sync::atomic::{AtomicI64, Ordering};
        let counter = Arc::new(AtomicI64::new(0));
        let source = counter.clone();
        let attr = AttributeVariable::new(NumericType::Int64, move || {
            Scalar::Int(source.load(Ordering::SeqCst))
        });
        assert_eq!(attr.value(), Scalar::Int(0));
        counter.store(5, Ordering::SeqCst);
        assert_eq!(attr.value(), Scalar::Int(5));
    }

    #[test]
    fn table_preserves_insertion_order() {
        let table = VariableTable::new()
            .with("v", Variable::array("_array_v", NumericType::Float64, 3))
            .with("tau", Variable::constant(10.0))
            .with("w", Variable::array("_array_w", NumericType::Float64, 3));
        let arrays: Vec<&str> = table.arrays().map(|(n, _)| n).collect();
        assert_eq!(arrays, vec!["v", "w"]);
        assert!(table.require("ghost").is_err());
        assert!(table.get("tau").unwrap().is_constant());
    }

    #[test]
    fn validate_rejects_mismatched_storage() {
        let var = ArrayVariable::new("_array_v", NumericType::Int32, 2)
            .with_data(ArrayHandle::from_f64(vec![0.0, 1.0]));
        let table = VariableTable::new().with("v", Variable::Array(var));
        assert!(matches!(
            table.validate(),
            Err(CoreError::InvalidVariable { .. })
        ));
    }

    #[test]
    fn dynamic_array_tracks_storage_length() {
        let handle = ArrayHandle::zeros(NumericType::Float64, 2);
        let var = ArrayVariable::new("_dyn", NumericType::Float64, 0)
            .with_data(handle.clone())
            .dynamic();
        assert!(!Variable::Array(var.clone()).is_constant());
        *handle.write() = ArrayData::zeros(NumericType::Float64, 7);
        assert_eq!(var.current_len(), 7);
    }
}
