use std::collections::HashMap;

use indexmap::IndexMap;
use spikegen_core::{
    ArrayData, ArrayHandle, BinaryOp, Expr, NamespaceEntry, NumericType, Scalar, StatementOp,
    UnaryOp, Variable,
};
use tracing::{debug, trace};

use crate::codeobject::{CodeObject, GeneratedCode, InvokeOutcome, ITERATION_COUNT};
use crate::error::{CodegenError, Result};
use crate::sequence::{LoadStep, DEFAULT_INDEX};
use crate::template::RuntimeKernel;

/// Local holding the threshold condition.
const CONDITION: &str = "_cond";
/// Array the threshold kernel publishes its spikes to, when present.
const SPIKES: &str = "_spikes";

const MAX_SUBEXPRESSION_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Local {
    value: Scalar,
    dtype: NumericType,
}

/// Values visible to one iteration.
struct Frame<'a> {
    /// Attribute values fetched for this invocation.
    attributes: &'a HashMap<String, Scalar>,
    locals: HashMap<String, Local>,
}

/// A code object executed by interpreting its compiled plan.
#[derive(Debug)]
pub struct RuntimeCodeObject {
    generated: GeneratedCode,
    /// Storage name → shared array storage.
    storage: IndexMap<String, ArrayHandle>,
}

impl RuntimeCodeObject {
    /// Bind the storage of every array the plan touches.
    pub fn new(generated: GeneratedCode) -> Result<Self> {
        let mut storage = IndexMap::new();
        for decl in &generated.plan.arrays {
            let handle = decl.names.iter().find_map(|name| {
                generated
                    .variables
                    .array(name)
                    .and_then(|array| array.data.clone())
            });
            match handle {
                Some(handle) => {
                    storage.insert(decl.storage_name.clone(), handle);
                }
                None => {
                    return Err(CodegenError::Runtime {
                        codeobject: generated.name.clone(),
                        message: format!("array '{}' has no storage attached", decl.storage_name),
                    });
                }
            }
        }
        Ok(Self { generated, storage })
    }

    fn error(&self, message: impl Into<String>) -> CodegenError {
        CodegenError::Runtime {
            codeobject: self.generated.name.clone(),
            message: message.into(),
        }
    }

    /// Fetch every attribute once per invocation.
    fn refresh_attributes(&self) -> HashMap<String, Scalar> {
        self.generated
            .variables
            .iter()
            .filter_map(|(name, var)| match var {
                Variable::Attribute(attr) => Some((name.to_string(), attr.value().cast(attr.dtype))),
                _ => None,
            })
            .collect()
    }

    /// Number of indices a dense kernel visits: `N` when defined, otherwise
    /// the length of the first array indexed by `_idx`.
    fn iteration_count(&self, attributes: &HashMap<String, Scalar>) -> Result<usize> {
        let declared = match self.generated.variables.get(ITERATION_COUNT) {
            Some(Variable::Constant(c)) => Some(c.value),
            Some(Variable::Attribute(_)) => attributes.get(ITERATION_COUNT).copied(),
            _ => self
                .generated
                .namespace
                .get(ITERATION_COUNT)
                .and_then(NamespaceEntry::as_literal),
        };
        if let Some(value) = declared {
            return usize::try_from(value.as_i64())
                .map_err(|_| self.error(format!("negative iteration count {value}")));
        }

        let plan = &self.generated.plan;
        let storage_name = plan
            .loads
            .iter()
            .map(|l| (l.index.as_str(), l.storage_name.as_str()))
            .chain(plan.stores.iter().map(|s| (s.index.as_str(), s.storage_name.as_str())))
            .find(|(index, _)| *index == DEFAULT_INDEX)
            .map(|(_, storage)| storage);
        match storage_name.and_then(|s| self.storage.get(s)) {
            Some(handle) => Ok(handle.len()),
            None => Err(self.error(format!(
                "cannot determine the iteration count; define '{ITERATION_COUNT}' or read an array indexed by '{DEFAULT_INDEX}'"
            ))),
        }
    }

    /// Indices stored in the `subset` array.
    fn subset_indices(&self, subset: &str) -> Result<Vec<usize>> {
        let handle = self
            .generated
            .variables
            .array(subset)
            .and_then(|array| array.data.as_ref())
            .ok_or_else(|| self.error(format!("subset array '{subset}' has no storage attached")))?;
        let data = handle.read();
        let indices = (0..data.len())
            .filter_map(|i| data.get(i))
            .map(|value| {
                usize::try_from(value.as_i64())
                    .map_err(|_| self.error(format!("negative index {value} in '{subset}'")))
            })
            .collect();
        indices
    }

    fn read_element(&self, storage_name: &str, index: usize) -> Result<Scalar> {
        let handle = self
            .storage
            .get(storage_name)
            .ok_or_else(|| self.error(format!("array '{storage_name}' is not bound")))?;
        let value = handle.read().get(index);
        value.ok_or_else(|| {
            self.error(format!(
                "index {index} out of bounds for '{storage_name}' (length {})",
                handle.len()
            ))
        })
    }

    fn write_element(&self, storage_name: &str, index: usize, value: Scalar) -> Result<()> {
        let handle = self
            .storage
            .get(storage_name)
            .ok_or_else(|| self.error(format!("array '{storage_name}' is not bound")))?;
        let stored = handle.write().set(index, value);
        if stored {
            Ok(())
        } else {
            Err(self.error(format!(
                "index {index} out of bounds for '{storage_name}' (length {})",
                handle.len()
            )))
        }
    }

    fn index_value(&self, frame: &Frame<'_>, index: &str) -> Result<usize> {
        let local = frame
            .locals
            .get(index)
            .ok_or_else(|| self.error(format!("index '{index}' is not bound by this kernel")))?;
        usize::try_from(local.value.as_i64())
            .map_err(|_| self.error(format!("negative value {} for index '{index}'", local.value)))
    }

    fn load(&self, frame: &mut Frame<'_>, load: &LoadStep) -> Result<()> {
        let index = self.index_value(frame, &load.index)?;
        let value = self.read_element(&load.storage_name, index)?;
        frame.locals.insert(
            load.name.clone(),
            Local {
                value: value.cast(load.dtype),
                dtype: load.dtype,
            },
        );
        Ok(())
    }

    /// Run the per-iteration code for one index; returns the final locals.
    fn run_index<'a>(
        &self,
        idx: usize,
        attributes: &'a HashMap<String, Scalar>,
    ) -> Result<Frame<'a>> {
        let plan = &self.generated.plan;
        let mut frame = Frame {
            attributes,
            locals: HashMap::new(),
        };
        frame.locals.insert(
            DEFAULT_INDEX.to_string(),
            Local {
                value: Scalar::Int(i64::try_from(idx).unwrap_or(i64::MAX)),
                dtype: NumericType::Int64,
            },
        );

        for load in &plan.index_loads {
            self.load(&mut frame, load)?;
        }
        for load in &plan.loads {
            self.load(&mut frame, load)?;
        }
        for (name, dtype) in &plan.declarations {
            frame.locals.insert(
                name.clone(),
                Local {
                    value: dtype.zero(),
                    dtype: *dtype,
                },
            );
        }

        for stmt in &plan.statements {
            let value = self.eval(&stmt.expr, &frame, 0)?;
            let existing = frame.locals.get(&stmt.target).copied();
            let value = match (stmt.op.binary_op(), existing) {
                (None, _) => value,
                (Some(op), Some(current)) => self.binary(op, current.value, value)?,
                (Some(_), None) => {
                    return Err(self.error(format!("'{}' is updated before it is assigned", stmt.target)));
                }
            };
            let dtype = match (stmt.op, existing) {
                (StatementOp::Declare, _) | (_, None) => stmt.dtype,
                (_, Some(current)) => current.dtype,
            };
            frame.locals.insert(
                stmt.target.clone(),
                Local {
                    value: value.cast(dtype),
                    dtype,
                },
            );
        }

        for store in &plan.stores {
            let index = self.index_value(&frame, &store.index)?;
            let value = frame
                .locals
                .get(&store.name)
                .map(|l| l.value)
                .ok_or_else(|| self.error(format!("'{}' was never assigned", store.name)))?;
            self.write_element(&store.storage_name, index, value)?;
        }
        Ok(frame)
    }

    fn eval(&self, expr: &Expr, frame: &Frame<'_>, depth: usize) -> Result<Scalar> {
        match expr {
            Expr::Literal(value) => Ok(*value),
            Expr::Name(name) => self.lookup(name, frame, depth),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, frame, depth)?;
                Ok(match (op, value) {
                    (UnaryOp::Not, v) => Scalar::Bool(!v.as_bool()),
                    (UnaryOp::Neg, Scalar::Float(x)) => Scalar::Float(-x),
                    (UnaryOp::Neg, v) => Scalar::Int(v.as_i64().wrapping_neg()),
                })
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let result = self.eval(left, frame, depth)?.as_bool() && self.eval(right, frame, depth)?.as_bool();
                Ok(Scalar::Bool(result))
            }
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let result = self.eval(left, frame, depth)?.as_bool() || self.eval(right, frame, depth)?.as_bool();
                Ok(Scalar::Bool(result))
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, frame, depth)?;
                let r = self.eval(right, frame, depth)?;
                self.binary(*op, l, r)
            }
            Expr::Call { function, args } => {
                let f = self
                    .generated
                    .functions
                    .get(function)
                    .ok_or_else(|| self.error(format!("function '{function}' is not available")))?;
                if let Some(arity) = f.arity() {
                    if arity != args.len() {
                        return Err(self.error(format!(
                            "{function}() takes {arity} argument(s), {} given",
                            args.len()
                        )));
                    }
                }
                let values = args
                    .iter()
                    .map(|a| self.eval(a, frame, depth))
                    .collect::<Result<Vec<_>>>()?;
                let result = f
                    .call(&values)
                    .ok_or_else(|| self.error(format!("function '{function}' cannot be evaluated in-process")))?;
                Ok(match f.return_type() {
                    Some(dtype) => result.cast(dtype),
                    None => result,
                })
            }
        }
    }

    fn lookup(&self, name: &str, frame: &Frame<'_>, depth: usize) -> Result<Scalar> {
        if let Some(local) = frame.locals.get(name) {
            return Ok(local.value);
        }
        if let Some(value) = frame.attributes.get(name) {
            return Ok(*value);
        }
        match self.generated.variables.get(name) {
            Some(Variable::Constant(c)) => return Ok(c.value.cast(c.dtype)),
            Some(Variable::Subexpression(sub)) => {
                if depth >= MAX_SUBEXPRESSION_DEPTH {
                    return Err(self.error(format!("subexpression '{name}' refers back to itself")));
                }
                return Ok(self.eval(&sub.expr, frame, depth + 1)?.cast(sub.dtype));
            }
            _ => {}
        }
        match self.generated.namespace.get(name) {
            Some(NamespaceEntry::Literal(value)) => Ok(*value),
            _ => Err(self.error(format!("'{name}' has no value"))),
        }
    }

    fn binary(&self, op: BinaryOp, l: Scalar, r: Scalar) -> Result<Scalar> {
        binary(op, l, r).map_err(|message| self.error(message))
    }

    /// Replace the contents of `_spikes` with the indices that crossed threshold.
    fn publish_spikes(&self, spikes: &[usize]) {
        let Some(array) = self.generated.variables.array(SPIKES) else {
            return;
        };
        let Some(handle) = &array.data else {
            return;
        };
        let mut data = ArrayData::zeros(array.dtype, spikes.len());
        for (i, idx) in spikes.iter().enumerate() {
            data.set(i, Scalar::Int(i64::try_from(*idx).unwrap_or(i64::MAX)));
        }
        *handle.write() = data;
    }
}

impl CodeObject for RuntimeCodeObject {
    fn generated(&self) -> &GeneratedCode {
        &self.generated
    }

    fn invoke(&mut self) -> Result<InvokeOutcome> {
        let attributes = self.refresh_attributes();
        let kernel = &self.generated.meta.kernel;
        let indices: Vec<usize> = match kernel {
            RuntimeKernel::StateUpdate | RuntimeKernel::Threshold => {
                (0..self.iteration_count(&attributes)?).collect()
            }
            RuntimeKernel::Reset { subset } => self.subset_indices(subset)?,
        };
        trace!(codeobject = %self.generated.name, iterations = indices.len(), "invoking");

        let threshold = *kernel == RuntimeKernel::Threshold;
        let mut spikes = Vec::new();
        for &idx in &indices {
            let frame = self.run_index(idx, &attributes)?;
            if threshold {
                let cond = frame
                    .locals
                    .get(CONDITION)
                    .ok_or_else(|| self.error(format!("threshold code must assign '{CONDITION}'")))?;
                if cond.value.as_bool() {
                    spikes.push(idx);
                }
            }
        }

        if threshold {
            self.publish_spikes(&spikes);
            debug!(codeobject = %self.generated.name, spikes = spikes.len(), "threshold crossed");
        }
        Ok(InvokeOutcome {
            iterations: indices.len(),
            spikes: threshold.then_some(spikes),
        })
    }
}

/// Arithmetic and comparison with integer results for integer operands.
fn binary(op: BinaryOp, l: Scalar, r: Scalar) -> std::result::Result<Scalar, String> {
    let ints = match (l, r) {
        (Scalar::Float(_), _) | (_, Scalar::Float(_)) => None,
        _ => Some((l.as_i64(), r.as_i64())),
    };
    let (a, b) = (l.as_f64(), r.as_f64());
    let value = match (op, ints) {
        (BinaryOp::Add, Some((x, y))) => Scalar::Int(x.wrapping_add(y)),
        (BinaryOp::Add, None) => Scalar::Float(a + b),
        (BinaryOp::Sub, Some((x, y))) => Scalar::Int(x.wrapping_sub(y)),
        (BinaryOp::Sub, None) => Scalar::Float(a - b),
        (BinaryOp::Mul, Some((x, y))) => Scalar::Int(x.wrapping_mul(y)),
        (BinaryOp::Mul, None) => Scalar::Float(a * b),
        (BinaryOp::Div, _) => Scalar::Float(a / b),
        (BinaryOp::FloorDiv | BinaryOp::Mod, Some((_, 0))) => {
            return Err("integer division by zero".to_string());
        }
        (BinaryOp::FloorDiv, Some((x, y))) => {
            let q = x.wrapping_div(y);
            Scalar::Int(if x.wrapping_rem(y) != 0 && (x < 0) != (y < 0) { q - 1 } else { q })
        }
        (BinaryOp::FloorDiv, None) => Scalar::Float((a / b).floor()),
        (BinaryOp::Mod, Some((x, y))) => {
            let m = x.wrapping_rem(y);
            Scalar::Int(if m != 0 && (m < 0) != (y < 0) { m + y } else { m })
        }
        (BinaryOp::Mod, None) => Scalar::Float(a - b * (a / b).floor()),
        (BinaryOp::Pow, Some((x, y))) if (0..=i64::from(u32::MAX)).contains(&y) => {
            Scalar::Int(x.wrapping_pow(y as u32))
        }
        (BinaryOp::Pow, _) => Scalar::Float(a.powf(b)),
        (BinaryOp::Lt, Some((x, y))) => Scalar::Bool(x < y),
        (BinaryOp::Lt, None) => Scalar::Bool(a < b),
        (BinaryOp::Le, Some((x, y))) => Scalar::Bool(x <= y),
        (BinaryOp::Le, None) => Scalar::Bool(a <= b),
        (BinaryOp::Gt, Some((x, y))) => Scalar::Bool(x > y),
        (BinaryOp::Gt, None) => Scalar::Bool(a > b),
        (BinaryOp::Ge, Some((x, y))) => Scalar::Bool(x >= y),
        (BinaryOp::Ge, None) => Scalar::Bool(a >= b),
        (BinaryOp::Eq, Some((x, y))) => Scalar::Bool(x == y),
        (BinaryOp::Eq, None) => Scalar::Bool(a == b),
        (BinaryOp::Ne, Some((x, y))) => Scalar::Bool(x != y),
        (BinaryOp::Ne, None) => Scalar::Bool(a != b),
        (BinaryOp::And, _) => Scalar::Bool(l.as_bool() && r.as_bool()),
        (BinaryOp::Or, _) => Scalar::Bool(l.as_bool() || r.as_bool()),
    };
    Ok(value)
}
