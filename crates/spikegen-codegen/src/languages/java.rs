//! Java + RenderScript language.
//!
//! Statements become RenderScript kernel code; the host side is Java that
//! owns the arrays, wraps them in `Allocation`s and binds them to the
//! script. Each numeric type therefore has three spellings:
//!
//! | type    | Java      | RenderScript | Allocation element |
//! |---------|-----------|--------------|--------------------|
//! | int32   | `int`     | `int32_t`    | `I32`              |
//! | int64   | `long`    | `int64_t`    | `I64`              |
//! | float32 | `float`   | `float`      | `F32`              |
//! | float64 | `float`   | `float`      | `F32`              |
//! | bool    | `boolean` | `bool`       | `BOOLEAN`          |
//!
//! `float64` is narrowed to single precision unless `double_precision` is set.

use spikegen_core::expr::NEG_PRECEDENCE;
use spikegen_core::{float_repr, BinaryOp, NumericType, Scalar, UnaryOp};

use crate::error::Result;
use crate::language::{join_lines, unsupported, FunctionFragments, Keywords, Language, OperatorSpelling};
use crate::preferences::JavaPreferences;
use crate::sequence::SequencePlan;

use super::JAVA;

/// Java host code driving RenderScript kernels.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaLanguage {
    double_precision: bool,
}

impl JavaLanguage {
    pub fn from_preferences(prefs: &JavaPreferences) -> Self {
        Self {
            double_precision: prefs.double_precision,
        }
    }

    /// Java host-side spelling.
    pub fn java_type(&self, dtype: NumericType) -> &'static str {
        match dtype {
            NumericType::Int32 => "int",
            NumericType::Int64 => "long",
            NumericType::Float32 => "float",
            NumericType::Float64 if self.double_precision => "double",
            NumericType::Float64 => "float",
            NumericType::Bool => "boolean",
        }
    }

    /// `android.renderscript.Element` factory name.
    pub fn allocation_element(&self, dtype: NumericType) -> &'static str {
        match dtype {
            NumericType::Int32 => "I32",
            NumericType::Int64 => "I64",
            NumericType::Float32 => "F32",
            NumericType::Float64 if self.double_precision => "F64",
            NumericType::Float64 => "F32",
            NumericType::Bool => "BOOLEAN",
        }
    }

}

impl Language for JavaLanguage {
    fn id(&self) -> &'static str {
        JAVA
    }

    /// RenderScript spellings; `double` only in double precision.
    fn type_table(&self) -> &'static [(NumericType, &'static str)] {
        if self.double_precision {
            &[
                (NumericType::Int32, "int32_t"),
                (NumericType::Int64, "int64_t"),
                (NumericType::Float32, "float"),
                (NumericType::Float64, "double"),
                (NumericType::Bool, "bool"),
            ]
        } else {
            &[
                (NumericType::Int32, "int32_t"),
                (NumericType::Int64, "int64_t"),
                (NumericType::Float32, "float"),
                (NumericType::Float64, "float"),
                (NumericType::Bool, "bool"),
            ]
        }
    }

    fn literal(&self, value: Scalar) -> String {
        match value {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(x) if self.double_precision => match special_float(x, "") {
                Some(text) => text,
                None => float_repr(x),
            },
            Scalar::Float(x) => {
                // Finite doubles past the f32 range narrow to infinity.
                let narrowed = f64::from(x as f32);
                special_float(narrowed, "f").unwrap_or_else(|| format!("{:?}f", x as f32))
            }
        }
    }

    fn binary_operator(&self, op: BinaryOp) -> Result<OperatorSpelling> {
        Ok(match op {
            BinaryOp::Pow => OperatorSpelling::Call("pow"),
            BinaryOp::Mod => OperatorSpelling::Call("fmod"),
            BinaryOp::FloorDiv => return Err(unsupported(self, op)),
            BinaryOp::And => OperatorSpelling::Infix("&&"),
            BinaryOp::Or => OperatorSpelling::Infix("||"),
            other => OperatorSpelling::Infix(other.symbol()),
        })
    }

    fn unary_operator(&self, op: UnaryOp) -> (&'static str, u8) {
        match op {
            UnaryOp::Neg => ("-", NEG_PRECEDENCE),
            UnaryOp::Not => ("!", NEG_PRECEDENCE),
        }
    }

    fn compile_fragments(&self, plan: &SequencePlan, functions: &FunctionFragments) -> Result<Keywords> {
        let mut rs_arrays = Vec::new();
        let mut java_arrays = Vec::new();
        let mut alloc_decls = Vec::new();
        let mut java_inits = Vec::new();
        let mut alloc_inits = Vec::new();
        let mut bindings = Vec::new();
        for array in &plan.arrays {
            let storage = &array.storage_name;
            let java_ty = self.java_type(array.dtype);
            rs_arrays.push(format!("{} *{storage};", self.type_name(array.dtype)?));
            java_arrays.push(format!("{java_ty}[] {storage};"));
            alloc_decls.push(format!("Allocation {storage}_alloc;"));
            java_inits.push(format!("{storage} = new {java_ty}[{}];", array.len));
            alloc_inits.push(format!(
                "{storage}_alloc = Allocation.createSized(mRS, Element.{}(mRS), {});",
                self.allocation_element(array.dtype),
                array.len
            ));
            bindings.push(format!("mScript.bind_{storage}({storage}_alloc);"));
        }

        let scalars = plan
            .attributes
            .iter()
            .map(|a| Ok(format!("{} {};", self.type_name(a.dtype)?, a.name)))
            .collect::<Result<Vec<String>>>()?;
        let setters: Vec<String> = plan
            .attributes
            .iter()
            .map(|a| format!("mScript.set_{0}({0});", a.name))
            .collect();
        let defines = functions
            .defines
            .iter()
            .map(|(name, value)| format!("#define {name} {value}"));

        let mut keywords = Keywords::new();
        keywords.insert("rs_array_declarations".to_string(), join_lines(&rs_arrays));
        keywords.insert("rs_scalar_declarations".to_string(), join_lines(&scalars));
        keywords.insert("hashdefine_lines".to_string(), join_lines(defines));
        keywords.insert("java_array_declarations".to_string(), join_lines(&java_arrays));
        keywords.insert("allocation_declarations".to_string(), join_lines(&alloc_decls));
        keywords.insert("java_array_initialisations".to_string(), join_lines(&java_inits));
        keywords.insert("allocation_initialisations".to_string(), join_lines(&alloc_inits));
        keywords.insert("memory_bindings".to_string(), join_lines(&bindings));
        keywords.insert("attribute_setters".to_string(), join_lines(&setters));
        Ok(keywords)
    }
}

/// Non-finite values as constant expressions both Java and RenderScript accept.
fn special_float(x: f64, suffix: &str) -> Option<String> {
    if x.is_nan() {
        Some(format!("(0.0{suffix} / 0.0{suffix})"))
    } else if x.is_infinite() {
        let sign = if x > 0.0 { "" } else { "-" };
        Some(format!("({sign}1.0{suffix} / 0.0{suffix})"))
    } else {
        None
    }
}
