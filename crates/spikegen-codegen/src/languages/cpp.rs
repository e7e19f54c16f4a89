//! C++ language.

use spikegen_core::expr::NEG_PRECEDENCE;
use spikegen_core::{float_repr, BinaryOp, NumericType, Scalar, UnaryOp};

use crate::error::Result;
use crate::language::{join_lines, FunctionFragments, Keywords, Language, OperatorSpelling};
use crate::preferences::CppPreferences;
use crate::sequence::{SequencePlan, DEFAULT_INDEX};

use super::CPP;

const DENORMALS_PREAMBLE: &str = "\
#define CSR_FLUSH_TO_ZERO (1 << 15)
unsigned csr = __builtin_ia32_stmxcsr();
csr |= CSR_FLUSH_TO_ZERO;
__builtin_ia32_ldmxcsr(csr);";

// Floor division and modulo take the sign of the divisor, for integers and
// floating point alike.
const FLOORDIV_SUPPORT: &str = "\
#include <type_traits>
template <typename T>
inline T _floordiv_impl(T a, T b, std::true_type)
{
    const T q = a / b;
    return (a % b != 0 && ((a < 0) != (b < 0))) ? q - 1 : q;
}
template <typename T>
inline T _floordiv_impl(T a, T b, std::false_type)
{
    return floor(a / b);
}
template <typename T, typename U>
inline typename std::common_type<T, U>::type _floordiv(T a, U b)
{
    typedef typename std::common_type<T, U>::type R;
    return _floordiv_impl<R>(a, b, std::is_integral<R>());
}";

const MOD_SUPPORT: &str = "\
#include <type_traits>
template <typename T>
inline T _mod_impl(T a, T b, std::true_type)
{
    const T m = a % b;
    return (m != 0 && ((m < 0) != (b < 0))) ? m + b : m;
}
template <typename T>
inline T _mod_impl(T a, T b, std::false_type)
{
    const T m = fmod(a, b);
    return (m != 0 && ((m < 0) != (b < 0))) ? m + b : m;
}
template <typename T, typename U>
inline typename std::common_type<T, U>::type _mod(T a, U b)
{
    typedef typename std::common_type<T, U>::type R;
    return _mod_impl<R>(a, b, std::is_integral<R>());
}";

/// Name of the pointer alias for a storage array.
pub fn pointer_name(storage_name: &str) -> String {
    if storage_name.starts_with('_') {
        format!("_ptr{storage_name}")
    } else {
        format!("_ptr_{storage_name}")
    }
}

/// C++ with `__restrict` pointer aliases over the storage arrays.
#[derive(Debug, Clone)]
pub struct CppLanguage {
    restrict_keyword: String,
    flush_denormals: bool,
    debug_asserts: bool,
}

impl Default for CppLanguage {
    fn default() -> Self {
        Self::from_preferences(&CppPreferences::default())
    }
}

impl CppLanguage {
    pub fn from_preferences(prefs: &CppPreferences) -> Self {
        Self {
            restrict_keyword: prefs.restrict_keyword.clone(),
            flush_denormals: prefs.flush_denormals,
            debug_asserts: prefs.debug_asserts,
        }
    }

    fn pointer_line(&self, ty: &str, storage_name: &str) -> String {
        let ptr = pointer_name(storage_name);
        if self.restrict_keyword.is_empty() {
            format!("{ty} * {ptr} = {storage_name};")
        } else {
            format!("{ty} * {} {ptr} = {storage_name};", self.restrict_keyword)
        }
    }
}

impl Language for CppLanguage {
    fn id(&self) -> &'static str {
        CPP
    }

    fn type_table(&self) -> &'static [(NumericType, &'static str)] {
        &[
            (NumericType::Int32, "int32_t"),
            (NumericType::Int64, "int64_t"),
            (NumericType::Float32, "float"),
            (NumericType::Float64, "double"),
            (NumericType::Bool, "bool"),
        ]
    }

    fn literal(&self, value: Scalar) -> String {
        match value {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) if i32::try_from(i).is_ok() => i.to_string(),
            Scalar::Int(i) => format!("{i}LL"),
            Scalar::Float(x) if x.is_nan() => "NAN".to_string(),
            Scalar::Float(x) if x.is_infinite() && x > 0.0 => "INFINITY".to_string(),
            Scalar::Float(x) if x.is_infinite() => "-INFINITY".to_string(),
            Scalar::Float(x) => float_repr(x),
        }
    }

    fn binary_operator(&self, op: BinaryOp) -> Result<OperatorSpelling> {
        Ok(match op {
            BinaryOp::Pow => OperatorSpelling::Call("pow"),
            BinaryOp::Mod => OperatorSpelling::Call("_mod"),
            BinaryOp::FloorDiv => OperatorSpelling::Call("_floordiv"),
            BinaryOp::And => OperatorSpelling::Infix("&&"),
            BinaryOp::Or => OperatorSpelling::Infix("||"),
            other => OperatorSpelling::Infix(other.symbol()),
        })
    }

    fn operator_support_code(&self, op: BinaryOp) -> Option<&'static str> {
        match op {
            BinaryOp::FloorDiv => Some(FLOORDIV_SUPPORT),
            BinaryOp::Mod => Some(MOD_SUPPORT),
            _ => None,
        }
    }

    fn unary_operator(&self, op: UnaryOp) -> (&'static str, u8) {
        match op {
            UnaryOp::Neg => ("-", NEG_PRECEDENCE),
            UnaryOp::Not => ("!", NEG_PRECEDENCE),
        }
    }

    fn array_access(&self, storage: &str, index: &str) -> String {
        format!("{}[{index}]", pointer_name(storage))
    }

    fn compile_fragments(&self, plan: &SequencePlan, functions: &FunctionFragments) -> Result<Keywords> {
        let mut keywords = Keywords::new();

        let mut pointers = Vec::new();
        let mut lengths = Vec::new();
        for array in &plan.arrays {
            pointers.push(self.pointer_line(&self.type_name(array.dtype)?, &array.storage_name));
            for name in &array.names {
                lengths.push(format!("const int _num{name} = {};", array.len));
            }
        }
        keywords.insert("pointers_lines".to_string(), join_lines(&pointers));
        keywords.insert("array_length_lines".to_string(), join_lines(&lengths));

        let defines = functions
            .defines
            .iter()
            .map(|(name, value)| format!("#define {name} {value}"));
        keywords.insert("hashdefine_lines".to_string(), join_lines(defines));

        if self.flush_denormals {
            if let Some(preamble) = self.denormal_preamble() {
                keywords.insert("denormals_code_lines".to_string(), preamble);
            }
        }

        if self.debug_asserts && !plan.iterate_all {
            let asserts = plan
                .loads
                .iter()
                .map(|l| (l.index.as_str(), l.name.as_str()))
                .chain(plan.stores.iter().map(|s| (s.index.as_str(), s.name.as_str())))
                .filter(|(index, _)| *index == DEFAULT_INDEX)
                .map(|(index, name)| format!("assert({index} < _num{name});"));
            let mut lines: Vec<String> = Vec::new();
            for line in asserts {
                if !lines.contains(&line) {
                    lines.push(line);
                }
            }
            keywords.insert("assert_lines".to_string(), join_lines(&lines));
        }

        Ok(keywords)
    }

    fn denormal_preamble(&self) -> Option<String> {
        Some(DENORMALS_PREAMBLE.to_string())
    }
}
