//! Default function library available to every request.
//!
//! Calls to these names resolve here when the request namespace does not
//! provide a function of the same name.

use std::sync::OnceLock;

use indexmap::IndexMap;
use spikegen_core::{Function, FunctionImplementation, NumericType, Scalar};

use crate::languages::{CPP, JAVA, REFERENCE};

const CPP_CLIP: &str = "\
inline double _clip(const double value, const double a_min, const double a_max)
{
    if (value < a_min)
        return a_min;
    if (value > a_max)
        return a_max;
    return value;
}";

const CPP_INT: &str = "\
template <typename T>
inline int int_(T value)
{
    return (int)value;
}";

const RS_INT: &str = "\
static inline int32_t int_(float value) {
    return (int32_t)value;
}";

fn unary_float(name: &str, f: fn(f64) -> f64) -> Function {
    Function::new(name)
        .with_arity(1)
        .with_return_type(NumericType::Float64)
        .with_native(move |args| Scalar::Float(f(args[0].as_f64())))
}

fn same_name(mut function: Function, cpp: &str, java: &str) -> Function {
    let name = function.name().to_string();
    function.add_implementation(REFERENCE, FunctionImplementation::new(name));
    function.add_implementation(CPP, FunctionImplementation::new(cpp));
    function.add_implementation(JAVA, FunctionImplementation::new(java));
    function
}

fn build_library() -> IndexMap<String, Function> {
    let mut functions = vec![
        same_name(unary_float("exp", f64::exp), "exp", "exp"),
        same_name(unary_float("log", f64::ln), "log", "log"),
        same_name(unary_float("sqrt", f64::sqrt), "sqrt", "sqrt"),
        same_name(unary_float("sin", f64::sin), "sin", "sin"),
        same_name(unary_float("cos", f64::cos), "cos", "cos"),
        same_name(unary_float("tan", f64::tan), "tan", "tan"),
        same_name(unary_float("floor", f64::floor), "floor", "floor"),
        same_name(unary_float("ceil", f64::ceil), "ceil", "ceil"),
    ];

    functions.push(same_name(
        Function::new("abs").with_arity(1).with_native(|args| match args[0] {
            Scalar::Int(i) => Scalar::Int(i.wrapping_abs()),
            other => Scalar::Float(other.as_f64().abs()),
        }),
        "fabs",
        "fabs",
    ));

    functions.push(
        Function::new("clip")
            .with_arity(3)
            .with_return_type(NumericType::Float64)
            .with_native(|args| {
                let (value, lo, hi) = (args[0].as_f64(), args[1].as_f64(), args[2].as_f64());
                Scalar::Float(value.max(lo).min(hi))
            })
            .with_implementation(REFERENCE, FunctionImplementation::new("clip"))
            .with_implementation(CPP, FunctionImplementation::new("_clip").with_support_code(CPP_CLIP))
            .with_implementation(JAVA, FunctionImplementation::new("clamp")),
    );

    functions.push(
        Function::new("int")
            .with_arity(1)
            .with_return_type(NumericType::Int32)
            .with_native(|args| Scalar::Int(args[0].as_i64()))
            .with_implementation(REFERENCE, FunctionImplementation::new("int"))
            .with_implementation(CPP, FunctionImplementation::new("int_").with_support_code(CPP_INT))
            .with_implementation(JAVA, FunctionImplementation::new("int_").with_support_code(RS_INT)),
    );

    functions
        .into_iter()
        .map(|f| (f.name().to_string(), f))
        .collect()
}

fn library() -> &'static IndexMap<String, Function> {
    static LIBRARY: OnceLock<IndexMap<String, Function>> = OnceLock::new();
    LIBRARY.get_or_init(build_library)
}

/// The default function named `name`, if there is one.
pub fn builtin(name: &str) -> Option<&'static Function> {
    library().get(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_has_every_language() {
        let expected = ["exp", "log", "sqrt", "sin", "cos", "tan", "abs", "floor", "ceil", "clip", "int"];
        for name in expected {
            let f = builtin(name).unwrap_or_else(|| panic!("missing {name}"));
            for lang in [REFERENCE, CPP, JAVA] {
                assert!(f.implementation(lang).is_some(), "{name} lacks {lang}");
            }
            assert!(f.call(&[Scalar::Float(0.5); 3][..f.arity().unwrap_or(1)]).is_some());
        }
        assert_eq!(library().len(), expected.len());
    }

    #[test]
    fn native_semantics() {
        let clip = builtin("clip").unwrap();
        let args = [Scalar::Float(5.0), Scalar::Float(0.0), Scalar::Float(1.0)];
        assert_eq!(clip.call(&args), Some(Scalar::Float(1.0)));
        assert_eq!(builtin("abs").unwrap().call(&[Scalar::Int(-3)]), Some(Scalar::Int(3)));
        assert_eq!(builtin("abs").unwrap().call(&[Scalar::Int(i64::MIN)]), Some(Scalar::Int(i64::MIN)));
        assert_eq!(builtin("int").unwrap().call(&[Scalar::Float(2.7)]), Some(Scalar::Int(2)));
        assert_eq!(builtin("exp").unwrap().call(&[Scalar::Int(0)]), Some(Scalar::Float(1.0)));
    }

    #[test]
    fn cpp_clip_carries_support_code() {
        let imp = builtin("clip").unwrap().implementation(CPP).unwrap();
        assert_eq!(imp.name, "_clip");
        assert!(imp.support_code.as_deref().unwrap().contains("inline double _clip"));
    }
}
