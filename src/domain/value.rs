use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// The state held by a simulated property.
#[derive(Clone, Debug)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    FloatArray(Vec<f64>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            Value::Bool(_) | Value::Str(_) | Value::FloatArray(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(n) if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float_array(&self) -> Option<&[f64]> {
        match self {
            Value::FloatArray(values) => Some(values),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::FloatArray(_) => "float_array",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => *a as f64 == *b,
            (Value::Float(a), Value::Int(b)) => *a == *b as f64,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::FloatArray(a), Value::FloatArray(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            // Float vs number
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", float_repr(*n)),
            Value::Bool(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            Value::Str(s) => write!(f, "{}", s),
            Value::FloatArray(values) => {
                let joined = values.iter().map(|v| float_repr(*v)).collect::<Vec<_>>().join(",");
                write!(f, "{}", joined)
            }
        }
    }
}

/// The declared type of a property in a fixture.
#[derive(PartialEq, Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int,
    Float,
    #[serde(alias = "string")]
    Str,
    Bool,
    FloatArray,
}

impl ValueType {
    /// Converts the argument of a setter query into a value of this type.
    pub fn parse(&self, text: &str) -> Result<Value, ValueError> {
        let text = text.trim();
        match self {
            ValueType::Int => text
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| parse_float(text).and_then(|f| Value::Float(f).as_i64().map(Value::Int).ok_or(())))
                .map_err(|_| ValueError::InvalidInt(text.to_string())),
            ValueType::Float => parse_float(text).map(Value::Float).map_err(|_| ValueError::InvalidFloat(text.to_string())),
            ValueType::Str => Ok(Value::Str(text.to_string())),
            ValueType::Bool => match text.to_ascii_uppercase().as_str() {
                "1" | "ON" | "TRUE" => Ok(Value::Bool(true)),
                "0" | "OFF" | "FALSE" => Ok(Value::Bool(false)),
                _ => Err(ValueError::InvalidBool(text.to_string())),
            },
            ValueType::FloatArray => {
                if text.is_empty() {
                    return Ok(Value::FloatArray(vec![]));
                }
                text.split(',')
                    .map(|part| parse_float(part.trim()).map_err(|_| ValueError::InvalidFloat(part.trim().to_string())))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::FloatArray)
            }
        }
    }

    /// Converts a value read from a fixture into this type, e.g. an integer default of a float property.
    pub fn coerce(&self, value: Value) -> Result<Value, ValueError> {
        match (self, value) {
            (ValueType::Int, Value::Int(n)) => Ok(Value::Int(n)),
            (ValueType::Int, value @ Value::Float(_)) => value.as_i64().map(Value::Int).ok_or_else(|| self.mismatch(&value)),
            (ValueType::Float, Value::Int(n)) => Ok(Value::Float(n as f64)),
            (ValueType::Float, Value::Float(n)) => Ok(Value::Float(n)),
            (ValueType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ValueType::Bool, Value::Int(n)) if n == 0 || n == 1 => Ok(Value::Bool(n == 1)),
            (ValueType::Str, Value::Str(s)) => Ok(Value::Str(s)),
            (ValueType::Str, value @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => Ok(Value::Str(value.to_string())),
            (ValueType::FloatArray, Value::FloatArray(values)) => Ok(Value::FloatArray(values)),
            (value_type, Value::Str(s)) => value_type.parse(&s),
            (_, value) => Err(self.mismatch(&value)),
        }
    }

    fn mismatch(&self, value: &Value) -> ValueError {
        ValueError::TypeMismatch {
            expected: *self,
            found: value.type_name(),
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::Bool => "bool",
            ValueType::FloatArray => "float_array",
        };
        write!(f, "{}", name)
    }
}

/// Shortest round-tripping text of a float the way Python's `repr` writes it: `5000000.0`, `1e-07`, `1.5e+16`.
pub(crate) fn float_repr(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let scientific = format!("{:e}", n);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..16).contains(&exponent) {
        let fixed = n.to_string();
        if fixed.contains('.') { fixed } else { format!("{}.0", fixed) }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

// SCPI numbers may carry an explicit '+' sign which Rust accepts, but not a trailing unit
fn parse_float(text: &str) -> Result<f64, ()> {
    text.parse::<f64>().map_err(|_| ())
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ValueError {
    #[error("'{0}' is not an integer")]
    InvalidInt(String),
    #[error("'{0}' is not a number")]
    InvalidFloat(String),
    #[error("'{0}' is not a boolean")]
    InvalidBool(String),
    #[error("expected a value of type {expected}, found {found}")]
    TypeMismatch { expected: ValueType, found: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Int(42), Value::Int(42))]
    #[case(Value::Int(42), Value::Float(42.0))]
    #[case(Value::Float(42.0), Value::Int(42))]
    #[case(Value::Float(42.7), Value::Float(42.7))]
    fn compare_equals(#[case] a: Value, #[case] b: Value) {
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));
        assert_eq!(a, b);
    }

    #[rstest]
    #[case(Value::Int(42), Value::Int(7))]
    #[case(Value::Int(42), Value::Float(41.999))]
    #[case(Value::Float(42.1), Value::Int(42))]
    #[case(Value::Float(-1.0), Value::Int(-2))]
    fn compare_greater_than(#[case] a: Value, #[case] b: Value) {
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Greater));
    }

    #[test]
    fn does_not_compare_strings_with_numbers() {
        assert_eq!(Value::Str("1".to_string()).partial_cmp(&Value::Int(1)), None);
        assert_ne!(Value::Str("1".to_string()), Value::Int(1));
    }

    #[rstest]
    #[case(ValueType::Int, "42", Value::Int(42))]
    #[case(ValueType::Int, "+42", Value::Int(42))]
    #[case(ValueType::Int, "1e3", Value::Int(1000))]
    #[case(ValueType::Float, "1.5e6", Value::Float(1.5e6))]
    #[case(ValueType::Float, " -3 ", Value::Float(-3.0))]
    #[case(ValueType::Str, "SA", Value::Str("SA".to_string()))]
    #[case(ValueType::Bool, "on", Value::Bool(true))]
    #[case(ValueType::Bool, "0", Value::Bool(false))]
    #[case(ValueType::FloatArray, "1, 2.5,-3", Value::FloatArray(vec![1.0, 2.5, -3.0]))]
    #[case(ValueType::FloatArray, "", Value::FloatArray(vec![]))]
    fn parses_valid_text(#[case] value_type: ValueType, #[case] text: &str, #[case] expected: Value) {
        assert_eq!(value_type.parse(text), Ok(expected));
    }

    #[rstest]
    #[case(ValueType::Int, "1.5", ValueError::InvalidInt("1.5".to_string()))]
    #[case(ValueType::Float, "ten", ValueError::InvalidFloat("ten".to_string()))]
    #[case(ValueType::Bool, "maybe", ValueError::InvalidBool("maybe".to_string()))]
    #[case(ValueType::FloatArray, "1,x", ValueError::InvalidFloat("x".to_string()))]
    fn fails_for_invalid_text(#[case] value_type: ValueType, #[case] text: &str, #[case] expected: ValueError) {
        assert_eq!(value_type.parse(text), Err(expected));
    }

    #[rstest]
    #[case(ValueType::Float, Value::Int(10), Value::Float(10.0))]
    #[case(ValueType::Int, Value::Float(10.0), Value::Int(10))]
    #[case(ValueType::Str, Value::Int(10), Value::Str("10".to_string()))]
    #[case(ValueType::Bool, Value::Int(1), Value::Bool(true))]
    #[case(ValueType::Float, Value::Str("2.5".to_string()), Value::Float(2.5))]
    fn coerces_fixture_values(#[case] value_type: ValueType, #[case] value: Value, #[case] expected: Value) {
        assert_eq!(value_type.coerce(value), Ok(expected));
    }

    #[test]
    fn coerce_fails_for_a_mismatching_type() {
        let result = ValueType::Int.coerce(Value::FloatArray(vec![1.0]));

        assert_eq!(
            result,
            Err(ValueError::TypeMismatch {
                expected: ValueType::Int,
                found: "float_array"
            })
        );
    }

    #[test]
    fn displays_booleans_as_scpi_numbers() {
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::FloatArray(vec![1.0, 2.5]).to_string(), "1.0,2.5");
    }

    #[rstest]
    #[case(5e6, "5000000.0")]
    #[case(1.5, "1.5")]
    #[case(-60.0, "-60.0")]
    #[case(0.0001, "0.0001")]
    #[case(1e-7, "1e-07")]
    #[case(-2.5e-5, "-2.5e-05")]
    #[case(1e16, "1e+16")]
    #[case(26.5e9, "26500000000.0")]
    #[case(1.2345e100, "1.2345e+100")]
    #[case(f64::NAN, "nan")]
    #[case(f64::NEG_INFINITY, "-inf")]
    fn displays_floats_like_python(#[case] n: f64, #[case] expected: &str) {
        assert_eq!(Value::Float(n).to_string(), expected);
    }
}
