use crate::domain::Value;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Checks values before they are sent to an instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    Strings(Strings),
    Numbers(Numbers),
    Ints(Ints),
    Enum(Vec<Value>),
    MultiType(Vec<Validator>),
}

impl Validator {
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match self {
            Validator::Strings(strings) => strings.validate(value),
            Validator::Numbers(numbers) => numbers.validate(value),
            Validator::Ints(ints) => ints.validate(value),
            Validator::Enum(values) => {
                if values.contains(value) {
                    Ok(())
                } else {
                    Err(ValidationError::OutOfRange {
                        value: value.to_string(),
                        validator: self.to_string(),
                    })
                }
            }
            Validator::MultiType(validators) => {
                let mut out_of_range = None;
                for validator in validators {
                    match validator.validate(value) {
                        Ok(()) => return Ok(()),
                        Err(ValidationError::OutOfRange { .. }) => {
                            out_of_range.get_or_insert(ValidationError::OutOfRange {
                                value: value.to_string(),
                                validator: self.to_string(),
                            });
                        }
                        Err(ValidationError::WrongType { .. }) => {}
                    }
                }
                Err(out_of_range.unwrap_or_else(|| ValidationError::WrongType {
                    found: value.type_name(),
                    validator: self.to_string(),
                }))
            }
        }
    }

    /// Builds a `MultiType`, which needs at least one validator.
    pub fn multi_type(validators: Vec<Validator>) -> Result<Validator, ValidatorError> {
        if validators.is_empty() {
            return Err(ValidatorError::EmptyMultiType);
        }
        Ok(Validator::MultiType(validators))
    }

    /// Builds an `Enum`, which needs at least one value.
    pub fn one_of(values: Vec<Value>) -> Result<Validator, ValidatorError> {
        if values.is_empty() {
            return Err(ValidatorError::EmptyEnum);
        }
        Ok(Validator::Enum(values))
    }
}

impl Display for Validator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Validator::Strings(strings) => write!(f, "<{}>", strings),
            Validator::Numbers(numbers) => write!(f, "<{}>", numbers),
            Validator::Ints(ints) => write!(f, "<{}>", ints),
            Validator::Enum(values) => {
                let values = values.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "<Enum: {{{}}}>", values.join(", "))
            }
            Validator::MultiType(validators) => {
                let parts = validators
                    .iter()
                    .map(|v| {
                        let text = v.to_string();
                        text[1..text.len() - 1].to_string()
                    })
                    .collect::<Vec<_>>();
                write!(f, "<MultiType: {}>", parts.join(", "))
            }
        }
    }
}

/// Text whose length, counted in characters, lies within bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strings {
    min_length: usize,
    max_length: Option<usize>,
}

impl Strings {
    pub fn new(min_length: usize, max_length: Option<usize>) -> Result<Self, ValidatorError> {
        if let Some(max_length) = max_length {
            if max_length < 1 {
                return Err(ValidatorError::MaxLengthTooSmall);
            }
            if max_length < min_length {
                return Err(ValidatorError::InvertedRange {
                    min: min_length.to_string(),
                    max: max_length.to_string(),
                });
            }
        }
        Ok(Strings { min_length, max_length })
    }

    pub fn any() -> Self {
        Strings {
            min_length: 0,
            max_length: None,
        }
    }

    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let Some(text) = value.as_str() else {
            return Err(ValidationError::WrongType {
                found: value.type_name(),
                validator: Validator::Strings(self.clone()).to_string(),
            });
        };

        let length = text.chars().count();
        if length < self.min_length || self.max_length.is_some_and(|max| length > max) {
            return Err(ValidationError::OutOfRange {
                value: format!("'{}' (length {})", text, length),
                validator: Validator::Strings(self.clone()).to_string(),
            });
        }
        Ok(())
    }
}

impl Display for Strings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.min_length, self.max_length) {
            (0, None) => write!(f, "Strings"),
            (min, None) => write!(f, "Strings len>={}", min),
            (0, Some(max)) => write!(f, "Strings len<={}", max),
            (min, Some(max)) if min == max => write!(f, "Strings len={}", min),
            (min, Some(max)) => write!(f, "Strings {}<=len<={}", min, max),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Numbers {
    min: Option<f64>,
    max: Option<f64>,
}

impl Numbers {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Result<Self, ValidatorError> {
        if let (Some(min), Some(max)) = (min, max)
            && max < min
        {
            return Err(ValidatorError::InvertedRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(Numbers { min, max })
    }

    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let Some(number) = value.as_f64() else {
            return Err(ValidationError::WrongType {
                found: value.type_name(),
                validator: Validator::Numbers(self.clone()).to_string(),
            });
        };
        if !in_range(number, self.min, self.max) {
            return Err(ValidationError::OutOfRange {
                value: value.to_string(),
                validator: Validator::Numbers(self.clone()).to_string(),
            });
        }
        Ok(())
    }
}

impl Display for Numbers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Numbers{}", range_text(self.min, self.max))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ints {
    min: Option<i64>,
    max: Option<i64>,
}

impl Ints {
    pub fn new(min: Option<i64>, max: Option<i64>) -> Result<Self, ValidatorError> {
        if let (Some(min), Some(max)) = (min, max)
            && max < min
        {
            return Err(ValidatorError::InvertedRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(Ints { min, max })
    }

    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let Value::Int(number) = value else {
            return Err(ValidationError::WrongType {
                found: value.type_name(),
                validator: Validator::Ints(self.clone()).to_string(),
            });
        };
        if self.min.is_some_and(|min| *number < min) || self.max.is_some_and(|max| *number > max) {
            return Err(ValidationError::OutOfRange {
                value: value.to_string(),
                validator: Validator::Ints(self.clone()).to_string(),
            });
        }
        Ok(())
    }
}

impl Display for Ints {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ints{}", range_text(self.min, self.max))
    }
}

fn in_range(number: f64, min: Option<f64>, max: Option<f64>) -> bool {
    !number.is_nan() && min.is_none_or(|min| number >= min) && max.is_none_or(|max| number <= max)
}

fn range_text<T: Display>(min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (None, None) => String::new(),
        (Some(min), None) => format!(" v>={}", min),
        (None, Some(max)) => format!(" v<={}", max),
        (Some(min), Some(max)) => format!(" {}<=v<={}", min, max),
    }
}

/// A value rejected by a [`Validator`].
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ValidationError {
    #[error("a value of type {found} is not accepted by {validator}")]
    WrongType { found: &'static str, validator: String },
    #[error("{value} is invalid: must satisfy {validator}")]
    OutOfRange { value: String, validator: String },
}

/// A [`Validator`] that cannot be built.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ValidatorError {
    #[error("max_length must be at least 1")]
    MaxLengthTooSmall,
    #[error("max {max} must not be smaller than min {min}")]
    InvertedRange { min: String, max: String },
    #[error("an Enum needs at least one value")]
    EmptyEnum,
    #[error("a MultiType needs at least one validator")]
    EmptyMultiType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn text(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    #[rstest]
    #[case(0, None, "<Strings>")]
    #[case(100, None, "<Strings len>=100>")]
    #[case(0, Some(100), "<Strings len<=100>")]
    #[case(1, Some(10), "<Strings 1<=len<=10>")]
    #[case(10, Some(10), "<Strings len=10>")]
    fn strings_display_their_bounds(#[case] min: usize, #[case] max: Option<usize>, #[case] expected: &str) {
        let validator = Validator::Strings(Strings::new(min, max).unwrap());

        assert_eq!(validator.to_string(), expected);
    }

    #[test]
    fn strings_reject_impossible_bounds() {
        assert_eq!(
            Strings::new(10, Some(9)),
            Err(ValidatorError::InvertedRange {
                min: "10".to_string(),
                max: "9".to_string()
            })
        );
        assert_eq!(Strings::new(0, Some(0)), Err(ValidatorError::MaxLengthTooSmall));
    }

    #[rstest]
    #[case("", true)]
    #[case("ab", true)]
    #[case("ÄÖÜ", true)]
    #[case("漢字テスト", false)]
    #[case("abcd", false)]
    fn strings_count_characters_not_bytes(#[case] input: &str, #[case] valid: bool) {
        let validator = Validator::Strings(Strings::new(0, Some(3)).unwrap());

        assert_eq!(validator.validate(&text(input)).is_ok(), valid);
    }

    #[test]
    fn strings_tell_wrong_types_from_wrong_lengths() {
        let validator = Validator::Strings(Strings::new(2, Some(3)).unwrap());

        assert_eq!(
            validator.validate(&Value::Int(12)),
            Err(ValidationError::WrongType {
                found: "int",
                validator: "<Strings 2<=len<=3>".to_string()
            })
        );
        assert!(matches!(validator.validate(&text("a")), Err(ValidationError::OutOfRange { .. })));
    }

    #[rstest]
    #[case(Some(0.0), None, "<Numbers v>=0>")]
    #[case(None, Some(10.5), "<Numbers v<=10.5>")]
    #[case(Some(-1.0), Some(1.0), "<Numbers -1<=v<=1>")]
    #[case(None, None, "<Numbers>")]
    fn numbers_display_their_bounds(#[case] min: Option<f64>, #[case] max: Option<f64>, #[case] expected: &str) {
        assert_eq!(Validator::Numbers(Numbers::new(min, max).unwrap()).to_string(), expected);
    }

    #[rstest]
    #[case(Value::Float(2.5), true)]
    #[case(Value::Int(3), true)]
    #[case(Value::Float(26.6), false)]
    #[case(Value::Float(f64::NAN), false)]
    fn numbers_accept_ints_and_floats_in_range(#[case] value: Value, #[case] valid: bool) {
        let validator = Validator::Numbers(Numbers::new(Some(2.0), Some(26.5)).unwrap());

        assert_eq!(validator.validate(&value).is_ok(), valid);
    }

    #[test]
    fn ints_reject_floats_as_a_type_error() {
        let validator = Validator::Ints(Ints::new(Some(1), Some(100001)).unwrap());

        assert_eq!(validator.validate(&Value::Int(1001)), Ok(()));
        assert!(matches!(validator.validate(&Value::Float(1.5)), Err(ValidationError::WrongType { .. })));
        assert!(matches!(validator.validate(&Value::Int(0)), Err(ValidationError::OutOfRange { .. })));
        assert!(Ints::new(Some(2), Some(1)).is_err());
    }

    #[test]
    fn enum_accepts_only_listed_values() {
        let validator = Validator::one_of(vec![text("SA"), text("PN")]).unwrap();

        assert_eq!(validator.to_string(), "<Enum: {SA, PN}>");
        assert_eq!(validator.validate(&text("PN")), Ok(()));
        assert!(validator.validate(&text("XX")).is_err());
        assert_eq!(Validator::one_of(vec![]), Err(ValidatorError::EmptyEnum));
    }

    #[test]
    fn multi_type_accepts_any_member() {
        let validator = Validator::multi_type(vec![
            Validator::Ints(Ints::new(Some(0), None).unwrap()),
            Validator::Strings(Strings::new(0, Some(3)).unwrap()),
        ])
        .unwrap();

        assert_eq!(validator.to_string(), "<MultiType: Ints v>=0, Strings len<=3>");
        assert_eq!(validator.validate(&Value::Int(4)), Ok(()));
        assert_eq!(validator.validate(&text("MAX")), Ok(()));
        assert!(matches!(validator.validate(&Value::Int(-1)), Err(ValidationError::OutOfRange { .. })));
        assert!(matches!(validator.validate(&Value::Bool(true)), Err(ValidationError::WrongType { .. })));
    }
}
