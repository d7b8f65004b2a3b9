use crate::domain::template::Template;
use crate::domain::value::{Value, ValueError, ValueType};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// A named instrument setting of a simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    value_type: ValueType,
    default: Value,
    value: Value,
    specs: Specs,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Specs {
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub valid: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Getter {
    pub query: Template,
    pub response: Template,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Setter {
    pub query: Template,
    pub response: Option<String>,
    pub error: Option<String>,
}

/// What happens to a value outside the `min`/`max` bounds of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    #[default]
    Reject,
    Clamp,
}

#[derive(PartialEq, Debug)]
pub enum ValidatedValue {
    Valid(Value),
    Clamped(Value, PropertyError),
    Invalid(PropertyError),
}

impl Property {
    pub fn builder(name: impl Into<String>, value_type: ValueType, default: Value) -> PropertyBuilder {
        PropertyBuilder::new(name.into(), value_type, default)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn specs(&self) -> &Specs {
        &self.specs
    }

    pub fn getter(&self) -> Option<&Getter> {
        self.getter.as_ref()
    }

    pub fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }

    pub fn validate_value(&self, value: Value, policy: OutOfRangePolicy) -> ValidatedValue {
        let value = match self.value_type.coerce(value) {
            Ok(value) => value,
            Err(e) => return ValidatedValue::Invalid(PropertyError::InvalidValue(e)),
        };

        if let Some(number) = non_finite(&value) {
            return ValidatedValue::Invalid(PropertyError::NotFinite(number.to_string()));
        }

        if !self.specs.valid.is_empty() && !self.specs.valid.contains(&value) {
            return ValidatedValue::Invalid(PropertyError::NotAValidValue(value.to_string()));
        }

        match value {
            Value::FloatArray(values) => {
                let mut error = None;
                let mut checked = Vec::with_capacity(values.len());
                for element in values {
                    match self.check_bounds(Value::Float(element)) {
                        Ok(v) => checked.push(v),
                        Err((clamped, e)) => {
                            if policy == OutOfRangePolicy::Reject {
                                return ValidatedValue::Invalid(e);
                            }
                            checked.push(clamped);
                            error.get_or_insert(e);
                        }
                    }
                }
                let checked = Value::FloatArray(checked.iter().filter_map(Value::as_f64).collect());
                match error {
                    Some(e) => ValidatedValue::Clamped(checked, e),
                    None => ValidatedValue::Valid(checked),
                }
            }
            value => match self.check_bounds(value) {
                Ok(value) => ValidatedValue::Valid(value),
                Err((clamped, e)) => match policy {
                    OutOfRangePolicy::Reject => ValidatedValue::Invalid(e),
                    OutOfRangePolicy::Clamp => ValidatedValue::Clamped(self.value_type.coerce(clamped.clone()).unwrap_or(clamped), e),
                },
            },
        }
    }

    fn check_bounds(&self, value: Value) -> Result<Value, (Value, PropertyError)> {
        if let Some(minimum) = &self.specs.min {
            if &value < minimum {
                return Err((
                    minimum.clone(),
                    PropertyError::ValueTooSmall {
                        value: value.to_string(),
                        minimum: minimum.to_string(),
                    },
                ));
            }
        }

        if let Some(maximum) = &self.specs.max {
            if &value > maximum {
                return Err((
                    maximum.clone(),
                    PropertyError::ValueTooLarge {
                        value: value.to_string(),
                        maximum: maximum.to_string(),
                    },
                ));
            }
        }

        Ok(value)
    }

    /// Validates and stores a value, returns the value that was stored.
    pub fn update(&mut self, value: Value, policy: OutOfRangePolicy) -> Result<&Value, PropertyError> {
        match self.validate_value(value, policy) {
            ValidatedValue::Valid(value) => {
                self.value = value;
                Ok(&self.value)
            }
            ValidatedValue::Clamped(value, e) => {
                warn!("⚠️ Clamped '{}' to {}: {}", self.name, value, e);
                self.value = value;
                Ok(&self.value)
            }
            ValidatedValue::Invalid(e) => Err(e),
        }
    }

    /// Parses the argument of a setter query and stores it.
    pub fn update_from_text(&mut self, text: &str, policy: OutOfRangePolicy) -> Result<&Value, PropertyError> {
        let value = self.value_type.parse(text).map_err(PropertyError::InvalidValue)?;
        self.update(value, policy)
    }

    pub fn reset(&mut self) {
        self.value = self.default.clone();
    }
}

fn non_finite(value: &Value) -> Option<f64> {
    match value {
        Value::Float(n) if !n.is_finite() => Some(*n),
        Value::FloatArray(values) => values.iter().copied().find(|n| !n.is_finite()),
        _ => None,
    }
}

pub struct PropertyBuilder {
    name: String,
    value_type: ValueType,
    default: Value,
    specs: Specs,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl PropertyBuilder {
    pub fn new(name: String, value_type: ValueType, default: Value) -> Self {
        PropertyBuilder {
            name,
            value_type,
            default,
            specs: Specs::default(),
            getter: None,
            setter: None,
        }
    }

    pub fn min(mut self, value: Value) -> Self {
        self.specs.min = Some(value);
        self
    }

    pub fn max(mut self, value: Value) -> Self {
        self.specs.max = Some(value);
        self
    }

    pub fn valid(mut self, values: Vec<Value>) -> Self {
        self.specs.valid = values;
        self
    }

    pub fn getter(mut self, query: Template, response: Template) -> Self {
        self.getter = Some(Getter { query, response });
        self
    }

    pub fn setter(mut self, query: Template, response: Option<String>, error: Option<String>) -> Self {
        self.setter = Some(Setter { query, response, error });
        self
    }

    /// Builds the property, the default value must satisfy the specs of the property itself.
    pub fn build(self) -> Result<Property, PropertyError> {
        let value_type = self.value_type;
        let coerce = |value: Value| value_type.coerce(value).map_err(PropertyError::InvalidValue);

        let specs = Specs {
            min: self.specs.min.map(|v| coerce_bound(value_type, v)).transpose()?,
            max: self.specs.max.map(|v| coerce_bound(value_type, v)).transpose()?,
            valid: self.specs.valid.into_iter().map(coerce).collect::<Result<Vec<_>, _>>()?,
        };

        let mut property = Property {
            name: self.name,
            value_type,
            default: self.default.clone(),
            value: self.default.clone(),
            specs,
            getter: self.getter,
            setter: self.setter,
        };

        let default = match property.validate_value(self.default, OutOfRangePolicy::Reject) {
            ValidatedValue::Valid(value) => value,
            ValidatedValue::Clamped(_, e) | ValidatedValue::Invalid(e) => return Err(PropertyError::InvalidDefault(Box::new(e))),
        };
        property.default = default.clone();
        property.value = default;
        Ok(property)
    }
}

// Bounds of an array property apply to its elements
fn coerce_bound(value_type: ValueType, value: Value) -> Result<Value, PropertyError> {
    match value_type {
        ValueType::FloatArray => ValueType::Float.coerce(value).map_err(PropertyError::InvalidValue),
        value_type => value_type.coerce(value).map_err(PropertyError::InvalidValue),
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum PropertyError {
    #[error("{value} is smaller than the minimum {minimum}")]
    ValueTooSmall { value: String, minimum: String },
    #[error("{value} is larger than the maximum {maximum}")]
    ValueTooLarge { value: String, maximum: String },
    #[error("{0} is not a finite number")]
    NotFinite(String),
    #[error("'{0}' is not one of the valid values")]
    NotAValidValue(String),
    #[error(transparent)]
    InvalidValue(#[from] ValueError),
    #[error("invalid default value: {0}")]
    InvalidDefault(Box<PropertyError>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn frequency() -> Property {
        Property::builder("frequency", ValueType::Float, Value::Float(1e6))
            .min(Value::Int(10))
            .max(Value::Float(26.5e9))
            .build()
            .unwrap()
    }

    fn mode() -> Property {
        Property::builder("mode", ValueType::Str, Value::Str("SA".to_string()))
            .valid(vec![Value::Str("SA".to_string()), Value::Str("PNOISE".to_string())])
            .build()
            .unwrap()
    }

    #[test]
    fn starts_with_the_default_value() {
        let property = frequency();

        assert_eq!(property.value(), &Value::Float(1e6));
        assert_eq!(property.default_value(), &Value::Float(1e6));
    }

    #[test]
    fn coerces_the_bounds_to_the_declared_type() {
        assert_eq!(frequency().specs().min, Some(Value::Float(10.0)));
    }

    #[rstest]
    #[case(Value::Float(20.0))]
    #[case(Value::Int(20))]
    #[case(Value::Float(26.5e9))]
    fn validate_value_returns_valid_within_bounds(#[case] value: Value) {
        let result = frequency().validate_value(value.clone(), OutOfRangePolicy::Reject);

        assert_eq!(result, ValidatedValue::Valid(value));
    }

    #[test]
    fn validate_value_rejects_a_value_that_is_too_small() {
        let result = frequency().validate_value(Value::Float(1.0), OutOfRangePolicy::Reject);

        assert_eq!(
            result,
            ValidatedValue::Invalid(PropertyError::ValueTooSmall {
                value: "1.0".to_string(),
                minimum: "10.0".to_string()
            })
        );
    }

    #[test]
    fn validate_value_clamps_a_value_that_is_too_large() {
        let result = frequency().validate_value(Value::Float(30e9), OutOfRangePolicy::Clamp);

        assert!(matches!(result, ValidatedValue::Clamped(Value::Float(v), PropertyError::ValueTooLarge { .. }) if v == 26.5e9));
    }

    #[test]
    fn validate_value_rejects_values_outside_the_valid_list_even_when_clamping() {
        let result = mode().validate_value(Value::Str("VSA".to_string()), OutOfRangePolicy::Clamp);

        assert_eq!(result, ValidatedValue::Invalid(PropertyError::NotAValidValue("VSA".to_string())));
    }

    #[test]
    fn validate_value_rejects_a_mismatching_type() {
        let result = frequency().validate_value(Value::FloatArray(vec![]), OutOfRangePolicy::Reject);

        assert!(matches!(result, ValidatedValue::Invalid(PropertyError::InvalidValue(_))));
    }

    #[test]
    fn validate_value_checks_every_element_of_an_array() {
        let property = Property::builder("trace", ValueType::FloatArray, Value::FloatArray(vec![-50.0]))
            .min(Value::Int(-100))
            .max(Value::Int(0))
            .build()
            .unwrap();

        let rejected = property.validate_value(Value::FloatArray(vec![-10.0, 5.0]), OutOfRangePolicy::Reject);
        let clamped = property.validate_value(Value::FloatArray(vec![-110.0, -10.0, 5.0]), OutOfRangePolicy::Clamp);

        assert!(matches!(rejected, ValidatedValue::Invalid(PropertyError::ValueTooLarge { .. })));
        assert!(matches!(clamped, ValidatedValue::Clamped(Value::FloatArray(ref v), PropertyError::ValueTooSmall { .. }) if v == &vec![-100.0, -10.0, 0.0]));
    }

    #[rstest]
    #[case("nan", OutOfRangePolicy::Reject)]
    #[case("NaN", OutOfRangePolicy::Clamp)]
    #[case("inf", OutOfRangePolicy::Reject)]
    #[case("-inf", OutOfRangePolicy::Clamp)]
    fn update_from_text_rejects_non_finite_numbers(#[case] text: &str, #[case] policy: OutOfRangePolicy) {
        let mut property = frequency();

        let result = property.update_from_text(text, policy);

        assert!(matches!(result, Err(PropertyError::NotFinite(_))));
        assert_eq!(property.value(), &Value::Float(1e6));
    }

    #[test]
    fn validate_value_rejects_non_finite_array_elements() {
        let property = Property::builder("trace", ValueType::FloatArray, Value::FloatArray(vec![-50.0])).build().unwrap();

        let result = property.validate_value(Value::FloatArray(vec![-10.0, f64::NAN]), OutOfRangePolicy::Clamp);

        assert_eq!(result, ValidatedValue::Invalid(PropertyError::NotFinite("NaN".to_string())));
    }

    #[test]
    fn update_from_text_stores_the_parsed_value() {
        let mut property = frequency();

        let stored = property.update_from_text("2.5e6", OutOfRangePolicy::Reject).unwrap().clone();

        assert_eq!(stored, Value::Float(2.5e6));
        assert_eq!(property.value(), &Value::Float(2.5e6));
    }

    #[test]
    fn update_keeps_the_previous_value_when_rejected() {
        let mut property = mode();

        let result = property.update(Value::Str("VSA".to_string()), OutOfRangePolicy::Reject);

        assert!(result.is_err());
        assert_eq!(property.value(), &Value::Str("SA".to_string()));
    }

    #[test]
    fn reset_restores_the_default() {
        let mut property = frequency();
        property.update(Value::Float(5e9), OutOfRangePolicy::Reject).unwrap();

        property.reset();

        assert_eq!(property.value(), &Value::Float(1e6));
    }

    #[test]
    fn build_fails_for_a_default_outside_the_bounds() {
        let result = Property::builder("npts", ValueType::Int, Value::Int(0)).min(Value::Int(1)).build();

        assert!(matches!(result, Err(PropertyError::InvalidDefault(_))));
    }
}
