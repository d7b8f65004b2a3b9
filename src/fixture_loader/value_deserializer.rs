use crate::domain::Value;
use serde::de::{Error, Unexpected};
use serde::{Deserialize, Deserializer};

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: serde_yaml::Value = Deserialize::deserialize(deserializer)?;
        match value {
            serde_yaml::Value::Bool(value) => Ok(Value::Bool(value)),
            serde_yaml::Value::Number(number) => number_to_value(&number).ok_or_else(|| Error::custom(format!("unsupported number {}", number))),
            serde_yaml::Value::String(value) => Ok(Value::Str(value)),
            serde_yaml::Value::Sequence(values) => values
                .iter()
                .map(|value| match value {
                    serde_yaml::Value::Number(number) => number.as_f64().ok_or_else(|| Error::custom(format!("unsupported number {}", number))),
                    _ => Err(Error::invalid_type(Unexpected::Other("non-numeric array element"), &"a number")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::FloatArray),
            _ => Err(Error::custom("expected a boolean, a number, a string or a list of numbers")),
        }
    }
}

fn number_to_value(number: &serde_yaml::Number) -> Option<Value> {
    if let Some(n) = number.as_i64() {
        return Some(Value::Int(n));
    }
    number.as_f64().map(Value::Float)
}
