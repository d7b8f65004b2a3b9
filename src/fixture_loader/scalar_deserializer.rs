use crate::fixture_loader::serialized_fixture::Scalar;
use serde::de::Error;
use serde::{Deserialize, Deserializer};

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: serde_yaml::Value = Deserialize::deserialize(deserializer)?;
        match value {
            serde_yaml::Value::String(value) => Ok(Scalar(value)),
            serde_yaml::Value::Number(value) => Ok(Scalar(value.to_string())),
            serde_yaml::Value::Bool(value) => Ok(Scalar(value.to_string())),
            _ => Err(Error::custom("expected a string, a number or a boolean")),
        }
    }
}
