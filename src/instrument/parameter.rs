use crate::domain::template::{Template, TemplateError};
use crate::domain::{Value, ValueError, ValueType};
use crate::instrument::validators::{ValidationError, Validator};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

/// A named setting or reading of an instrument, with the commands to get and set it.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    label: String,
    unit: Option<String>,
    get_cmd: Option<Template>,
    set_cmd: Option<Template>,
    value_type: ValueType,
    validator: Option<Validator>,
    cache: Option<CachedValue>,
}

impl Parameter {
    pub fn builder(name: &str, value_type: ValueType) -> ParameterBuilder {
        ParameterBuilder::new(name, value_type)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    pub fn is_gettable(&self) -> bool {
        self.get_cmd.is_some()
    }

    pub fn is_settable(&self) -> bool {
        self.set_cmd.is_some()
    }

    pub fn cached(&self) -> Option<&CachedValue> {
        self.cache.as_ref()
    }

    pub(crate) fn get_command(&self) -> Result<Option<String>, ParameterError> {
        self.get_cmd.as_ref().map(|cmd| cmd.render(None, None)).transpose().map_err(ParameterError::from)
    }

    /// Validates `value` and renders the command that sets it.
    pub(crate) fn set_command(&self, value: Value) -> Result<Option<(String, Value)>, ParameterError> {
        let Some(set_cmd) = &self.set_cmd else {
            return Ok(None);
        };
        let value = self.value_type.coerce(value)?;
        if let Some(validator) = &self.validator {
            validator.validate(&value)?;
        }
        let command = set_cmd.render(Some(&value), None)?;
        Ok(Some((command, value)))
    }

    /// Converts the reply of the get command, quoted strings lose their quotes.
    pub(crate) fn parse_reply(&self, reply: &str) -> Result<Value, ParameterError> {
        let reply = reply.trim();
        let reply = match self.value_type {
            ValueType::Str => reply.strip_prefix('"').and_then(|r| r.strip_suffix('"')).unwrap_or(reply),
            _ => reply,
        };
        Ok(self.value_type.parse(reply)?)
    }

    pub(crate) fn update_cache(&mut self, value: Value) {
        self.cache = Some(CachedValue {
            value,
            timestamp: Utc::now(),
        });
    }

    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "label": self.label,
            "unit": self.unit,
            "value": self.cache.as_ref().map(|c| to_json(&c.value)),
            "ts": self.cache.as_ref().map(|c| c.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            "vals": self.validator.as_ref().map(ToString::to_string),
        })
    }
}

pub(crate) fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(n) => json!(n),
        Value::Float(n) => json!(n),
        Value::Bool(b) => json!(b),
        Value::Str(s) => json!(s),
        Value::FloatArray(values) => json!(values),
    }
}

pub struct ParameterBuilder {
    name: String,
    label: Option<String>,
    unit: Option<String>,
    get_cmd: Option<Template>,
    set_cmd: Option<Template>,
    value_type: ValueType,
    validator: Option<Validator>,
}

impl ParameterBuilder {
    fn new(name: &str, value_type: ValueType) -> Self {
        ParameterBuilder {
            name: name.to_string(),
            label: None,
            unit: None,
            get_cmd: None,
            set_cmd: None,
            value_type,
            validator: None,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn get_cmd(mut self, get_cmd: Template) -> Self {
        self.get_cmd = Some(get_cmd);
        self
    }

    pub fn set_cmd(mut self, set_cmd: Template) -> Self {
        self.set_cmd = Some(set_cmd);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn build(self) -> Result<Parameter, ParameterError> {
        if let Some(set_cmd) = &self.set_cmd
            && !set_cmd.has_value_placeholder()
        {
            return Err(ParameterError::SetCommandWithoutValue(set_cmd.source().to_string()));
        }

        Ok(Parameter {
            label: self.label.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            unit: self.unit,
            get_cmd: self.get_cmd,
            set_cmd: self.set_cmd,
            value_type: self.value_type,
            validator: self.validator,
            cache: None,
        })
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ParameterError {
    #[error("set command '{0}' has no value placeholder")]
    SetCommandWithoutValue(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::validators::Numbers;
    use pretty_assertions::assert_eq;

    fn start() -> Parameter {
        Parameter::builder("start", ValueType::Float)
            .label("Start frequency")
            .unit("Hz")
            .get_cmd(Template::parse("SENS:FREQ:STAR?").unwrap())
            .set_cmd(Template::parse("SENS:FREQ:STAR {:.6e}").unwrap())
            .validator(Validator::Numbers(Numbers::new(Some(2.0), Some(26.5e9)).unwrap()))
            .build()
            .unwrap()
    }

    #[test]
    fn renders_the_set_command_for_valid_values() {
        let (command, value) = start().set_command(Value::Int(10_000_000)).unwrap().unwrap();

        assert_eq!(command, "SENS:FREQ:STAR 1.000000e+07");
        assert_eq!(value, Value::Float(1e7));
    }

    #[test]
    fn refuses_values_outside_the_validator() {
        let result = start().set_command(Value::Float(1.0));

        assert!(matches!(result, Err(ParameterError::Validation(ValidationError::OutOfRange { .. }))));
    }

    #[test]
    fn parses_replies_into_the_value_type() {
        let function = Parameter::builder("function", ValueType::Str).build().unwrap();

        assert_eq!(start().parse_reply("1.000000e+07\n").unwrap(), Value::Float(1e7));
        assert_eq!(function.parse_reply("\"VOLT\"").unwrap(), Value::Str("VOLT".to_string()));
        assert!(start().parse_reply("ERROR").is_err());
    }

    #[test]
    fn set_command_needs_a_value_placeholder() {
        let result = Parameter::builder("reset", ValueType::Str).set_cmd(Template::parse("*RST").unwrap()).build();

        assert_eq!(result.unwrap_err(), ParameterError::SetCommandWithoutValue("*RST".to_string()));
    }

    #[test]
    fn snapshot_contains_the_cached_value() {
        let mut parameter = start();
        assert_eq!(parameter.snapshot()["value"], serde_json::Value::Null);

        parameter.update_cache(Value::Float(10.0));

        let snapshot = parameter.snapshot();
        assert_eq!(snapshot["value"], json!(10.0));
        assert_eq!(snapshot["unit"], json!("Hz"));
        assert_eq!(snapshot["label"], json!("Start frequency"));
        assert_eq!(snapshot["vals"], json!("<Numbers 2<=v<=26500000000>"));
    }
}
