use crate::domain::template::Template;
use serde::de::Error;
use serde::{Deserialize, Deserializer};

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let source = String::deserialize(deserializer)?;
        Template::parse(&source).map_err(Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_a_template() {
        let template = serde_yaml::from_str::<Template>("'SENS:{ch_id}:FREQ {:.6e}'").unwrap();

        assert_eq!(template.source(), "SENS:{ch_id}:FREQ {:.6e}");
        assert!(template.has_channel_placeholder());
        assert!(template.has_value_placeholder());
    }

    #[test]
    fn fails_for_an_invalid_template() {
        let result = serde_yaml::from_str::<Template>("'FREQ {} {}'");

        assert!(result.unwrap_err().to_string().contains("more than one value placeholder"));
    }
}
