use crate::domain::data_format::DataFormat;
use serde::de::{Error, Unexpected};
use serde::{Deserialize, Deserializer};

impl<'de> Deserialize<'de> for DataFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse()
            .map_err(|_| Error::invalid_value(Unexpected::Str(&value), &"a data format such as ASC, REAL,32 or REAL,64"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("ASC", DataFormat::Ascii)]
    #[case("REAL,32", DataFormat::Real32)]
    #[case("real,64", DataFormat::Real64)]
    fn deserializes_data_formats(#[case] text: &str, #[case] expected: DataFormat) {
        assert_eq!(serde_json::from_value::<DataFormat>(json!(text)).unwrap(), expected);
    }

    #[test]
    fn fails_for_an_unknown_data_format() {
        assert!(serde_json::from_value::<DataFormat>(json!("INT,16")).is_err());
    }
}
