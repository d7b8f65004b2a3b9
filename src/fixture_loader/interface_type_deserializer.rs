use crate::domain::resource_name::InterfaceType;
use serde::de::{Error, Unexpected};
use serde::{Deserialize, Deserializer};

impl<'de> Deserialize<'de> for InterfaceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse()
            .map_err(|_| Error::invalid_value(Unexpected::Str(&value), &"an interface type such as GPIB INSTR or TCPIP SOCKET"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("GPIB INSTR", InterfaceType::GpibInstr)]
    #[case("tcpip  socket", InterfaceType::TcpipSocket)]
    #[case("USB INSTR", InterfaceType::UsbInstr)]
    fn deserializes_interface_types(#[case] text: &str, #[case] expected: InterfaceType) {
        assert_eq!(serde_json::from_value::<InterfaceType>(json!(text)).unwrap(), expected);
    }

    #[test]
    fn fails_for_an_unknown_interface_type() {
        assert!(serde_json::from_value::<InterfaceType>(json!("PXI INSTR")).is_err());
    }
}
