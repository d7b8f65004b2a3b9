use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// A parsed VISA resource string such as `GPIB0::12::INSTR` or `TCPIP0::localhost::5025::SOCKET`.
///
/// Two strings naming the same resource (`GPIB::1::INSTR` and `gpib0::1::instr`) parse to equal values, and
/// `Display` renders the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceName {
    Gpib {
        board: u16,
        primary: u8,
        secondary: Option<u8>,
    },
    TcpipInstr {
        board: u16,
        host: String,
        lan_device: String,
    },
    TcpipSocket {
        board: u16,
        host: String,
        port: u16,
    },
    Asrl {
        board: String,
    },
    Usb {
        board: u16,
        vendor: String,
        product: String,
        serial: String,
        interface: Option<u16>,
    },
}

/// The interface/resource class pair used to pick the end-of-message terminators of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceType {
    GpibInstr,
    TcpipInstr,
    TcpipSocket,
    AsrlInstr,
    UsbInstr,
}

impl ResourceName {
    pub fn parse(name: &str) -> Result<ResourceName, ResourceNameError> {
        let invalid = |reason: &str| ResourceNameError::Invalid {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = name.trim().split("::").map(str::trim).collect();
        let (first, rest) = parts.split_first().ok_or_else(|| invalid("empty resource name"))?;
        let (class, fields) = rest.split_last().ok_or_else(|| invalid("missing resource class"))?;
        let class = class.to_ascii_uppercase();
        let upper = first.to_ascii_uppercase();

        if let Some(board) = upper.strip_prefix("GPIB") {
            let board = parse_board(board).ok_or_else(|| invalid("invalid board number"))?;
            expect_class(&class, "INSTR").ok_or_else(|| invalid("GPIB resources must be INSTR"))?;
            let (primary, secondary) = match fields {
                [primary] => (*primary, None),
                [primary, secondary] => (*primary, Some(*secondary)),
                _ => return Err(invalid("expected a primary and an optional secondary address")),
            };
            let primary: u8 = primary.parse().ok().filter(|p| *p <= 30).ok_or_else(|| invalid("primary address must be 0-30"))?;
            let secondary = match secondary {
                Some(secondary) => Some(secondary.parse::<u8>().ok().filter(|s| *s <= 30).ok_or_else(|| invalid("secondary address must be 0-30"))?),
                None => None,
            };
            return Ok(ResourceName::Gpib { board, primary, secondary });
        }

        if let Some(board) = upper.strip_prefix("TCPIP") {
            let board = parse_board(board).ok_or_else(|| invalid("invalid board number"))?;
            return match (class.as_str(), fields) {
                ("INSTR", [host]) => Ok(ResourceName::TcpipInstr {
                    board,
                    host: non_empty(host).ok_or_else(|| invalid("missing host"))?,
                    lan_device: "inst0".to_string(),
                }),
                ("INSTR", [host, lan_device]) => Ok(ResourceName::TcpipInstr {
                    board,
                    host: non_empty(host).ok_or_else(|| invalid("missing host"))?,
                    lan_device: non_empty(lan_device).ok_or_else(|| invalid("missing LAN device name"))?,
                }),
                ("SOCKET", [host, port]) => Ok(ResourceName::TcpipSocket {
                    board,
                    host: non_empty(host).ok_or_else(|| invalid("missing host"))?,
                    port: port.parse().ok().filter(|p| *p > 0).ok_or_else(|| invalid("invalid port"))?,
                }),
                _ => Err(invalid("expected TCPIP[board]::host[::lan device]::INSTR or TCPIP[board]::host::port::SOCKET")),
            };
        }

        if first.len() >= 4 && first[..4].eq_ignore_ascii_case("ASRL") {
            expect_class(&class, "INSTR").ok_or_else(|| invalid("ASRL resources must be INSTR"))?;
            if !fields.is_empty() {
                return Err(invalid("unexpected fields in ASRL resource"));
            }
            let board = match &first[4..] {
                "" => "0".to_string(),
                board => board.to_string(),
            };
            return Ok(ResourceName::Asrl { board });
        }

        if let Some(board) = upper.strip_prefix("USB") {
            let board = parse_board(board).ok_or_else(|| invalid("invalid board number"))?;
            expect_class(&class, "INSTR").ok_or_else(|| invalid("USB resources must be INSTR"))?;
            let (vendor, product, serial, interface) = match fields {
                [vendor, product, serial] => (vendor, product, serial, None),
                [vendor, product, serial, interface] => (
                    vendor,
                    product,
                    serial,
                    Some(interface.parse::<u16>().map_err(|_| invalid("invalid USB interface number"))?),
                ),
                _ => return Err(invalid("expected USB[board]::vendor::product::serial[::interface]::INSTR")),
            };
            return Ok(ResourceName::Usb {
                board,
                vendor: non_empty(vendor).ok_or_else(|| invalid("missing vendor id"))?.to_ascii_uppercase().replace("0X", "0x"),
                product: non_empty(product).ok_or_else(|| invalid("missing product id"))?.to_ascii_uppercase().replace("0X", "0x"),
                serial: non_empty(serial).ok_or_else(|| invalid("missing serial number"))?,
                interface,
            });
        }

        Err(invalid("unsupported interface type"))
    }

    pub fn interface_type(&self) -> InterfaceType {
        match self {
            ResourceName::Gpib { .. } => InterfaceType::GpibInstr,
            ResourceName::TcpipInstr { .. } => InterfaceType::TcpipInstr,
            ResourceName::TcpipSocket { .. } => InterfaceType::TcpipSocket,
            ResourceName::Asrl { .. } => InterfaceType::AsrlInstr,
            ResourceName::Usb { .. } => InterfaceType::UsbInstr,
        }
    }
}

fn parse_board(board: &str) -> Option<u16> {
    if board.is_empty() { Some(0) } else { board.parse().ok() }
}

fn expect_class(class: &str, expected: &str) -> Option<()> {
    (class == expected).then_some(())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl FromStr for ResourceName {
    type Err = ResourceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceName::parse(s)
    }
}

impl Display for ResourceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceName::Gpib { board, primary, secondary } => match secondary {
                Some(secondary) => write!(f, "GPIB{}::{}::{}::INSTR", board, primary, secondary),
                None => write!(f, "GPIB{}::{}::INSTR", board, primary),
            },
            ResourceName::TcpipInstr { board, host, lan_device } => write!(f, "TCPIP{}::{}::{}::INSTR", board, host, lan_device),
            ResourceName::TcpipSocket { board, host, port } => write!(f, "TCPIP{}::{}::{}::SOCKET", board, host, port),
            ResourceName::Asrl { board } => write!(f, "ASRL{}::INSTR", board),
            ResourceName::Usb {
                board,
                vendor,
                product,
                serial,
                interface,
            } => match interface {
                Some(interface) => write!(f, "USB{}::{}::{}::{}::{}::INSTR", board, vendor, product, serial, interface),
                None => write!(f, "USB{}::{}::{}::{}::INSTR", board, vendor, product, serial),
            },
        }
    }
}

impl InterfaceType {
    pub const ALL: [InterfaceType; 5] = [
        InterfaceType::GpibInstr,
        InterfaceType::TcpipInstr,
        InterfaceType::TcpipSocket,
        InterfaceType::AsrlInstr,
        InterfaceType::UsbInstr,
    ];
}

impl FromStr for InterfaceType {
    type Err = ResourceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        InterfaceType::ALL
            .into_iter()
            .find(|interface_type| interface_type.to_string() == normalized)
            .ok_or_else(|| ResourceNameError::UnknownInterfaceType(s.to_string()))
    }
}

impl Display for InterfaceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InterfaceType::GpibInstr => "GPIB INSTR",
            InterfaceType::TcpipInstr => "TCPIP INSTR",
            InterfaceType::TcpipSocket => "TCPIP SOCKET",
            InterfaceType::AsrlInstr => "ASRL INSTR",
            InterfaceType::UsbInstr => "USB INSTR",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ResourceNameError {
    #[error("invalid resource name '{name}': {reason}")]
    Invalid { name: String, reason: String },
    #[error("unknown interface type '{0}'")]
    UnknownInterfaceType(String),
}
