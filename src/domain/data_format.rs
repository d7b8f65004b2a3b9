use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Encoding of array responses, selected on the instrument with e.g. `FORM REAL,64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    #[default]
    Ascii,
    Real32,
    Real64,
}

impl DataFormat {
    fn element_size(&self) -> Option<usize> {
        match self {
            DataFormat::Ascii => None,
            DataFormat::Real32 => Some(4),
            DataFormat::Real64 => Some(8),
        }
    }
}

impl FromStr for DataFormat {
    type Err = DataFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let parts: Vec<&str> = normalized.split([',', ' ']).filter(|part| !part.is_empty()).collect();

        match parts.as_slice() {
            ["ASC" | "ASCII"] | ["ASC" | "ASCII", "0" | "8"] => Ok(DataFormat::Ascii),
            ["REAL"] | ["REAL", "32"] => Ok(DataFormat::Real32),
            ["REAL", "64"] => Ok(DataFormat::Real64),
            _ => Err(DataFormatError::UnknownFormat(s.trim().to_string())),
        }
    }
}

impl Display for DataFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFormat::Ascii => write!(f, "ASC,8"),
            DataFormat::Real32 => write!(f, "REAL,32"),
            DataFormat::Real64 => write!(f, "REAL,64"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    Big,
    #[default]
    Little,
}

/// Encodes values as an IEEE 488.2 definite-length arbitrary block: `#<n><length><payload>`.
pub fn encode_block(values: &[f64], format: DataFormat, byte_order: ByteOrder) -> Result<Vec<u8>, DataFormatError> {
    let mut payload = Vec::with_capacity(values.len() * format.element_size().ok_or(DataFormatError::NotBinary)?);
    for value in values {
        match (format, byte_order) {
            (DataFormat::Real32, ByteOrder::Big) => payload.extend_from_slice(&(*value as f32).to_be_bytes()),
            (DataFormat::Real32, ByteOrder::Little) => payload.extend_from_slice(&(*value as f32).to_le_bytes()),
            (DataFormat::Real64, ByteOrder::Big) => payload.extend_from_slice(&value.to_be_bytes()),
            (DataFormat::Real64, ByteOrder::Little) => payload.extend_from_slice(&value.to_le_bytes()),
            (DataFormat::Ascii, _) => return Err(DataFormatError::NotBinary),
        }
    }

    let length = payload.len().to_string();
    if length.len() > 9 {
        return Err(DataFormatError::BlockTooLarge(payload.len()));
    }

    let mut block = format!("#{}{}", length.len(), length).into_bytes();
    block.extend_from_slice(&payload);
    Ok(block)
}

/// Decodes a definite-length (`#<n><length>`) or indefinite-length (`#0`) block. Bytes after a definite block,
/// such as a response terminator, are ignored; an indefinite block runs to the end of the input.
pub fn decode_block(block: &[u8], format: DataFormat, byte_order: ByteOrder) -> Result<Vec<f64>, DataFormatError> {
    let element_size = format.element_size().ok_or(DataFormatError::NotBinary)?;

    let start = block.iter().position(|b| *b == b'#').ok_or(DataFormatError::MissingBlockHeader)?;
    let digits = block
        .get(start + 1)
        .filter(|b| b.is_ascii_digit())
        .map(|b| (b - b'0') as usize)
        .ok_or(DataFormatError::MalformedBlockHeader)?;

    let payload = if digits == 0 {
        &block[start + 2..]
    } else {
        let length_bytes = block.get(start + 2..start + 2 + digits).ok_or(DataFormatError::MalformedBlockHeader)?;
        let length: usize = std::str::from_utf8(length_bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(DataFormatError::MalformedBlockHeader)?;
        let offset = start + 2 + digits;
        block.get(offset..offset + length).ok_or(DataFormatError::TruncatedBlock {
            expected: length,
            actual: block.len().saturating_sub(offset),
        })?
    };

    if payload.len() % element_size != 0 {
        return Err(DataFormatError::MisalignedPayload {
            length: payload.len(),
            element_size,
        });
    }

    Ok(payload
        .chunks_exact(element_size)
        .map(|chunk| match (format, byte_order, chunk.len()) {
            (DataFormat::Real32, ByteOrder::Big, 4) => f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
            (DataFormat::Real32, ByteOrder::Little, 4) => f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
            (_, ByteOrder::Big, _) => f64::from_be_bytes(to_array(chunk)),
            (_, ByteOrder::Little, _) => f64::from_le_bytes(to_array(chunk)),
        })
        .collect())
}

fn to_array(chunk: &[u8]) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&chunk[..8]);
    bytes
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum DataFormatError {
    #[error("unknown data format '{0}'")]
    UnknownFormat(String),
    #[error("ASCII data is not sent as a binary block")]
    NotBinary,
    #[error("block of {0} bytes does not fit a definite-length header")]
    BlockTooLarge(usize),
    #[error("response does not contain a block header")]
    MissingBlockHeader,
    #[error("malformed block header")]
    MalformedBlockHeader,
    #[error("truncated block, expected {expected} bytes, got {actual}")]
    TruncatedBlock { expected: usize, actual: usize },
    #[error("block payload of {length} bytes is not a multiple of {element_size}")]
    MisalignedPayload { length: usize, element_size: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("ASC", DataFormat::Ascii)]
    #[case("ascii", DataFormat::Ascii)]
    #[case("ASC,8", DataFormat::Ascii)]
    #[case("ASC, 8", DataFormat::Ascii)]
    #[case("REAL,32", DataFormat::Real32)]
    #[case("real", DataFormat::Real32)]
    #[case("REAL,64", DataFormat::Real64)]
    #[case(" REAL 64 ", DataFormat::Real64)]
    fn parses_data_formats(#[case] text: &str, #[case] expected: DataFormat) {
        assert_eq!(text.parse::<DataFormat>(), Ok(expected));
    }

    #[rstest]
    #[case("REAL,16")]
    #[case("INT,32")]
    #[case("")]
    fn fails_for_unknown_data_formats(#[case] text: &str) {
        assert!(text.parse::<DataFormat>().is_err());
    }

    #[test]
    fn encodes_a_definite_length_block() {
        let block = encode_block(&[1.0, -2.0], DataFormat::Real64, ByteOrder::Big).unwrap();

        let mut expected = b"#216".to_vec();
        expected.extend_from_slice(&1.0f64.to_be_bytes());
        expected.extend_from_slice(&(-2.0f64).to_be_bytes());
        assert_eq!(block, expected);
    }

    #[test]
    fn encodes_an_empty_block() {
        assert_eq!(encode_block(&[], DataFormat::Real32, ByteOrder::Little).unwrap(), b"#10".to_vec());
    }

    #[test]
    fn refuses_to_encode_ascii() {
        assert_eq!(encode_block(&[1.0], DataFormat::Ascii, ByteOrder::Little), Err(DataFormatError::NotBinary));
    }

    #[rstest]
    #[case(DataFormat::Real32, ByteOrder::Little)]
    #[case(DataFormat::Real32, ByteOrder::Big)]
    #[case(DataFormat::Real64, ByteOrder::Little)]
    #[case(DataFormat::Real64, ByteOrder::Big)]
    fn decodes_what_it_encodes(#[case] format: DataFormat, #[case] byte_order: ByteOrder) {
        let values = vec![-90.5, -87.25, 0.0, 12.125];
        let mut block = encode_block(&values, format, byte_order).unwrap();
        block.push(b'\n');

        assert_eq!(decode_block(&block, format, byte_order).unwrap(), values);
    }

    #[test]
    fn decodes_an_indefinite_length_block() {
        let mut block = b"#0".to_vec();
        block.extend_from_slice(&3.5f32.to_le_bytes());

        assert_eq!(decode_block(&block, DataFormat::Real32, ByteOrder::Little).unwrap(), vec![3.5]);
    }

    #[rstest]
    #[case::no_header(b"1234".to_vec(), DataFormatError::MissingBlockHeader)]
    #[case::no_digit(b"#x".to_vec(), DataFormatError::MalformedBlockHeader)]
    #[case::short_length(b"#31".to_vec(), DataFormatError::MalformedBlockHeader)]
    #[case::truncated(b"#18abcd".to_vec(), DataFormatError::TruncatedBlock { expected: 8, actual: 4 })]
    #[case::misaligned(b"#13abc".to_vec(), DataFormatError::MisalignedPayload { length: 3, element_size: 4 })]
    fn fails_for_malformed_blocks(#[case] block: Vec<u8>, #[case] expected: DataFormatError) {
        assert_eq!(decode_block(&block, DataFormat::Real32, ByteOrder::Little), Err(expected));
    }
}
