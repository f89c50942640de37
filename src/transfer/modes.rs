//! FTP Transfer modes
//!
//! Connection direction (active/passive) and the codec parameters negotiated
//! through MODE, STRU and TYPE.

use std::fmt;

/// Who opens the data connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Server connects out to the address announced by PORT/EPRT.
    Active,
    /// Server listens, client connects (PASV/EPSV).
    Passive,
    /// Neither PORT nor PASV issued yet.
    #[default]
    Unset,
}

/// MODE parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    /// End of data is signalled by closing the connection.
    #[default]
    Stream,
    /// Data is framed in descriptor/count blocks; the channel may be reused.
    Block,
}

/// STRU parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Structure {
    #[default]
    File,
    Record,
}

/// TYPE parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    Ascii,
    Image,
}

/// Codec parameters applied to the data pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecParams {
    pub mode: TransmissionMode,
    pub structure: Structure,
    pub data_type: DataType,
}

impl CodecParams {
    pub fn is_stream(&self) -> bool {
        self.mode == TransmissionMode::Stream
    }
}

impl TransmissionMode {
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg.trim().to_ascii_uppercase().as_str() {
            "S" => Some(Self::Stream),
            "B" => Some(Self::Block),
            _ => None,
        }
    }
}

impl Structure {
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg.trim().to_ascii_uppercase().as_str() {
            "F" => Some(Self::File),
            "R" => Some(Self::Record),
            _ => None,
        }
    }
}

impl DataType {
    /// Parses `A`, `A N`, `I` and `L 8`. Other forms are unsupported.
    pub fn from_arg(arg: &str) -> Option<Self> {
        let upper = arg.trim().to_ascii_uppercase();
        let mut parts = upper.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("A"), None | Some("N"), None) => Some(Self::Ascii),
            (Some("I"), None, None) | (Some("L"), Some("8"), None) => Some(Self::Image),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Ascii => f.write_str("ASCII"),
            DataType::Image => f.write_str("BINARY"),
        }
    }
}

impl fmt::Display for TransmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmissionMode::Stream => f.write_str("STREAM"),
            TransmissionMode::Block => f.write_str("BLOCK"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_arguments() {
        assert_eq!(DataType::from_arg("a"), Some(DataType::Ascii));
        assert_eq!(DataType::from_arg("A N"), Some(DataType::Ascii));
        assert_eq!(DataType::from_arg("I"), Some(DataType::Image));
        assert_eq!(DataType::from_arg("L 8"), Some(DataType::Image));
        assert_eq!(DataType::from_arg("E"), None);
        assert_eq!(DataType::from_arg("L 7"), None);
    }

    #[test]
    fn parses_mode_and_structure() {
        assert_eq!(TransmissionMode::from_arg("b"), Some(TransmissionMode::Block));
        assert_eq!(TransmissionMode::from_arg("C"), None);
        assert_eq!(Structure::from_arg("R"), Some(Structure::Record));
        assert_eq!(Structure::from_arg("P"), None);
    }
}
