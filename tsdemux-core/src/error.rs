//! Error types for packet, section, table and text-tree handling.

use thiserror::Error;

/// Errors raised while parsing a 188-byte transport packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer than 188 bytes were supplied.
    #[error("Packet too short: {0} bytes")]
    TooShort(usize),

    /// First byte is not 0x47.
    #[error("Invalid sync byte: 0x{0:02X}")]
    InvalidSync(u8),

    /// Adaptation field length points past the end of the packet.
    #[error("Adaptation field too long: {0} bytes")]
    InvalidAdaptationField(u8),
}

/// Structural errors of a section as a transport unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SectionError {
    /// Not even the 3-byte short header is present.
    #[error("Section too short: {0} bytes")]
    TooShort(usize),

    /// Declared section_length does not match the captured size.
    #[error("Section length mismatch: declared {declared} bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Declared size exceeds the 4096-byte protocol ceiling.
    #[error("Section too large: {0} bytes")]
    TooLarge(usize),

    /// Long section smaller than its fixed header plus CRC.
    #[error("Long section too short: section_length {0}")]
    LongSectionTooShort(usize),

    /// section_number greater than last_section_number.
    #[error("Invalid section number {number} (last {last})")]
    InvalidSectionNumber { number: u8, last: u8 },

    /// CRC32 embedded in the section does not match the computed one.
    #[error("CRC32 mismatch: section has 0x{expected:08X}, computed 0x{computed:08X}")]
    CrcMismatch { expected: u32, computed: u32 },

    /// Pointer field points past the end of the packet payload.
    #[error("Invalid pointer field {pointer} for {payload_size}-byte payload")]
    InvalidPointerField { pointer: usize, payload_size: usize },
}

/// Errors raised while assembling sections into a binary table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// A section does not share the identity of the sections already stored.
    #[error("Inconsistent section: {0}")]
    Inconsistent(&'static str),

    /// A short section was added to a multi-section table.
    #[error("Short section cannot be part of a multi-section table")]
    ShortSectionInLongTable,

    /// The table has no section at all.
    #[error("Empty table")]
    Empty,
}

/// Errors raised while importing a record from its text tree.
#[derive(Error, Debug)]
pub enum TreeError {
    /// A required attribute is absent.
    #[error("<{element}>: missing attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    /// An attribute value could not be parsed or is out of range.
    #[error("<{element}>: invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    /// An element has the wrong name.
    #[error("Unexpected element <{found}>, expected <{expected}>")]
    UnexpectedElement { expected: String, found: String },

    /// Hexadecimal content is malformed.
    #[error("<{element}>: invalid hexadecimal content")]
    InvalidHex { element: String },

    /// Element name is not registered.
    #[error("Unknown record <{0}>")]
    UnknownRecord(String),

    /// JSON serialization or parsing failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while serializing a record to binary form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A descriptor payload exceeds the 8-bit length field.
    #[error("Descriptor payload too large: {0} bytes")]
    DescriptorTooLarge(usize),

    /// A table needs more sections than its format allows.
    #[error("Table needs {0} sections")]
    TooManySections(usize),

    #[error(transparent)]
    Section(#[from] SectionError),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Registry installation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The process-wide registry was installed twice.
    #[error("Global registry already installed")]
    AlreadyInstalled,
}

/// Umbrella error for callers that handle everything the same way.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Section(#[from] SectionError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_mismatch_display() {
        let err = SectionError::CrcMismatch {
            expected: 0x1234_5678,
            computed: 0x0000_00FF,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x12345678"));
        assert!(msg.contains("0x000000FF"));
    }

    #[test]
    fn test_umbrella_from() {
        let err: Error = SectionError::TooShort(2).into();
        assert!(matches!(err, Error::Section(SectionError::TooShort(2))));
    }
}
