use crate::formats::xml::XmlError;

/// Errors that can occur while reading TIA `.ser`/`.emi` files
#[derive(Debug, thiserror::Error)]
pub enum SerError {
    /// I/O error, including truncated files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Byte-order word is not `0x4949`
    #[error("invalid byte order 0x{0:04x}")]
    BadByteOrder(u16),

    /// Series identifier is not `0x0197`
    #[error("invalid series id 0x{0:04x}")]
    BadSeriesId(u16),

    /// Series version other than 0x0210/0x0220
    #[error("unsupported series version 0x{0:04x}")]
    UnsupportedVersion(u16),

    /// Data type id other than 1D/2D
    #[error("unknown data type id 0x{0:04x}")]
    UnknownDataType(u32),

    /// Tag type id other than time/time+position
    #[error("unknown tag type id 0x{0:04x}")]
    UnknownTagType(u32),

    /// A count or length beyond its cap
    #[error("{what} {count} exceeds limit")]
    TooMany {
        /// Which field
        what: &'static str,
        /// Declared value
        count: u64,
    },

    /// An offset points outside the file
    #[error("offset {offset} out of bounds for file of {len} bytes")]
    OffsetOutOfBounds {
        /// Offending offset
        offset: u64,
        /// File length
        len: u64,
    },

    /// Companion `.emi` has no `<ObjectInfo>` block
    #[error("no <ObjectInfo> block found")]
    NoObjectInfo,

    /// Malformed ObjectInfo XML
    #[error("invalid ObjectInfo XML: {0}")]
    Xml(#[from] XmlError),
}
