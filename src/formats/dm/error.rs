/// Errors that can occur while reading a DigitalMicrograph tag tree
#[derive(Debug, thiserror::Error)]
pub enum DmError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Header version is neither 3 nor 4
    #[error("unsupported DigitalMicrograph version {0}")]
    UnsupportedVersion(u32),

    /// Data tag without the `%%%%` delimiter
    #[error("missing %%%% delimiter in tag {0:?}")]
    BadDelimiter(String),

    /// Tag kind byte is neither group (20) nor data (21)
    #[error("unknown tag kind {kind} at offset {offset}")]
    UnknownTagKind {
        /// Kind byte
        kind: u8,
        /// Stream offset of the kind byte
        offset: u64,
    },

    /// Unknown encoded data type
    #[error("unknown data type {0}")]
    UnknownType(u64),

    /// Malformed type description
    #[error("malformed type info for tag {0:?}")]
    BadTypeInfo(String),

    /// Groups nested beyond the supported depth
    #[error("tag groups nested deeper than {0}")]
    TooDeep(usize),

    /// A count field exceeds its cap
    #[error("{what} count {count} exceeds limit")]
    TooMany {
        /// Which count
        what: &'static str,
        /// Declared value
        count: u64,
    },

    /// A read would run past the end of the stream
    #[error("need {needed} bytes at offset {position}, stream is {len} bytes")]
    Truncated {
        /// Bytes requested
        needed: u64,
        /// Current offset
        position: u64,
        /// Stream length
        len: u64,
    },
}
