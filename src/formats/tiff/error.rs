/// Errors that can occur while reading a TIFF directory
#[derive(Debug, thiserror::Error)]
pub enum TiffError {
    /// I/O error, including truncated files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// First two bytes are neither `II` nor `MM`
    #[error("invalid byte-order mark {0:?}")]
    BadByteOrder([u8; 2]),

    /// Version is neither 42 (TIFF) nor 43 (BigTIFF)
    #[error("invalid TIFF version {0}")]
    BadVersion(u16),

    /// An offset points outside the file
    #[error("offset {offset} out of bounds for file of {len} bytes")]
    OffsetOutOfBounds {
        /// Offending offset
        offset: u64,
        /// File length
        len: u64,
    },

    /// Directory entry count beyond the supported maximum
    #[error("directory declares {0} entries")]
    TooManyEntries(u64),
}
