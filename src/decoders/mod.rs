//! # Format decoders
//!
//! One [`Extractor`] per vendor format family. [`BUILTIN_DECODERS`] is the
//! static registration list the registry is built from; adding a format means
//! adding an entry there.
//!
//! | Decoder | Extensions | Priority |
//! |---|---|---|
//! | [`OrionFibicsTiffDecoder`] | tif, tiff | 150 |
//! | [`TescanTiffDecoder`] | tif, tiff | 120 |
//! | [`QuantaTiffDecoder`] | tif, tiff | 100 |
//! | [`Dm3Decoder`] | dm3, dm4 | 100 |
//! | [`SerEmiDecoder`] | ser | 100 |
//! | [`MsaDecoder`] | msa, txt | 100 |
//! | [`BasicFallbackDecoder`] | everything | 0 |

mod digital_micrograph;
mod fallback;
mod msa;
mod orion_fibics;
mod quanta;
mod ser_emi;
mod tescan;

pub use digital_micrograph::Dm3Decoder;
pub use fallback::BasicFallbackDecoder;
pub use msa::MsaDecoder;
pub use orion_fibics::OrionFibicsTiffDecoder;
pub use quanta::QuantaTiffDecoder;
pub use ser_emi::SerEmiDecoder;
pub use tescan::TescanTiffDecoder;

use std::sync::Arc;

use crate::extractors::{ExtractionContext, Extractor};

/// Factories for every built-in decoder, in registration order.
pub static BUILTIN_DECODERS: &[fn() -> Arc<dyn Extractor>] = &[
    || Arc::new(Dm3Decoder),
    || Arc::new(SerEmiDecoder::from_env()),
    || Arc::new(QuantaTiffDecoder),
    || Arc::new(TescanTiffDecoder),
    || Arc::new(OrionFibicsTiffDecoder),
    || Arc::new(MsaDecoder),
];

/// Whether the context's extension is one of `extensions` (lower-case).
fn has_extension(ctx: &ExtractionContext<'_>, extensions: &[&str]) -> bool {
    ctx.extension()
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

/// Byte-substring search.
fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `(w, h, …)` text used for `data_dimensions`.
fn dimensions_text<I: IntoIterator<Item = u64>>(dims: I) -> String {
    let dims: Vec<String> = dims.into_iter().map(|d| d.to_string()).collect();
    match dims.len() {
        1 => format!("({},)", dims[0]),
        _ => format!("({})", dims.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_text() {
        assert_eq!(dimensions_text([1024]), "(1024,)");
        assert_eq!(dimensions_text([1024, 884]), "(1024, 884)");
    }

    #[test]
    fn test_find_bytes() {
        assert_eq!(find_bytes(b"abc[User]", b"[User]"), Some(3));
        assert_eq!(find_bytes(b"ab", b"[User]"), None);
        assert_eq!(find_bytes(b"ab", b""), None);
    }

    #[test]
    fn test_builtin_names_unique() {
        let mut names: Vec<_> = BUILTIN_DECODERS.iter().map(|f| f().name()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
