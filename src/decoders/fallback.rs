use crate::extractors::{ExtractError, ExtractionContext, Extractor};
use crate::metadata::RawRecord;
use crate::schema::DatasetType;

/// Terminal decoder: accepts every file and reports only filesystem facts.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFallbackDecoder;

impl BasicFallbackDecoder {
    /// Warning attached to every fallback record
    pub const WARNING: &'static str = "no format-specific decoder recognized this file";
}

impl Extractor for BasicFallbackDecoder {
    fn name(&self) -> &'static str {
        "basic_fallback"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn supports(&self, _ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError> {
        Ok(true)
    }

    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError> {
        let mut record = ctx.new_record(DatasetType::Unknown, "Unknown");
        record.warn(Self::WARNING);
        Ok(vec![record])
    }
}
