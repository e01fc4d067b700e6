//! Property tests: selection always yields an extractor, extraction always
//! yields a record, and no decoder panics on arbitrary input.

mod common;

use std::path::Path;

use nexuslims_extract::extractors::{ExtractError, ExtractionContext, Extractor, ExtractorRegistry};
use nexuslims_extract::formats::ini::{rewrite_multigis_sections, IniDocument};
use nexuslims_extract::metadata::RawRecord;
use nexuslims_extract::schema::{classify_field, field_spec, DatasetType};
use proptest::prelude::*;
use tempfile::tempdir;

const STUB_NAMES: [&str; 6] = ["stub_a", "stub_b", "stub_c", "stub_d", "stub_e", "stub_f"];
const STUB_EXTENSIONS: [&str; 4] = ["tif", "ser", "dm3", "spc"];

/// Claims one extension; on real files answers `accepts`.
struct Stub {
    name: &'static str,
    extension: &'static str,
    priority: i32,
    accepts: bool,
}

impl Extractor for Stub {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn supports(&self, ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError> {
        let matches = ctx.extension().as_deref() == Some(self.extension);
        Ok(matches && (!ctx.exists() || self.accepts))
    }

    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError> {
        Ok(vec![ctx.new_record(DatasetType::Misc, self.name)])
    }
}

fn stub_strategy() -> impl Strategy<Value = Vec<(usize, i32, bool)>> {
    prop::collection::vec((0..STUB_EXTENSIONS.len(), -5..5i32, any::<bool>()), 0..STUB_NAMES.len())
}

/// Valid leading bytes for each container, so fuzzed bodies reach the parsers.
fn magic(kind: usize) -> &'static [u8] {
    match kind {
        0 => b"II*\0\x08\0\0\0",
        1 => b"MM\0*\0\0\0\x08",
        2 => &[0, 0, 0, 3],
        3 => &[0, 0, 0, 4],
        4 => &[0x49, 0x49, 0x97, 0x01, 0x10, 0x02],
        5 => b"#FORMAT : EMSA/MAS Spectral Data File\n",
        6 => b"[User]\nUser=x\n[Beam]\n",
        _ => b"",
    }
}

fn extension_for(kind: usize) -> &'static str {
    match kind {
        0 | 1 | 6 => "tif",
        2 => "dm3",
        3 => "dm4",
        4 => "ser",
        5 => "msa",
        _ => "bin",
    }
}

mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// The selected extractor is the highest-priority accepting one,
        /// earliest registration first, else the fallback.
        #[test]
        fn test_select_follows_priority_then_registration(
            stubs in stub_strategy(),
            file_ext in 0..=STUB_EXTENSIONS.len(),
        ) {
            let mut registry = ExtractorRegistry::new();
            for (i, &(ext, priority, accepts)) in stubs.iter().enumerate() {
                registry
                    .register_decoder(Stub {
                        name: STUB_NAMES[i],
                        extension: STUB_EXTENSIONS[ext],
                        priority,
                        accepts,
                    })
                    .unwrap();
            }

            let extension = STUB_EXTENSIONS.get(file_ext).copied().unwrap_or("xyz");
            let dir = tempdir().unwrap();
            let path = common::write(dir.path(), &format!("sample.{extension}"), b"payload");

            let expected = stubs
                .iter()
                .enumerate()
                .filter(|(_, (ext, _, accepts))| STUB_EXTENSIONS[*ext] == extension && *accepts)
                .min_by_key(|(i, (_, priority, _))| (std::cmp::Reverse(*priority), *i))
                .map_or("basic_fallback", |(i, _)| STUB_NAMES[i]);

            let ctx = ExtractionContext::new(&path, None);
            prop_assert_eq!(registry.select(&ctx).name(), expected);
            prop_assert!(!registry.extract(&ctx).records().is_empty());
        }

        /// Arbitrary bodies behind valid magic never crash a decoder, and the
        /// damage always shows up as a warning.
        #[test]
        fn test_decoders_survive_arbitrary_bytes(
            kind in (0..8usize).prop_filter("raw INI text is a complete header", |k| *k != 6),
            body in prop::collection::vec(any::<u8>(), 0..2048),
        ) {
            let mut bytes = magic(kind).to_vec();
            bytes.extend_from_slice(&body);
            let dir = tempdir().unwrap();
            let path = common::write(dir.path(), &format!("fuzz.{}", extension_for(kind)), &bytes);

            let registry = ExtractorRegistry::with_builtin();
            let outcome = registry.extract(&ExtractionContext::new(&path, None));
            prop_assert!(!outcome.records().is_empty());
            if let Some(reason) = outcome.reason() {
                prop_assert!(!reason.contains("panicked"), "{}", reason);
            }
            for record in outcome.records() {
                prop_assert!(!record.data_type.is_empty());
                prop_assert!(!record.warnings.is_empty(), "kind {} gave no warnings", kind);
            }
        }

        /// Any cut through a series file after its header is reported.
        #[test]
        fn test_truncated_series_is_flagged(cut in 1..40usize) {
            let bytes = common::ser_file(common::SerSpec::image(8, 8));
            let dir = tempdir().unwrap();
            let path = common::write(dir.path(), "cut_1.ser", &bytes[..bytes.len() - cut]);

            let outcome = ExtractorRegistry::with_builtin().extract(&ExtractionContext::new(&path, None));
            for record in outcome.records() {
                prop_assert!(
                    record.warnings.iter().any(|w| w.starts_with("series file damaged")),
                    "{:?}",
                    record.warnings
                );
            }
        }

        /// Classification is a pure function of its inputs.
        #[test]
        fn test_classify_is_deterministic(
            name in prop_oneof![
                Just("acceleration_voltage".to_string()),
                Just("stage_position".to_string()),
                Just("channel_size".to_string()),
                Just("camera_length".to_string()),
                "[a-zA-Z_ ]{0,24}",
            ],
            type_index in 0..DatasetType::ALL.len(),
        ) {
            let dataset_type = DatasetType::ALL[type_index];
            let first = classify_field(&name, dataset_type);
            prop_assert_eq!(first, classify_field(&name, dataset_type));
            if field_spec(&name, dataset_type).is_some() {
                prop_assert!(first.0);
            }
            if first.1.is_some() {
                prop_assert!(first.0);
            }
        }

        /// Rewritten MultiGIS blocks always parse: gas sections become unique per unit.
        #[test]
        fn test_multigis_rewrite_yields_unique_sections(
            units in prop::collection::btree_set(1..20u32, 1..5),
            gases in prop::collection::btree_set(1..6u32, 1..4),
        ) {
            let mut text = String::from("[User]\nUser=x\n");
            for unit in &units {
                text.push_str(&format!("[MultiGISUnit{unit}]\nGisType=Pt\n"));
                for gas in &gases {
                    text.push_str(&format!("[MultiGISGas{gas}]\nFlow={gas}\n"));
                }
            }

            let rewritten = rewrite_multigis_sections(&text);
            let doc = IniDocument::parse(&rewritten).unwrap();
            prop_assert_eq!(doc.sections().count(), 1 + units.len() * (1 + gases.len()));
            for unit in &units {
                for gas in &gases {
                    let name = format!("MultiGISUnit{unit}.MultiGISGas{gas}");
                    let flow = gas.to_string();
                    prop_assert_eq!(doc.get(&name, "Flow"), Some(flow.as_str()));
                }
            }
        }
    }
}

#[test]
fn test_multigis_gas_before_any_unit() {
    let text = "[User]\nUser=x\n[MultiGISGas1]\nFlow=0\n\
                [MultiGISUnit1]\nGisType=Pt\n[MultiGISGas1]\nFlow=1\n\
                [MultiGISUnit2]\n[MultiGISGas1]\nFlow=2\n";
    let rewritten = rewrite_multigis_sections(text);
    let doc = IniDocument::parse(&rewritten).unwrap();
    // The leading gas has no parent unit and keeps its name.
    assert_eq!(doc.get("MultiGISGas1", "Flow"), Some("0"));
    assert_eq!(doc.get("MultiGISUnit1.MultiGISGas1", "Flow"), Some("1"));
    assert_eq!(doc.get("MultiGISUnit2.MultiGISGas1", "Flow"), Some("2"));
    assert_eq!(doc.sections().count(), 6);
}

#[test]
fn test_missing_file_still_yields_a_record() {
    let registry = ExtractorRegistry::with_builtin();
    let ctx = ExtractionContext::new(Path::new("/definitely/not/here/image.tif"), None);
    let outcome = registry.extract(&ctx);
    assert_eq!(outcome.records().len(), 1);
    assert!(outcome.records()[0].warnings.iter().any(|w| w == "Creation Time"));
}
