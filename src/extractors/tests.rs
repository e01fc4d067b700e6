use super::*;
use crate::metadata::{keys, RawRecord};
use crate::schema::DatasetType;

#[derive(Clone, Copy)]
enum Behaviour {
    Decode,
    DecodeError,
    DecodePanic,
    ProbePanic,
}

struct Stub {
    name: &'static str,
    priority: i32,
    extensions: &'static [&'static str],
    claims_files: bool,
    behaviour: Behaviour,
}

impl Stub {
    fn new(name: &'static str, priority: i32, claims_files: bool) -> Self {
        Self {
            name,
            priority,
            extensions: &["tif"],
            claims_files,
            behaviour: Behaviour::Decode,
        }
    }

    fn behaving(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    fn on(mut self, extensions: &'static [&'static str]) -> Self {
        self.extensions = extensions;
        self
    }
}

impl Extractor for Stub {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn supports(&self, ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError> {
        if let Behaviour::ProbePanic = self.behaviour {
            panic!("broken probe");
        }
        let ext_ok = self.extensions.is_empty()
            || ctx.extension().is_some_and(|e| self.extensions.contains(&e.as_str()));
        if !ctx.exists() {
            return Ok(!self.extensions.is_empty() && ext_ok);
        }
        Ok(ext_ok && self.claims_files)
    }

    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError> {
        match self.behaviour {
            Behaviour::Decode | Behaviour::ProbePanic => {
                Ok(vec![ctx.new_record(DatasetType::Image, self.name.to_string())])
            }
            Behaviour::DecodeError => Err(ExtractError::MissingMetadata("nothing here".into())),
            Behaviour::DecodePanic => panic!("index out of range"),
        }
    }
}

fn temp_file(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, b"not really an image").unwrap();
    (dir, path)
}

#[test]
fn test_higher_priority_declining_falls_through() {
    let mut registry = ExtractorRegistry::new();
    registry.register_decoder(Stub::new("a", 150, false)).unwrap();
    registry.register_decoder(Stub::new("b", 100, true)).unwrap();
    assert_eq!(registry.extractors_for("tif"), vec!["a", "b"]);

    let (_dir, path) = temp_file("x.tif");
    let ctx = ExtractionContext::new(&path, None);
    assert_eq!(registry.select(&ctx).name(), "b");
}

#[test]
fn test_equal_priority_first_registered_wins() {
    let mut registry = ExtractorRegistry::new();
    registry.register_decoder(Stub::new("first", 100, true)).unwrap();
    registry.register_decoder(Stub::new("second", 100, true)).unwrap();
    let (_dir, path) = temp_file("x.tif");
    assert_eq!(registry.select(&ExtractionContext::new(&path, None)).name(), "first");
}

#[test]
fn test_reregistration_keeps_slot() {
    let mut registry = ExtractorRegistry::new();
    registry.register_decoder(Stub::new("a", 100, true)).unwrap();
    registry.register_decoder(Stub::new("b", 100, true)).unwrap();
    registry.register_decoder(Stub::new("a", 100, true).on(&["tif", "png"])).unwrap();
    assert_eq!(registry.names(), vec!["a", "b"]);
    assert_eq!(registry.extractors_for("TIF"), vec!["a", "b"]);
    assert_eq!(registry.extractors_for("png"), vec!["a"]);
}

#[test]
fn test_wildcard_registration() {
    let mut registry = ExtractorRegistry::new();
    let registration = registry.register_decoder(Stub::new("sniffer", 10, true).on(&[])).unwrap();
    assert_eq!(registration, Registration::Wildcard);
    assert_eq!(registry.wildcard_names(), vec!["sniffer"]);
    assert!(registry.extensions().is_empty());

    let (_dir, path) = temp_file("odd.xyz");
    assert_eq!(registry.select(&ExtractionContext::new(&path, None)).name(), "sniffer");
}

#[test]
fn test_probe_failure_excludes_decoder() {
    let mut registry = ExtractorRegistry::new();
    let err = registry
        .register_decoder(Stub::new("broken", 100, true).behaving(Behaviour::ProbePanic))
        .unwrap_err();
    match err {
        RegistryError::ProbeFailed { name, failures, last_error } => {
            assert_eq!(name, "broken");
            assert_eq!(failures, PROBE_EXTENSIONS.len());
            assert!(last_error.contains("broken probe"));
        }
    }
    assert!(registry.is_empty());
}

#[test]
fn test_select_falls_back() {
    let registry = ExtractorRegistry::new();
    let ctx = ExtractionContext::new("/nonexistent/file.abc", None);
    assert_eq!(registry.select(&ctx).name(), registry.fallback().name());

    let mut registry = ExtractorRegistry::new();
    registry.register_decoder(Stub::new("a", 100, false)).unwrap();
    let (_dir, path) = temp_file("x.tif");
    assert_eq!(registry.select(&ExtractionContext::new(&path, None)).name(), "basic_fallback");
}

#[test]
fn test_decode_error_recovers() {
    let (_dir, path) = temp_file("x.tif");
    let ctx = ExtractionContext::new(&path, None);
    let outcome = Stub::new("bad", 100, true).behaving(Behaviour::DecodeError).extract(&ctx);
    assert!(outcome.is_recovered());
    let records = outcome.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].data_type, "Unknown");
    assert_eq!(records[0].dataset_type, DatasetType::Unknown);
    assert!(records[0].warnings.iter().any(|w| w.contains("nothing here")));
}

#[test]
fn test_decode_panic_recovers() {
    let (_dir, path) = temp_file("x.tif");
    let mut registry = ExtractorRegistry::new();
    registry
        .register_decoder(Stub::new("panicky", 100, true).behaving(Behaviour::DecodePanic))
        .unwrap();
    let outcome = registry.extract(&ExtractionContext::new(&path, None));
    assert!(outcome.reason().unwrap().contains("index out of range"));
    assert_eq!(outcome.into_records()[0].data_type, "Unknown");
}

#[test]
fn test_fallback_record() {
    let (_dir, path) = temp_file("notes.abc");
    let ctx = ExtractionContext::new(&path, None);
    let outcome = global_registry().extract(&ctx);
    assert!(!outcome.is_recovered());
    let record = &outcome.records()[0];
    assert_eq!(record.instrument_id, None);
    assert!(!record.warnings.iter().any(|w| w == keys::CREATION_TIME));
}

#[test]
fn test_missing_mtime_flags_creation_time() {
    let ctx = ExtractionContext::new("/nonexistent/dir/file.abc", None);
    let record = ctx.new_record(DatasetType::Misc, "Misc");
    assert!(record.warnings.iter().any(|w| w == keys::CREATION_TIME));
}

#[test]
fn test_builtin_registry_layout() {
    let registry = ExtractorRegistry::with_builtin();
    assert_eq!(
        registry.extractors_for("tif"),
        vec!["orion_fibics_tif", "tescan_tif", "quanta_tif"]
    );
    assert_eq!(registry.extractors_for("dm4"), vec!["dm3"]);
    assert_eq!(registry.extractors_for("ser"), vec!["ser_emi"]);
    assert_eq!(registry.extractors_for("msa"), vec!["msa"]);
    assert_eq!(registry.extractors_for("txt"), vec!["msa"]);
    assert!(registry.extractors_for("png").is_empty());
    assert!(registry.wildcard_names().is_empty());
}
