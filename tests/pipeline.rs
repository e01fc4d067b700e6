//! End to end: configuration, instrument lookup, extraction and canonical JSON.

mod common;

use common::{emi_file, ser_file, tiff, write, SerSpec, ASCII};
use nexuslims_extract::prelude::*;
use tempfile::tempdir;

fn config_for(root: &std::path::Path) -> ExtractConfig {
    let toml = format!(
        r#"
        instrument_data_path = "{}"

        [[instruments]]
        name = "FEI-Quanta200-ESEM"
        filestore_path = "Quanta"
        timezone = "-05:00"

        [[instruments]]
        name = "FEI-Quanta200-ESEM-cryo"
        filestore_path = "Quanta/cryo"
        timezone = "-05:00"
        "#,
        root.display().to_string().replace('\\', "\\\\")
    );
    ExtractConfig::from_str(&toml).unwrap()
}

#[test]
fn test_instrument_resolved_by_longest_prefix() {
    let root = tempdir().unwrap();
    let cryo = root.path().join("Quanta").join("cryo");
    std::fs::create_dir_all(&cryo).unwrap();
    let ini = b"[User]\nDate=12/05/2023\nTime=09:00:00\nUser=op\n[Beam]\nHV=20000\n";
    let path = write(&cryo, "frozen.tif", &tiff(&[(34682, ASCII, ini)]));

    let db = config_for(root.path()).instrument_db();
    let outcome = extract_file(&path, &db);
    let record = &outcome.records()[0];
    assert_eq!(record.instrument_id.as_deref(), Some("FEI-Quanta200-ESEM-cryo"));
    assert_eq!(record.creation_time.to_rfc3339(), "2023-12-05T09:00:00-05:00");
}

#[test]
fn test_unknown_location_has_null_instrument() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "stray.tif", &tiff(&[(34682, ASCII, b"[User]\nUser=x\n")]));
    let outcome = extract_file(&path, &NoInstruments);
    let record = &outcome.records()[0];
    assert_eq!(record.instrument_id, None);

    let flat: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
    assert!(flat["Instrument ID"].is_null());
    assert_eq!(flat["DatasetType"], "Image");
    assert_eq!(flat["Data Type"], "SEM_Imaging");
}

#[test]
fn test_canonical_json_shape() {
    let root = tempdir().unwrap();
    let quanta = root.path().join("Quanta");
    std::fs::create_dir_all(&quanta).unwrap();
    let ini = b"[User]\nUser=op\n[Beam]\nHV=15000\n[Stage]\nStageX=0.001\nWorkingDistance=0.0101\n";
    let path = write(&quanta, "grain.tif", &tiff(&[(34682, ASCII, ini)]));

    let db = config_for(root.path()).instrument_db();
    let record = extract_file(&path, &db).into_records().remove(0);
    let canonical = CanonicalMetadata::from_raw(&record).unwrap();
    let json: serde_json::Value = serde_json::from_str(&canonical.to_json().unwrap()).unwrap();

    assert_eq!(json["dataset_type"], "Image");
    assert_eq!(json["data_type"], "SEM_Imaging");
    assert_eq!(json["instrument_id"], "FEI-Quanta200-ESEM");
    assert_eq!(json["acceleration_voltage"]["units"], "kilovolt");
    assert_eq!(json["acceleration_voltage"]["value"], 15.0);
    assert_eq!(json["stage_position"]["x"]["units"], "micrometer");
    assert_eq!(json["warnings"][0], "Operator");
    assert_eq!(json["extensions"]["Operator"], "op");
    assert!(json["extensions"]["FEI_Metadata"]["Beam"].is_object());
    assert!(json.get("Operator").is_none());
}

#[test]
fn test_config_registry_uses_toml_data_root() {
    let root = tempdir().unwrap();
    let folder = root.path().join("Quanta");
    std::fs::create_dir_all(&folder).unwrap();
    let path = write(&folder, "scan_1.ser", &ser_file(SerSpec::image(32, 32)));
    write(&folder, "scan.emi", &emi_file(&[("Mode", "TEM uP SA Zoom Image", "")]));

    let config = config_for(root.path());
    let registry = config.registry().unwrap();
    let db = config.instrument_db();
    let record = registry
        .extract(&ExtractionContext::resolve(&path, &db))
        .into_records()
        .remove(0);
    let expected = std::path::Path::new("Quanta").join("scan.emi");
    assert_eq!(
        record.get("emi Filename").and_then(MetaValue::as_str),
        Some(expected.display().to_string().as_str())
    );
}

#[test]
fn test_duplicate_instrument_rejected() {
    let toml = r#"
        [[instruments]]
        name = "A"
        [[instruments]]
        name = "A"
    "#;
    assert!(matches!(
        ExtractConfig::from_str(toml),
        Err(ConfigError::DuplicateInstrument(name)) if name == "A"
    ));
}
