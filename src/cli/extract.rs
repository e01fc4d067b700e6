use anyhow::{Context, Result};
use log::info;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use nexuslims_extract::config::ExtractConfig;
use nexuslims_extract::extractors::{Extraction, ExtractionContext, ExtractorRegistry};
use nexuslims_extract::metadata::InstrumentDb;
use nexuslims_extract::schema::CanonicalMetadata;

use super::report::ExtractionSummary;

/// Built-in registry with the SER decoder bound to the configured data root
pub fn build_registry(config: &ExtractConfig) -> Result<ExtractorRegistry> {
    config.registry().context("Failed to register the TIA decoder")
}

fn extract_one(registry: &ExtractorRegistry, instruments: &InstrumentDb, file: &Path) -> Extraction {
    let ctx = ExtractionContext::resolve(file, instruments);
    registry.extract(&ctx)
}

#[cfg(feature = "parallel")]
fn extract_all(registry: &ExtractorRegistry, instruments: &InstrumentDb, files: &[PathBuf]) -> Vec<Extraction> {
    use rayon::prelude::*;
    files
        .par_iter()
        .map(|file| extract_one(registry, instruments, file))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn extract_all(registry: &ExtractorRegistry, instruments: &InstrumentDb, files: &[PathBuf]) -> Vec<Extraction> {
    files
        .iter()
        .map(|file| extract_one(registry, instruments, file))
        .collect()
}

fn render(file: &Path, outcome: &Extraction, canonical: bool) -> Result<Value> {
    let records = outcome
        .records()
        .iter()
        .map(|record| {
            if canonical {
                let meta = CanonicalMetadata::from_raw(record)
                    .with_context(|| format!("Schema violation for {}", file.display()))?;
                Ok(serde_json::to_value(meta)?)
            } else {
                Ok(serde_json::to_value(record)?)
            }
        })
        .collect::<Result<Vec<Value>>>()?;
    Ok(json!({
        "file": file.display().to_string(),
        "records": records,
    }))
}

/// Extract every file and print a JSON array on stdout
pub fn run(config: &ExtractConfig, files: Vec<PathBuf>, canonical: bool, pretty: bool) -> Result<()> {
    let registry = build_registry(config)?;
    let instruments = config.instrument_db();
    info!(
        "Extracting {} file(s) with {} decoders, {} known instruments",
        files.len(),
        registry.len(),
        instruments.instruments().len()
    );

    let outcomes = extract_all(&registry, &instruments, &files);

    let mut summary = ExtractionSummary::default();
    let mut output = Vec::with_capacity(files.len());
    for (file, outcome) in files.iter().zip(&outcomes) {
        summary.add(file, outcome);
        output.push(render(file, outcome, canonical)?);
    }

    let output = Value::Array(output);
    let text = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{text}");

    if summary.has_warnings() {
        eprint!("{}", summary.format_colored());
    }
    Ok(())
}
