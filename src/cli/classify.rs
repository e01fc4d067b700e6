use anyhow::Result;

use nexuslims_extract::glossary::term_for_field;
use nexuslims_extract::schema::{classify_field, field_spec, DatasetType};

/// Print whether `field` is a core field of `dataset_type`
pub fn run(field: &str, dataset_type: DatasetType) -> Result<()> {
    let (is_core, glossary_id) = classify_field(field, dataset_type);
    println!("Field: {field}");
    println!("Dataset type: {dataset_type}");
    println!("Core: {}", if is_core { "yes" } else { "no (routed to extensions)" });
    if let Some(unit) = field_spec(field, dataset_type).and_then(|spec| spec.kind.unit()) {
        println!("Preferred unit: {} ({})", unit.symbol(), unit.name());
    }
    if let Some(id) = glossary_id {
        let label = term_for_field(field).map(|t| t.label).unwrap_or_default();
        println!("EM Glossary: {id} ({label})");
    }
    Ok(())
}
