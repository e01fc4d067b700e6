use anyhow::Result;

use nexuslims_extract::config::ExtractConfig;

use super::extract::build_registry;

/// Print the registry layout
pub fn run(config: &ExtractConfig) -> Result<()> {
    let registry = build_registry(config)?;

    println!("Registered Decoders");
    println!("===================");
    for name in registry.names() {
        if let Some(extractor) = registry.get(name) {
            println!("  {:<20} priority {}", name, extractor.priority());
        }
    }
    println!();

    println!("Selection Order by Extension:");
    for ext in registry.extensions() {
        println!("  .{:<6} {}", ext, registry.extractors_for(ext).join(" > "));
    }
    let wildcards = registry.wildcard_names();
    if !wildcards.is_empty() {
        println!("  *       {}", wildcards.join(" > "));
    }
    println!("  (fallback) {}", registry.fallback().name());
    Ok(())
}
