//! # nexuslims-extract
//!
//! Command-line front end for the metadata extraction engine.
//!
//! ## Usage
//!
//! ```bash
//! # Print raw records as JSON
//! nexuslims-extract extract scan.dm3 image.tif --pretty
//!
//! # Print schema-validated records
//! nexuslims-extract --config nexuslims.toml extract scan.ser --canonical
//!
//! # Show which decoders handle which extensions
//! nexuslims-extract decoders
//! ```

mod cli;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
