//! Low-level readers for the vendor containers.
//!
//! These modules know nothing about canonical fields; they turn bytes into
//! navigable trees that the decoders in [`crate::decoders`] map onto records.
//!
//! - [`tiff`] - first image directory of TIFF/BigTIFF files
//! - [`ini`] - FEI/Tescan INI text, with the repair passes those files need
//! - [`xml`] - owned element tree for Zeiss, Fibics, FEI and TIA XML
//! - [`dm`] - Gatan DigitalMicrograph DM3/DM4 tag trees
//! - [`ser`] - FEI TIA `.ser` headers and `.emi` ObjectInfo

pub mod dm;
pub mod ini;
pub mod ser;
pub mod tiff;
pub mod xml;
