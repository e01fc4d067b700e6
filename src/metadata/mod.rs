//! # Record Metadata
//!
//! Types shared by every decoder: the loosely-typed value tree, the per-signal
//! [`RawRecord`], instruments and their lookup, and timestamp localization.
//!
//! A decoder only ever produces [`RawRecord`]s; validation against the
//! canonical schema happens later in [`crate::schema`].

mod instrument;
mod record;
pub mod time;
mod value;


pub use instrument::{parse_utc_offset, Instrument, InstrumentDb, InstrumentLookup, NoInstruments};
pub use record::{keys, RawRecord};
pub use value::{contains_path, get_path, insert_path, MetaValue, MetadataMap};
