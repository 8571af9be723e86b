//! # flightdeck-codec
//!
//! Markdown plan-file codec: YAML front-matter parse and merge-write with
//! body preservation, plus plan-directory scanning.
//!
//! The sync engine treats this crate as a black box: parse a file into
//! `{fields, body}`, or merge field updates back into a file.

pub mod error;
pub mod front_matter;
pub mod plan;

pub use error::CodecError;
pub use front_matter::{check_items, parse, write, FrontMatterFile};
pub use plan::{scan_plan_dir, ParsedPhaseFile, ParsedPlan};
