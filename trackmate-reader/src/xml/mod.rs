//! TrackMate XML parsing
//!
//! This module turns a TrackMate XML document into a raw [`ParsedDocument`].
//! Structural validation (unique ids, dangling edges) is done afterwards when
//! the document is turned into lookup tables.

pub mod parser;

pub use parser::{parse_document, ParsedDocument};
