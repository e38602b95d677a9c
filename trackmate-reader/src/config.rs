//! Reader configuration types
//!
//! The reader needs very little configuration: how lineages treat division
//! events and how strict loading is about optional document sections.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for the TrackMate reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// How lineage chains are formed at split points
    #[serde(default)]
    pub split_mode: SplitMode,

    /// Fail loading when the `FilteredTracks` element is absent
    #[serde(default = "default_true")]
    pub require_filtered_tracks: bool,

    /// Parse the `DisplaySettings` JSON payload
    #[serde(default = "default_true")]
    pub parse_display_settings: bool,

    /// Compare the `nspots` attribute against the spots actually read
    #[serde(default = "default_true")]
    pub validate_nspots: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            split_mode: SplitMode::default(),
            require_filtered_tracks: true,
            parse_display_settings: true,
            validate_nspots: true,
        }
    }
}

/// How a lineage chain behaves when a spot has several outgoing edges
///
/// Outgoing edges are always taken in the order they appear in the XML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Continue on the first child; every other child gets a new chain
    /// holding a copy of the full history up to the split
    #[default]
    Duplicate,
    /// Continue on the first child; every other child gets a new chain
    /// starting at the split spot
    Continue,
    /// End the chain at the split; every child gets a new chain starting at
    /// the split spot
    Break,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitMode::Duplicate => write!(f, "duplicate"),
            SplitMode::Continue => write!(f, "continue"),
            SplitMode::Break => write!(f, "break"),
        }
    }
}

impl ReaderConfig {
    /// Create a new reader configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the split mode used by lineage queries
    pub fn with_split_mode(mut self, mode: SplitMode) -> Self {
        self.split_mode = mode;
        self
    }

    /// Builder method: require or tolerate a missing `FilteredTracks` element
    pub fn with_required_filtered_tracks(mut self, required: bool) -> Self {
        self.require_filtered_tracks = required;
        self
    }

    /// Builder method: enable or disable `DisplaySettings` parsing
    pub fn with_display_settings(mut self, enabled: bool) -> Self {
        self.parse_display_settings = enabled;
        self
    }

    /// Builder method: enable or disable the `nspots` consistency check
    pub fn with_nspots_validation(mut self, enabled: bool) -> Self {
        self.validate_nspots = enabled;
        self
    }
}
