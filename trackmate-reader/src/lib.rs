//! TrackMate XML Reader Library
//!
//! Reads the XML files exported by the ImageJ/Fiji TrackMate plugin into
//! in-memory tables for downstream analysis.
//!
//! # Architecture
//!
//! This library is intentionally small and focused on reading:
//! - Parses a TrackMate XML document in a single streaming pass
//! - Indexes spots by id and tracks by id and name
//! - Resolves the filtered-track set
//! - Follows tracks through division events (lineages) and extracts
//!   per-chain feature traces
//!
//! The library does NOT:
//! - Perform tracking (TrackMate produces the XML)
//! - Plot or visualize data
//! - Repair malformed tracking graphs
//!
//! # Example Usage
//!
//! ```no_run
//! use trackmate_reader::{ReaderConfig, SplitMode, TrackMateReader};
//! use std::path::Path;
//!
//! let config = ReaderConfig::new().with_split_mode(SplitMode::Duplicate);
//! let reader = TrackMateReader::load_with_config(Path::new("cells.xml"), config).unwrap();
//!
//! for track_id in reader.get_track_ids(true) {
//!     let lineage = reader.get_lineage(track_id, None).unwrap();
//!     println!("Track {}: {} chains", track_id, lineage.len());
//!
//!     for trace in reader.get_feature_trace(track_id, "MEAN_INTENSITY_CH1").unwrap() {
//!         println!("  chain {}: {:?}", trace.chain, trace.values());
//!     }
//! }
//! ```

// Public modules
pub mod config;
pub mod lineage;
pub mod reader;
pub mod tables;
pub mod trace;
pub mod types;

// Re-export main types for convenience
pub use config::{ReaderConfig, SplitMode};
pub use lineage::{Chain, Lineage};
pub use reader::TrackMateReader;
pub use tables::ModelStats;
pub use trace::{FeatureTrace, TracePoint};
pub use types::{
    Edge, ErrorKind, FeatureDeclaration, FeatureMap, FeatureScope, FeatureValue, ImageData,
    ReaderError, Result, Spot, SpotId, Track, TrackId,
};

// Internal modules (not exposed in public API)
mod xml;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: the smallest valid document loads
        let reader = TrackMateReader::load_str(
            "<TrackMate><Model><AllSpots/><AllTracks/><FilteredTracks/></Model></TrackMate>",
        )
        .unwrap();
        assert_eq!(reader.stats(), ModelStats::default());
        assert!(reader.get_track_ids(false).is_empty());
    }
}
