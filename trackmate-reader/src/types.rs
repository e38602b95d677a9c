//! Core types for the TrackMate reader library
//!
//! This module defines the records the reader builds while loading a TrackMate
//! XML file (spots, edges, tracks, document metadata) together with the error
//! type shared by every operation. All records are immutable once loaded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Result type for reader operations
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Identifier of a spot (`ID` attribute), unique across the whole document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpotId(pub u64);

/// Identifier of a track (`TRACK_ID` attribute)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for SpotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SpotId {
    fn from(id: u64) -> Self {
        SpotId(id)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        TrackId(id)
    }
}

/// Errors that can occur while loading or querying a TrackMate file
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("Failed to parse TrackMate XML: {0}")]
    ParseError(String),

    #[error("Malformed XML at byte {position}: {source}")]
    XmlSyntax {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Spot not found: {0}")]
    SpotNotFound(SpotId),

    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("Track not found: no track named '{0}'")]
    TrackNameNotFound(String),

    #[error("Feature '{feature}' has no numeric value on spot {spot}")]
    FeatureNotFound { spot: SpotId, feature: String },

    #[error("Cycle detected in track {track} at spot {spot}")]
    CyclicGraph { track: TrackId, spot: SpotId },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Broad category of a [`ReaderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input is not well-formed XML or not a TrackMate document
    Parse,
    /// An unknown spot, track or feature was requested
    Lookup,
    /// Lineage traversal found a cycle
    CyclicGraph,
    /// The input could not be read
    Io,
}

impl ReaderError {
    /// Get the category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReaderError::ParseError(_) | ReaderError::XmlSyntax { .. } => ErrorKind::Parse,
            ReaderError::SpotNotFound(_)
            | ReaderError::TrackNotFound(_)
            | ReaderError::TrackNameNotFound(_)
            | ReaderError::FeatureNotFound { .. } => ErrorKind::Lookup,
            ReaderError::CyclicGraph { .. } => ErrorKind::CyclicGraph,
            ReaderError::IoError(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        ReaderError::ParseError(msg.into())
    }
}

/// A single feature value as stored in an XML attribute
///
/// TrackMate writes almost every feature as a number, but the set of
/// attributes changes between versions and plugins, so anything that does
/// not parse as a float is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Numeric feature (integers are stored as floats, as TrackMate does)
    Number(f64),
    /// Any other attribute text
    Text(String),
}

impl FeatureValue {
    /// Interpret raw attribute text
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(v) => FeatureValue::Number(v),
            Err(_) => FeatureValue::Text(raw.to_string()),
        }
    }

    /// Numeric value, if this feature is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) => Some(*v),
            FeatureValue::Text(_) => None,
        }
    }

    /// Text value, if this feature is not a number
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Number(_) => None,
            FeatureValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(v) => write!(f, "{}", v),
            FeatureValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Feature name → value, ordered by name
pub type FeatureMap = BTreeMap<String, FeatureValue>;

/// One detected object at one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spot {
    /// Unique spot identifier
    pub id: SpotId,
    /// Display name (`name` attribute, e.g. "ID1234")
    pub name: Option<String>,
    /// Frame index
    pub frame: u32,
    /// Every other attribute (FRAME, POSITION_X, MEAN_INTENSITY_CH1, ...)
    pub features: FeatureMap,
    /// Polygon vertices (x0, y0, x1, y1, ...) relative to the spot center
    pub roi: Option<Vec<f64>>,
}

impl Spot {
    /// Get a feature by name
    pub fn feature(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }

    /// Get a numeric feature by name
    pub fn numeric_feature(&self, name: &str) -> Option<f64> {
        self.feature(name).and_then(FeatureValue::as_f64)
    }

    /// Spatial position (POSITION_X, POSITION_Y, POSITION_Z)
    pub fn position(&self) -> Option<[f64; 3]> {
        Some([
            self.numeric_feature("POSITION_X")?,
            self.numeric_feature("POSITION_Y")?,
            self.numeric_feature("POSITION_Z").unwrap_or(0.0),
        ])
    }

    /// Time in physical units (POSITION_T)
    pub fn time(&self) -> Option<f64> {
        self.numeric_feature("POSITION_T")
    }

    /// ROI polygon as (x, y) vertex pairs
    pub fn roi_points(&self) -> Vec<(f64, f64)> {
        match &self.roi {
            Some(coords) => coords.chunks_exact(2).map(|p| (p[0], p[1])).collect(),
            None => Vec::new(),
        }
    }
}

/// Directed link between two spots of the same track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    /// Source spot (earlier frame)
    pub source: SpotId,
    /// Target spot (later frame)
    pub target: SpotId,
    /// Edge features (LINK_COST, EDGE_TIME, ...)
    pub features: FeatureMap,
}

/// A track: a possibly branching graph of edges with summary features
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    /// Unique track identifier
    pub id: TrackId,
    /// Track name (e.g. "Track_0")
    pub name: String,
    /// Summary features computed by TrackMate (NUMBER_SPOTS, TRACK_DURATION, ...)
    pub features: FeatureMap,
    /// Edges in document order
    pub edges: Vec<Edge>,
}

impl Track {
    /// Get a summary feature by name
    pub fn feature(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }

    /// Number of distinct spots referenced by the edges of this track
    pub fn spot_count(&self) -> usize {
        let mut ids: Vec<SpotId> = self
            .edges
            .iter()
            .flat_map(|e| [e.source, e.target])
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Which kind of object a feature declaration applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureScope {
    Spot,
    Edge,
    Track,
}

impl fmt::Display for FeatureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureScope::Spot => write!(f, "Spot"),
            FeatureScope::Edge => write!(f, "Edge"),
            FeatureScope::Track => write!(f, "Track"),
        }
    }
}

/// Entry of the `FeatureDeclarations` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureDeclaration {
    /// Attribute key (e.g. "MEAN_INTENSITY_CH1")
    pub feature: String,
    /// Human readable name
    pub name: String,
    /// Short name used in table headers
    pub short_name: String,
    /// Physical dimension (INTENSITY, POSITION, TIME, NONE, ...)
    pub dimension: String,
    /// True if TrackMate stores integer values for this feature
    pub is_int: bool,
}

/// Source image information from `Settings/ImageData`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageData {
    pub filename: Option<String>,
    pub folder: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub nslices: Option<u32>,
    pub nframes: Option<u32>,
    pub pixel_width: Option<f64>,
    pub pixel_height: Option<f64>,
    pub voxel_depth: Option<f64>,
    pub time_interval: Option<f64>,
}
