//! Main reader API
//!
//! [`TrackMateReader`] is the entry point of the library. It is built in one
//! pass by [`TrackMateReader::load`] and is read-only afterwards, so a loaded
//! reader can be shared between threads for concurrent queries.

use crate::config::{ReaderConfig, SplitMode};
use crate::lineage::{self, Lineage};
use crate::tables::{ModelStats, SpotTable, TrackTable};
use crate::trace::{self, FeatureTrace};
use crate::types::{
    Edge, FeatureDeclaration, FeatureScope, ImageData, ReaderError, Result, Spot, SpotId, Track,
    TrackId,
};
use crate::xml::{self, ParsedDocument};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A loaded TrackMate document
#[derive(Debug)]
pub struct TrackMateReader {
    config: ReaderConfig,
    /// File the document was loaded from (None for in-memory input)
    source: Option<PathBuf>,
    version: Option<String>,
    spatial_units: Option<String>,
    time_units: Option<String>,
    log: Option<String>,
    declarations: BTreeMap<FeatureScope, Vec<FeatureDeclaration>>,
    image_data: Option<ImageData>,
    display_settings: Option<serde_json::Value>,
    spots: SpotTable,
    tracks: TrackTable,
}

impl TrackMateReader {
    /// Load a TrackMate XML file with the default configuration
    ///
    /// # Example
    /// ```no_run
    /// use trackmate_reader::TrackMateReader;
    /// use std::path::Path;
    ///
    /// let reader = TrackMateReader::load(Path::new("cells.xml")).unwrap();
    /// println!("TrackMate version {:?}", reader.version());
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_config(path, ReaderConfig::default())
    }

    /// Load a TrackMate XML file
    ///
    /// Fails with a parse error if the file is not well-formed XML or lacks
    /// the TrackMate structure, and with an I/O error if it cannot be read.
    pub fn load_with_config(path: &Path, config: ReaderConfig) -> Result<Self> {
        log::info!("Loading TrackMate file: {:?}", path);

        let file = File::open(path)?;
        let reader = BufReader::with_capacity(64 * 1024, file);
        let mut loaded = Self::load_reader(reader, config)?;
        loaded.source = Some(path.to_path_buf());

        log::info!("TrackMate file loaded successfully: {:?}", path);
        Ok(loaded)
    }

    /// Load a TrackMate document held in memory
    pub fn load_str(xml: &str) -> Result<Self> {
        Self::load_reader(xml.as_bytes(), ReaderConfig::default())
    }

    /// Load a TrackMate document from any buffered reader
    pub fn load_reader<R: BufRead>(input: R, config: ReaderConfig) -> Result<Self> {
        let doc = xml::parse_document(input, &config)?;
        Self::from_document(doc, config)
    }

    fn from_document(doc: ParsedDocument, config: ReaderConfig) -> Result<Self> {
        let ParsedDocument {
            version,
            spatial_units,
            time_units,
            log: log_text,
            declarations,
            image_data,
            display_settings,
            declared_nspots,
            spots,
            tracks,
            filtered_tracks,
        } = doc;

        if config.validate_nspots {
            if let Some(declared) = declared_nspots {
                if declared != spots.len() {
                    log::warn!(
                        "AllSpots declares {} spots but {} were found",
                        declared,
                        spots.len()
                    );
                }
            }
        }

        let spots = SpotTable::build(spots)?;
        let tracks = TrackTable::build(tracks, filtered_tracks.unwrap_or_default(), &spots)?;

        let stats = ModelStats::collect(&spots, &tracks);
        log::debug!(
            "Model: {} spots in {} frames, {} tracks ({} filtered), {} edges",
            stats.num_spots,
            stats.num_frames,
            stats.num_tracks,
            stats.num_filtered_tracks,
            stats.num_edges
        );

        Ok(Self {
            config,
            source: None,
            version,
            spatial_units,
            time_units,
            log: log_text,
            declarations,
            image_data,
            display_settings,
            spots,
            tracks,
        })
    }

    /// Get a spot by id
    pub fn get_spot(&self, spot_id: SpotId) -> Result<&Spot> {
        self.spots
            .get(spot_id)
            .ok_or(ReaderError::SpotNotFound(spot_id))
    }

    /// Iterate over all spots in document order
    pub fn spots(&self) -> impl Iterator<Item = &Spot> {
        self.spots.iter()
    }

    /// Track ids in document order, optionally only those that passed
    /// TrackMate's track filters
    pub fn get_track_ids(&self, filtered_only: bool) -> Vec<TrackId> {
        self.tracks.ids(filtered_only)
    }

    /// Get a track by id
    pub fn get_track(&self, track_id: TrackId) -> Result<&Track> {
        self.tracks
            .get(track_id)
            .ok_or(ReaderError::TrackNotFound(track_id))
    }

    /// Get a track by its `name` attribute
    pub fn get_track_by_name(&self, name: &str) -> Result<&Track> {
        self.tracks
            .get_by_name(name)
            .ok_or_else(|| ReaderError::TrackNameNotFound(name.to_string()))
    }

    /// Iterate over all tracks in document order
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// True if the track passed TrackMate's track filters
    pub fn is_filtered(&self, track_id: TrackId) -> bool {
        self.tracks.is_filtered(track_id)
    }

    /// Edges of a track in document order
    pub fn get_track_edges(&self, track_id: TrackId) -> Result<&[Edge]> {
        Ok(&self.get_track(track_id)?.edges)
    }

    /// Follow a track from its root spot(s), or from `start`, splitting into
    /// a new chain at every division
    ///
    /// Uses the split mode from the reader configuration. Sibling chains are
    /// ordered like the outgoing edges in the XML; TrackMate does not promise
    /// a particular edge order, so chain numbering at a split should not be
    /// relied on across re-exports of the same data.
    pub fn get_lineage(&self, track_id: TrackId, start: Option<SpotId>) -> Result<Lineage> {
        self.get_lineage_with_mode(track_id, start, self.config.split_mode)
    }

    /// Like [`get_lineage`](Self::get_lineage) with an explicit split mode
    pub fn get_lineage_with_mode(
        &self,
        track_id: TrackId,
        start: Option<SpotId>,
        mode: SplitMode,
    ) -> Result<Lineage> {
        let track = self.get_track(track_id)?;
        if let Some(spot) = start {
            self.get_spot(spot)?;
        }
        lineage::walk(track, start, mode)
    }

    /// Values of a numeric spot feature along every chain of a track
    ///
    /// # Example
    /// ```no_run
    /// use trackmate_reader::{TrackId, TrackMateReader};
    /// use std::path::Path;
    ///
    /// let reader = TrackMateReader::load(Path::new("cells.xml")).unwrap();
    /// for trace in reader.get_feature_trace(TrackId(1), "MEAN_INTENSITY_CH1").unwrap() {
    ///     println!("chain {}: {:?}", trace.chain, trace.values());
    /// }
    /// ```
    pub fn get_feature_trace(&self, track_id: TrackId, feature: &str) -> Result<Vec<FeatureTrace>> {
        self.get_feature_trace_with_mode(track_id, feature, self.config.split_mode)
    }

    /// Like [`get_feature_trace`](Self::get_feature_trace) with an explicit split mode
    pub fn get_feature_trace_with_mode(
        &self,
        track_id: TrackId,
        feature: &str,
        mode: SplitMode,
    ) -> Result<Vec<FeatureTrace>> {
        let lineage = self.get_lineage_with_mode(track_id, None, mode)?;
        trace::build_traces(&lineage, &self.spots, feature)
    }

    /// TrackMate version that wrote the file
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn spatial_units(&self) -> Option<&str> {
        self.spatial_units.as_deref()
    }

    pub fn time_units(&self) -> Option<&str> {
        self.time_units.as_deref()
    }

    /// Content of the `Log` element
    pub fn log(&self) -> Option<&str> {
        self.log.as_deref()
    }

    pub fn image_data(&self) -> Option<&ImageData> {
        self.image_data.as_ref()
    }

    /// Declared features for spots, edges or tracks
    pub fn feature_declarations(&self, scope: FeatureScope) -> &[FeatureDeclaration] {
        self.declarations
            .get(&scope)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Parsed `DisplaySettings` JSON
    pub fn display_settings(&self) -> Option<&serde_json::Value> {
        self.display_settings.as_ref()
    }

    /// File this document was loaded from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Get statistics about the loaded document
    pub fn stats(&self) -> ModelStats {
        ModelStats::collect(&self.spots, &self.tracks)
    }
}
