//! Indexed spot and track tables
//!
//! Spots and tracks are stored in document order and indexed by identifier
//! for constant-time lookup. Building the tables checks the structural
//! invariants TrackMate guarantees for its own output; a document violating
//! them is rejected as a whole.

use crate::types::{Edge, ReaderError, Result, Spot, SpotId, Track, TrackId};
use std::collections::{BTreeSet, HashMap, HashSet};

/// All spots of a document, indexed by spot id
#[derive(Debug, Default)]
pub struct SpotTable {
    /// Spots in document order
    spots: Vec<Spot>,
    /// Key: spot id, Value: index into `spots`
    index: HashMap<SpotId, usize>,
}

impl SpotTable {
    /// Build the table, rejecting duplicate spot ids
    pub fn build(spots: Vec<Spot>) -> Result<Self> {
        let mut index = HashMap::with_capacity(spots.len());
        for (idx, spot) in spots.iter().enumerate() {
            if index.insert(spot.id, idx).is_some() {
                return Err(ReaderError::parse(format!("Duplicate spot ID {}", spot.id)));
            }
        }
        Ok(Self { spots, index })
    }

    /// Get a spot by id
    pub fn get(&self, id: SpotId) -> Option<&Spot> {
        self.index.get(&id).map(|&idx| &self.spots[idx])
    }

    pub fn contains(&self, id: SpotId) -> bool {
        self.index.contains_key(&id)
    }

    /// Iterate over all spots in document order
    pub fn iter(&self) -> impl Iterator<Item = &Spot> {
        self.spots.iter()
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    /// Number of distinct frames that hold at least one spot
    pub fn frame_count(&self) -> usize {
        self.spots
            .iter()
            .map(|s| s.frame)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// All tracks of a document plus the filtered-track set
#[derive(Debug, Default)]
pub struct TrackTable {
    /// Tracks in document order
    tracks: Vec<Track>,
    /// Key: track id, Value: index into `tracks`
    index: HashMap<TrackId, usize>,
    /// Key: track name, Value: index of the first track with that name
    names: HashMap<String, usize>,
    /// Track ids listed under `FilteredTracks`, in document order
    filtered: Vec<TrackId>,
    filtered_set: HashSet<TrackId>,
}

impl TrackTable {
    /// Build the table and check it against the spot table
    ///
    /// Fails if a track id is repeated, an edge references a spot that does
    /// not exist, or the filtered set names an unknown track. A track listed
    /// more than once in the filtered set is kept at its first position.
    pub fn build(tracks: Vec<Track>, filtered: Vec<TrackId>, spots: &SpotTable) -> Result<Self> {
        let mut index = HashMap::with_capacity(tracks.len());
        let mut names = HashMap::with_capacity(tracks.len());

        for (idx, track) in tracks.iter().enumerate() {
            if index.insert(track.id, idx).is_some() {
                return Err(ReaderError::parse(format!("Duplicate track ID {}", track.id)));
            }
            if names.contains_key(&track.name) {
                log::warn!("Track name '{}' is used more than once", track.name);
            } else {
                names.insert(track.name.clone(), idx);
            }
            for edge in &track.edges {
                check_edge(track.id, edge, spots)?;
            }
        }

        let mut filtered_set = HashSet::with_capacity(filtered.len());
        let mut unique = Vec::with_capacity(filtered.len());
        for id in filtered {
            if !index.contains_key(&id) {
                return Err(ReaderError::parse(format!(
                    "Filtered track {} is not defined in AllTracks",
                    id
                )));
            }
            if filtered_set.insert(id) {
                unique.push(id);
            } else {
                log::warn!("Track {} is listed more than once in FilteredTracks", id);
            }
        }

        Ok(Self {
            tracks,
            index,
            names,
            filtered: unique,
            filtered_set,
        })
    }

    /// Get a track by id
    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.index.get(&id).map(|&idx| &self.tracks[idx])
    }

    /// Get the first track with the given name
    pub fn get_by_name(&self, name: &str) -> Option<&Track> {
        self.names.get(name).map(|&idx| &self.tracks[idx])
    }

    /// Iterate over all tracks in document order
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Track ids, optionally restricted to the filtered set
    pub fn ids(&self, filtered_only: bool) -> Vec<TrackId> {
        if filtered_only {
            self.filtered.clone()
        } else {
            self.tracks.iter().map(|t| t.id).collect()
        }
    }

    pub fn is_filtered(&self, id: TrackId) -> bool {
        self.filtered_set.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    pub fn edge_count(&self) -> usize {
        self.tracks.iter().map(|t| t.edges.len()).sum()
    }
}

fn check_edge(track: TrackId, edge: &Edge, spots: &SpotTable) -> Result<()> {
    for id in [edge.source, edge.target] {
        if !spots.contains(id) {
            return Err(ReaderError::parse(format!(
                "Track {} has an edge {} -> {} referencing unknown spot {}",
                track, edge.source, edge.target, id
            )));
        }
    }
    Ok(())
}

/// Statistics about a loaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelStats {
    pub num_spots: usize,
    pub num_frames: usize,
    pub num_tracks: usize,
    pub num_filtered_tracks: usize,
    pub num_edges: usize,
}

impl ModelStats {
    pub fn collect(spots: &SpotTable, tracks: &TrackTable) -> Self {
        Self {
            num_spots: spots.len(),
            num_frames: spots.frame_count(),
            num_tracks: tracks.len(),
            num_filtered_tracks: tracks.filtered_len(),
            num_edges: tracks.edge_count(),
        }
    }
}
