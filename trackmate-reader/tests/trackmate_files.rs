// Loading real TrackMate exports from tests/data
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use trackmate_reader::{
    ErrorKind, FeatureScope, FeatureValue, ReaderConfig, ReaderError, SpotId, SplitMode, TrackId,
    TrackMateReader,
};

fn data_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

fn load(name: &str) -> TrackMateReader {
    TrackMateReader::load(&data_file(name)).unwrap()
}

fn chain_ids(reader: &TrackMateReader, track: u64, mode: SplitMode) -> Vec<Vec<u64>> {
    reader
        .get_lineage_with_mode(TrackId(track), None, mode)
        .unwrap()
        .iter()
        .map(|c| c.spots.iter().map(|s| s.0).collect())
        .collect()
}

#[test]
fn test_scenario_lineage_and_lookup() {
    let reader = load("scenario.xml");
    let track = reader.get_track_by_name("trackA").unwrap();

    assert_eq!(
        chain_ids(&reader, track.id.0, SplitMode::Duplicate),
        vec![vec![1, 2, 3], vec![1, 2, 4]]
    );
    assert_eq!(reader.get_track_ids(true), vec![track.id]);

    let err = reader.get_spot(SpotId(5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lookup);
    assert!(reader.get_spot(SpotId(0)).is_ok());
}

#[test]
fn test_edges_reference_known_spots() {
    for name in ["scenario.xml", "division.xml"] {
        let reader = load(name);
        for track_id in reader.get_track_ids(false) {
            for edge in reader.get_track_edges(track_id).unwrap() {
                assert!(reader.get_spot(edge.source).is_ok(), "{}: {:?}", name, edge);
                assert!(reader.get_spot(edge.target).is_ok(), "{}: {:?}", name, edge);
            }
        }
    }
}

#[test]
fn test_filtered_tracks() {
    let reader = load("division.xml");
    let all: BTreeSet<TrackId> = reader.get_track_ids(false).into_iter().collect();
    let filtered: BTreeSet<TrackId> = reader.get_track_ids(true).into_iter().collect();

    assert_eq!(all, [TrackId(0), TrackId(1), TrackId(2)].into_iter().collect());
    assert_eq!(filtered, [TrackId(0), TrackId(1)].into_iter().collect());
    assert!(!reader.is_filtered(TrackId(2)));
}

#[test]
fn test_document_metadata() {
    let reader = load("division.xml");
    assert_eq!(reader.version(), Some("7.11.1"));
    assert_eq!(reader.spatial_units(), Some("micron"));
    assert_eq!(reader.time_units(), Some("sec"));
    assert!(reader.log().unwrap().contains("Found 15 spots."));
    assert_eq!(reader.source(), Some(data_file("division.xml").as_path()));

    let image = reader.image_data().unwrap();
    assert_eq!(image.filename.as_deref(), Some("dividing_cells.tif"));
    assert_eq!(image.nframes, Some(5));
    assert_eq!(image.pixel_width, Some(0.65));

    assert_eq!(reader.feature_declarations(FeatureScope::Spot).len(), 10);
    assert_eq!(reader.feature_declarations(FeatureScope::Track).len(), 3);

    let settings = reader.display_settings().unwrap();
    assert_eq!(settings["trackDisplayMode"], "FULL");

    let stats = reader.stats();
    assert_eq!(stats.num_spots, 15);
    assert_eq!(stats.num_frames, 5);
    assert_eq!(stats.num_tracks, 3);
    assert_eq!(stats.num_filtered_tracks, 2);
    assert_eq!(stats.num_edges, 11);
}

#[test]
fn test_unknown_attributes_pass_through() {
    let reader = load("division.xml");
    let spot = reader.get_spot(SpotId(104)).unwrap();
    assert_eq!(spot.name.as_deref(), Some("ID104"));
    assert_eq!(spot.numeric_feature("MY_PLUGIN_SCORE"), Some(0.04));
    assert_eq!(spot.feature("SOURCE_TAG"), Some(&FeatureValue::Text("auto".to_string())));
    assert_eq!(spot.position(), Some([15.0, 17.0, 0.0]));

    let track = reader.get_track(TrackId(0)).unwrap();
    assert_eq!(track.feature("NUMBER_SPLITS").and_then(FeatureValue::as_f64), Some(3.0));
    assert_eq!(track.spot_count(), 9);
}

#[test]
fn test_branching_track_chains() {
    let reader = load("division.xml");
    let lineage = reader.get_lineage(TrackId(0), None).unwrap();

    // Two branch points on every root-to-leaf path of this binary tree
    assert_eq!(lineage.len(), 4);
    assert_eq!(
        chain_ids(&reader, 0, SplitMode::Duplicate),
        vec![
            vec![100, 101, 102, 103, 105],
            vec![100, 101, 102, 103, 106],
            vec![100, 101, 102, 104, 107],
            vec![100, 101, 102, 104, 108],
        ]
    );
    assert_eq!(lineage.splits, vec![SpotId(102), SpotId(103), SpotId(104)]);
    assert_eq!(lineage.roots().count(), 1);
}

#[test]
fn test_branching_track_break_mode() {
    let reader = load("division.xml");
    assert_eq!(
        chain_ids(&reader, 0, SplitMode::Break),
        vec![
            vec![100, 101, 102],
            vec![102, 103],
            vec![103, 105],
            vec![103, 106],
            vec![102, 104],
            vec![104, 107],
            vec![104, 108],
        ]
    );
}

#[test]
fn test_simple_track_single_chain() {
    let reader = load("division.xml");
    for track in [1, 2] {
        let lineage = reader.get_lineage(TrackId(track), None).unwrap();
        assert_eq!(lineage.len(), 1);

        let chain = &lineage.chains[0];
        let unique: BTreeSet<SpotId> = chain.spots.iter().copied().collect();
        assert_eq!(unique.len(), chain.spots.len());
        for edge in reader.get_track_edges(TrackId(track)).unwrap() {
            assert!(chain.spots.contains(&edge.source));
            assert!(chain.spots.contains(&edge.target));
        }
    }
}

#[test]
fn test_feature_trace_matches_raw_values() {
    let reader = load("division.xml");
    let traces = reader
        .get_feature_trace(TrackId(0), "MEAN_INTENSITY_CH1")
        .unwrap();

    assert_eq!(traces.len(), 4);
    assert_eq!(traces[0].frames(), vec![0, 1, 2, 3, 4]);
    assert_eq!(traces[0].values(), vec![0.5, 10.5, 20.5, 30.5, 50.5]);
    assert_eq!(traces[3].values(), vec![0.5, 10.5, 20.5, 40.5, 80.5]);

    for trace in &traces {
        let frames = trace.frames();
        assert!(frames.windows(2).all(|w| w[0] < w[1]));
        for point in &trace.points {
            let spot = reader.get_spot(point.spot).unwrap();
            assert_eq!(spot.numeric_feature("MEAN_INTENSITY_CH1"), Some(point.value));
            assert_eq!(spot.frame, point.frame);
        }
    }
}

#[test]
fn test_feature_trace_unknown_feature() {
    let reader = load("division.xml");
    let err = reader.get_feature_trace(TrackId(1), "NOT_A_FEATURE").unwrap_err();
    assert!(matches!(err, ReaderError::FeatureNotFound { .. }));

    let err = reader.get_feature_trace(TrackId(9), "MEAN_INTENSITY_CH1").unwrap_err();
    assert!(matches!(err, ReaderError::TrackNotFound(TrackId(9))));
}

#[test]
fn test_truncated_file_fails() {
    let content = std::fs::read_to_string(data_file("division.xml")).unwrap();
    let cut = &content[..content.len() / 2];

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(cut.as_bytes()).unwrap();
    file.flush().unwrap();

    let err = TrackMateReader::load(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn test_missing_file() {
    let err = TrackMateReader::load(&data_file("does_not_exist.xml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_cyclic_track() {
    let xml = r#"<TrackMate version="7.11.1"><Model>
        <AllSpots nspots="3"><SpotsInFrame frame="0">
          <Spot ID="1" FRAME="0" /><Spot ID="2" FRAME="0" /><Spot ID="3" FRAME="0" />
        </SpotsInFrame></AllSpots>
        <AllTracks><Track name="Track_0" TRACK_ID="0">
          <Edge SPOT_SOURCE_ID="1" SPOT_TARGET_ID="2" />
          <Edge SPOT_SOURCE_ID="2" SPOT_TARGET_ID="3" />
          <Edge SPOT_SOURCE_ID="3" SPOT_TARGET_ID="2" />
        </Track></AllTracks>
        <FilteredTracks><TrackID TRACK_ID="0" /></FilteredTracks>
    </Model></TrackMate>"#;

    // Loading succeeds: cycles only matter when following lineages
    let reader = TrackMateReader::load_str(xml).unwrap();
    let err = reader.get_lineage(TrackId(0), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CyclicGraph);
}

#[test]
fn test_missing_filtered_tracks_with_relaxed_config() {
    let content = std::fs::read_to_string(data_file("scenario.xml")).unwrap();
    let start = content.find("<FilteredTracks>").unwrap();
    let end = content.find("</FilteredTracks>").unwrap() + "</FilteredTracks>".len();
    let stripped = format!("{}{}", &content[..start], &content[end..]);

    let err = TrackMateReader::load_str(&stripped).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);

    let config = ReaderConfig::new().with_required_filtered_tracks(false);
    let reader = TrackMateReader::load_reader(stripped.as_bytes(), config).unwrap();
    assert!(reader.get_track_ids(true).is_empty());
    assert_eq!(reader.get_track_ids(false), vec![TrackId(0)]);
}

#[test]
fn test_repeated_filtered_track_listed_once() {
    let content = std::fs::read_to_string(data_file("scenario.xml")).unwrap();
    let start = content.find("<FilteredTracks>").unwrap() + "<FilteredTracks>".len();
    let repeated = format!(
        "{}<TrackID TRACK_ID=\"0\" />{}",
        &content[..start],
        &content[start..]
    );

    let reader = TrackMateReader::load_str(&repeated).unwrap();
    assert_eq!(reader.get_track_ids(true), vec![TrackId(0)]);
    assert!(reader.is_filtered(TrackId(0)));
    assert_eq!(reader.stats().num_filtered_tracks, 1);
}

#[test]
fn test_lineage_serializes_to_json() {
    let reader = load("scenario.xml");
    let lineage = reader.get_lineage(TrackId(0), None).unwrap();
    let json = serde_json::to_value(&lineage).unwrap();

    assert_eq!(json["track"], 0);
    assert_eq!(json["mode"], "duplicate");
    assert_eq!(json["chains"][1]["spots"], serde_json::json!([1, 2, 4]));
    assert_eq!(json["chains"][1]["parent"], 1);
}

#[test]
fn test_concurrent_reads() {
    let reader = Arc::new(load("division.xml"));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let reader = Arc::clone(&reader);
            std::thread::spawn(move || reader.get_lineage(TrackId(0), None).unwrap().len())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 4);
    }
}
