//! Summarize the content of a TrackMate XML file
//!
//! Usage:
//!   inspect_file <file.xml> [--all-tracks]

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use trackmate_reader::{FeatureScope, TrackMateReader};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <file.xml> [--all-tracks]", args[0]);
        std::process::exit(1);
    }
    let path = PathBuf::from(&args[1]);
    let all_tracks = args.iter().any(|a| a == "--all-tracks");

    let reader = TrackMateReader::load(&path).with_context(|| format!("Failed to load {:?}", path))?;

    println!("=== TRACKMATE FILE ===");
    println!("Version: {}", reader.version().unwrap_or("unknown"));
    println!(
        "Units: {} / {}",
        reader.spatial_units().unwrap_or("?"),
        reader.time_units().unwrap_or("?")
    );
    if let Some(image) = reader.image_data() {
        println!(
            "Image: {}{} ({} x {}, {} frames)",
            image.folder.as_deref().unwrap_or(""),
            image.filename.as_deref().unwrap_or("?"),
            image.width.unwrap_or(0),
            image.height.unwrap_or(0),
            image.nframes.unwrap_or(0)
        );
    }

    let stats = reader.stats();
    println!("\n=== MODEL ===");
    println!("Spots: {} in {} frames", stats.num_spots, stats.num_frames);
    println!("Tracks: {} ({} filtered)", stats.num_tracks, stats.num_filtered_tracks);
    println!("Edges: {}", stats.num_edges);

    for scope in [FeatureScope::Spot, FeatureScope::Edge, FeatureScope::Track] {
        let declared = reader.feature_declarations(scope);
        if !declared.is_empty() {
            let keys: Vec<&str> = declared.iter().map(|d| d.feature.as_str()).collect();
            println!("{} features: {}", scope, keys.join(", "));
        }
    }

    println!("\n=== TRACKS ===");
    for track_id in reader.get_track_ids(!all_tracks) {
        let track = reader.get_track(track_id)?;
        match reader.get_lineage(track_id, None) {
            Ok(lineage) => println!(
                "{:<12} ID {:>5}  {:>4} spots  {:>3} chains  {:>3} splits{}",
                track.name,
                track.id,
                track.spot_count(),
                lineage.len(),
                lineage.splits.len(),
                if reader.is_filtered(track_id) { "" } else { "  (not filtered)" }
            ),
            Err(e) => println!("{:<12} ID {:>5}  error: {}", track.name, track.id, e),
        }
    }

    Ok(())
}
