//! Print the lineage and feature traces of one track
//!
//! Usage:
//!   trace_track <file.xml> [--track <id> | --name <track name>] [--feature <name>]...
//!               [--mode duplicate|continue|break] [--json] [--verbose]
//!
//! Example:
//!   trace_track cells.xml --track 1 --feature MEAN_INTENSITY_CH1 --feature MEAN_INTENSITY_CH2

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use trackmate_reader::{ReaderConfig, SplitMode, TrackId, TrackMateReader};

fn parse_mode(raw: &str) -> Result<SplitMode> {
    Ok(match raw {
        "duplicate" => SplitMode::Duplicate,
        "continue" => SplitMode::Continue,
        "break" => SplitMode::Break,
        other => bail!("Unknown split mode: {}", other),
    })
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <file.xml> [--track <id> | --name <track name>] [--feature <name>]... [--mode duplicate|continue|break] [--json] [--verbose]", args[0]);
        eprintln!("\nExample:");
        eprintln!("  {} cells.xml --track 1 --feature MEAN_INTENSITY_CH1", args[0]);
        std::process::exit(1);
    }

    let xml_file = PathBuf::from(&args[1]);
    let mut track: Option<TrackId> = None;
    let mut track_name: Option<String> = None;
    let mut features: Vec<String> = Vec::new();
    let mut mode = SplitMode::Duplicate;
    let mut json = false;
    let mut verbose = false;

    // Parse arguments
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--track" => {
                i += 1;
                let raw = args.get(i).context("--track needs a value")?;
                track = Some(TrackId(raw.parse().context("Track id must be an integer")?));
            }
            "--name" => {
                i += 1;
                track_name = Some(args.get(i).context("--name needs a value")?.clone());
            }
            "--feature" => {
                i += 1;
                features.push(args.get(i).context("--feature needs a value")?.clone());
            }
            "--mode" => {
                i += 1;
                mode = parse_mode(args.get(i).context("--mode needs a value")?)?;
            }
            "--json" => json = true,
            "--verbose" | "-v" => verbose = true,
            other => eprintln!("Unknown argument: {}", other),
        }
        i += 1;
    }

    env_logger::Builder::new()
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let config = ReaderConfig::new().with_split_mode(mode);
    let reader = TrackMateReader::load_with_config(&xml_file, config)
        .with_context(|| format!("Failed to load {:?}", xml_file))?;

    let track_id = match (track, track_name) {
        (Some(id), _) => id,
        (None, Some(name)) => reader.get_track_by_name(&name)?.id,
        (None, None) => match reader.get_track_ids(true).first() {
            Some(&id) => id,
            None => bail!("{:?} has no filtered tracks", xml_file),
        },
    };
    if features.is_empty() {
        features.push("MEAN_INTENSITY_CH1".to_string());
    }

    let lineage = reader.get_lineage(track_id, None)?;

    if json {
        let mut traces = Vec::new();
        for feature in &features {
            traces.extend(reader.get_feature_trace(track_id, feature)?);
        }
        let out = serde_json::json!({ "lineage": lineage, "traces": traces });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("=== TrackMate Track Trace ===");
    println!("File: {:?}", xml_file);
    println!("Version of TrackMate file: {}", reader.version().unwrap_or("unknown"));
    let track = reader.get_track(track_id)?;
    println!("Track: {} (ID {}, {} edges)", track.name, track.id, track.edges.len());
    println!("Split mode: {}", lineage.mode);
    for split in &lineage.splits {
        let frame = reader.get_spot(*split)?.frame;
        println!("Got a split at frame {} (spot {})", frame, split);
    }
    println!();

    for chain in lineage.iter() {
        match chain.parent {
            Some(parent) => println!("Chain {} (from chain {}):", chain.id, parent),
            None => println!("Chain {}:", chain.id),
        }
        println!("  spots: {:?}", chain.spots.iter().map(|s| s.0).collect::<Vec<_>>());
    }

    for feature in &features {
        println!("\n--- {} ---", feature);
        for trace in reader.get_feature_trace(track_id, feature)? {
            println!("Chain {} (mean {:.3}):", trace.chain, trace.mean().unwrap_or(f64::NAN));
            for point in &trace.points {
                println!("  frame {:>4}  spot {:>8}  {:.3}", point.frame, point.spot.0, point.value);
            }
        }
    }

    Ok(())
}
