//! Streaming TrackMate XML parser using quick-xml
//!
//! The document is read in a single pass. The parser keeps a stack of open
//! element names so that every element is interpreted relative to its parent
//! (e.g. a `Spot` is only a spot inside `AllSpots/SpotsInFrame`) and so that a
//! truncated file, which leaves elements open at end of input, is rejected.

use crate::config::ReaderConfig;
use crate::types::{
    Edge, FeatureDeclaration, FeatureMap, FeatureScope, FeatureValue, ImageData, ReaderError,
    Result, Spot, SpotId, Track, TrackId,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::io::BufRead;

/// Everything read from a TrackMate document, before indexing
#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub version: Option<String>,
    pub spatial_units: Option<String>,
    pub time_units: Option<String>,
    pub log: Option<String>,
    pub declarations: BTreeMap<FeatureScope, Vec<FeatureDeclaration>>,
    pub image_data: Option<ImageData>,
    pub display_settings: Option<serde_json::Value>,
    /// Value of the `nspots` attribute on `AllSpots`
    pub declared_nspots: Option<usize>,
    pub spots: Vec<Spot>,
    pub tracks: Vec<Track>,
    /// `None` when the document has no `FilteredTracks` element
    pub filtered_tracks: Option<Vec<TrackId>>,
}

/// Parse a complete TrackMate document from a buffered reader
pub fn parse_document<R: BufRead>(input: R, config: &ReaderConfig) -> Result<ParsedDocument> {
    let mut xml = Reader::from_reader(input);
    xml.config_mut().trim_text(true);

    let mut parser = TrackMateParser::new(config);
    let mut buf = Vec::with_capacity(8192);

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => parser.open_element(e, false)?,
            Ok(Event::Empty(ref e)) => parser.open_element(e, true)?,
            Ok(Event::End(_)) => parser.close_element()?,
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|err| ReaderError::XmlSyntax {
                    position: xml.buffer_position() as u64,
                    source: err,
                })?;
                parser.text(&text);
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e).into_owned();
                parser.text(&text);
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ReaderError::XmlSyntax {
                    position: xml.buffer_position() as u64,
                    source: e,
                })
            }
        }
        buf.clear();
    }

    parser.finish()
}

/// Parser state for one document
struct TrackMateParser<'c> {
    config: &'c ReaderConfig,
    doc: ParsedDocument,
    /// Names of currently open elements, outermost first
    stack: Vec<String>,
    seen_root: bool,
    seen_model: bool,
    seen_all_spots: bool,
    seen_all_tracks: bool,
    /// `frame` attribute of the enclosing `SpotsInFrame`
    current_frame: Option<u32>,
    current_scope: Option<FeatureScope>,
    current_track: Option<Track>,
    log_text: String,
    settings_text: String,
    roi_text: String,
}

impl<'c> TrackMateParser<'c> {
    fn new(config: &'c ReaderConfig) -> Self {
        Self {
            config,
            doc: ParsedDocument::default(),
            stack: Vec::new(),
            seen_root: false,
            seen_model: false,
            seen_all_spots: false,
            seen_all_tracks: false,
            current_frame: None,
            current_scope: None,
            current_track: None,
            log_text: String::new(),
            settings_text: String::new(),
            roi_text: String::new(),
        }
    }

    fn parent(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    /// Handle a start tag (or a self-closing tag when `empty` is set)
    fn open_element(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<()> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let parent = self.parent().map(str::to_owned);

        match (parent.as_deref(), name.as_str()) {
            (None, "TrackMate") => {
                if self.seen_root {
                    return Err(ReaderError::parse("Multiple root elements"));
                }
                self.seen_root = true;
                self.doc.version = attribute(e, "version")?;
            }
            (None, other) => {
                return Err(ReaderError::parse(format!(
                    "Not a TrackMate XML document (root element is <{}>)",
                    other
                )));
            }
            (Some("TrackMate"), "Model") => {
                self.seen_model = true;
                self.doc.spatial_units = attribute(e, "spatialunits")?;
                self.doc.time_units = attribute(e, "timeunits")?;
            }
            (Some("Model"), "AllSpots") => {
                self.seen_all_spots = true;
                self.doc.declared_nspots = attribute(e, "nspots")?
                    .map(|n| parse_count(&n, "nspots"))
                    .transpose()?;
            }
            (Some("AllSpots"), "SpotsInFrame") => {
                self.current_frame = attribute(e, "frame")?
                    .map(|f| parse_frame(&f))
                    .transpose()?;
            }
            (Some("SpotsInFrame"), "Spot") => {
                let spot = self.read_spot(e)?;
                self.doc.spots.push(spot);
                self.roi_text.clear();
            }
            (Some("Model"), "AllTracks") => {
                self.seen_all_tracks = true;
            }
            (Some("AllTracks"), "Track") => {
                self.current_track = Some(read_track(e)?);
                if empty {
                    self.finish_track();
                }
            }
            (Some("Track"), "Edge") => {
                let edge = read_edge(e)?;
                match self.current_track.as_mut() {
                    Some(track) => track.edges.push(edge),
                    None => return Err(ReaderError::parse("<Edge> outside of a <Track>")),
                }
            }
            (Some("Model"), "FilteredTracks") => {
                self.doc.filtered_tracks.get_or_insert_with(Vec::new);
            }
            (Some("FilteredTracks"), "TrackID") => {
                let id = required_attribute(e, "TRACK_ID", "TrackID")?;
                let id = parse_id(&id, "TRACK_ID")?;
                self.doc
                    .filtered_tracks
                    .get_or_insert_with(Vec::new)
                    .push(TrackId(id));
            }
            (Some("FeatureDeclarations"), scope) => {
                self.current_scope = match scope {
                    "SpotFeatures" => Some(FeatureScope::Spot),
                    "EdgeFeatures" => Some(FeatureScope::Edge),
                    "TrackFeatures" => Some(FeatureScope::Track),
                    other => {
                        log::debug!("Skipping unknown feature declaration block <{}>", other);
                        None
                    }
                };
            }
            (Some("SpotFeatures" | "EdgeFeatures" | "TrackFeatures"), "Feature") => {
                if let Some(scope) = self.current_scope {
                    let declaration = read_declaration(e)?;
                    self.doc.declarations.entry(scope).or_default().push(declaration);
                }
            }
            (Some("Settings"), "ImageData") => {
                self.doc.image_data = Some(read_image_data(e)?);
            }
            (Some("TrackMate"), "Log" | "DisplaySettings" | "Settings" | "GUIState") => {}
            (Some("TrackMate"), other) => {
                log::warn!("Unrecognised element <{}> in TrackMate document", other);
            }
            _ => {}
        }

        if !empty {
            self.stack.push(name);
        }
        Ok(())
    }

    fn close_element(&mut self) -> Result<()> {
        let name = self
            .stack
            .pop()
            .ok_or_else(|| ReaderError::parse("Unexpected closing tag"))?;
        let parent = self.parent().map(str::to_owned);

        match (parent.as_deref(), name.as_str()) {
            (Some("SpotsInFrame"), "Spot") => {
                if !self.roi_text.is_empty() {
                    let roi = parse_roi(&self.roi_text)?;
                    if let Some(spot) = self.doc.spots.last_mut() {
                        spot.roi = Some(roi);
                    }
                    self.roi_text.clear();
                }
            }
            (Some("AllSpots"), "SpotsInFrame") => self.current_frame = None,
            (Some("AllTracks"), "Track") => self.finish_track(),
            (Some("FeatureDeclarations"), _) => self.current_scope = None,
            (Some("TrackMate"), "Log") => {
                self.doc.log = Some(std::mem::take(&mut self.log_text));
            }
            (Some("TrackMate"), "DisplaySettings") => {
                let text = std::mem::take(&mut self.settings_text);
                if self.config.parse_display_settings && !text.trim().is_empty() {
                    let value = serde_json::from_str(&text).map_err(|e| {
                        ReaderError::parse(format!("Invalid DisplaySettings JSON: {}", e))
                    })?;
                    self.doc.display_settings = Some(value);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let target = match self.parent() {
            Some("Log") => &mut self.log_text,
            Some("DisplaySettings") => &mut self.settings_text,
            Some("Spot") => &mut self.roi_text,
            _ => return,
        };
        if !target.is_empty() {
            target.push('\n');
        }
        target.push_str(text);
    }

    fn finish_track(&mut self) {
        if let Some(track) = self.current_track.take() {
            log::trace!("Read track {} ({} edges)", track.name, track.edges.len());
            self.doc.tracks.push(track);
        }
    }

    fn read_spot(&self, e: &BytesStart<'_>) -> Result<Spot> {
        let mut id = None;
        let mut name = None;
        let mut features = FeatureMap::new();

        for (key, value) in attributes(e)? {
            match key.as_str() {
                "ID" => id = Some(SpotId(parse_id(&value, "ID")?)),
                "name" => name = Some(value),
                _ => {
                    features.insert(key, FeatureValue::parse(&value));
                }
            }
        }

        let id = id.ok_or_else(|| ReaderError::parse("<Spot> without an ID attribute"))?;
        let frame = match features.get("FRAME") {
            Some(FeatureValue::Number(f)) => frame_from_f64(*f)?,
            Some(FeatureValue::Text(t)) => {
                return Err(ReaderError::parse(format!(
                    "Spot {} has a non-numeric FRAME '{}'",
                    id, t
                )))
            }
            None => self.current_frame.ok_or_else(|| {
                ReaderError::parse(format!("Spot {} has no frame information", id))
            })?,
        };

        Ok(Spot {
            id,
            name,
            frame,
            features,
            roi: None,
        })
    }

    fn finish(self) -> Result<ParsedDocument> {
        if let Some(open) = self.stack.last() {
            return Err(ReaderError::parse(format!(
                "Unexpected end of file: <{}> is not closed",
                open
            )));
        }
        if !self.seen_root {
            return Err(ReaderError::parse("Empty document: no <TrackMate> element"));
        }
        if !self.seen_model {
            return Err(ReaderError::parse("Missing <Model> element"));
        }
        if !self.seen_all_spots {
            return Err(ReaderError::parse("Missing <AllSpots> element"));
        }
        if !self.seen_all_tracks {
            return Err(ReaderError::parse("Missing <AllTracks> element"));
        }
        if self.doc.filtered_tracks.is_none() && self.config.require_filtered_tracks {
            return Err(ReaderError::parse("Missing <FilteredTracks> element"));
        }
        Ok(self.doc)
    }
}

fn read_track(e: &BytesStart<'_>) -> Result<Track> {
    let mut id = None;
    let mut name = None;
    let mut features = FeatureMap::new();

    for (key, value) in attributes(e)? {
        match key.as_str() {
            "TRACK_ID" => id = Some(TrackId(parse_id(&value, "TRACK_ID")?)),
            "name" => name = Some(value),
            _ => {
                features.insert(key, FeatureValue::parse(&value));
            }
        }
    }

    let id = id.ok_or_else(|| ReaderError::parse("<Track> without a TRACK_ID attribute"))?;
    Ok(Track {
        id,
        name: name.unwrap_or_else(|| format!("Track_{}", id)),
        features,
        edges: Vec::new(),
    })
}

fn read_edge(e: &BytesStart<'_>) -> Result<Edge> {
    let mut source = None;
    let mut target = None;
    let mut features = FeatureMap::new();

    for (key, value) in attributes(e)? {
        match key.as_str() {
            "SPOT_SOURCE_ID" => source = Some(SpotId(parse_id(&value, "SPOT_SOURCE_ID")?)),
            "SPOT_TARGET_ID" => target = Some(SpotId(parse_id(&value, "SPOT_TARGET_ID")?)),
            _ => {
                features.insert(key, FeatureValue::parse(&value));
            }
        }
    }

    match (source, target) {
        (Some(source), Some(target)) => Ok(Edge {
            source,
            target,
            features,
        }),
        _ => Err(ReaderError::parse(
            "<Edge> without SPOT_SOURCE_ID and SPOT_TARGET_ID",
        )),
    }
}

fn read_declaration(e: &BytesStart<'_>) -> Result<FeatureDeclaration> {
    let feature = required_attribute(e, "feature", "Feature")?;
    Ok(FeatureDeclaration {
        name: attribute(e, "name")?.unwrap_or_else(|| feature.clone()),
        short_name: attribute(e, "shortname")?.unwrap_or_else(|| feature.clone()),
        dimension: attribute(e, "dimension")?.unwrap_or_else(|| "NONE".to_string()),
        is_int: attribute(e, "isint")?.is_some_and(|v| v.eq_ignore_ascii_case("true")),
        feature,
    })
}

fn read_image_data(e: &BytesStart<'_>) -> Result<ImageData> {
    let mut image = ImageData::default();
    for (key, value) in attributes(e)? {
        let number = FeatureValue::parse(&value).as_f64();
        let count = number.filter(|n| *n >= 0.0).map(|n| n as u32);
        match key.as_str() {
            "filename" => image.filename = Some(value),
            "folder" => image.folder = Some(value),
            "width" => image.width = count,
            "height" => image.height = count,
            "nslices" => image.nslices = count,
            "nframes" => image.nframes = count,
            "pixelwidth" => image.pixel_width = number,
            "pixelheight" => image.pixel_height = number,
            "voxeldepth" => image.voxel_depth = number,
            "timeinterval" => image.time_interval = number,
            _ => {}
        }
    }
    Ok(image)
}

/// Collect all attributes of an element as unescaped (key, value) pairs
fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| {
            ReaderError::parse(format!("Invalid attribute on <{}>: {}", element, err))
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| {
                ReaderError::parse(format!("Invalid value for {} on <{}>: {}", key, element, err))
            })?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    Ok(attributes(e)?
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v))
}

fn required_attribute(e: &BytesStart<'_>, key: &str, element: &str) -> Result<String> {
    attribute(e, key)?.ok_or_else(|| {
        ReaderError::parse(format!("<{}> without a {} attribute", element, key))
    })
}

/// Parse an identifier; TrackMate sometimes writes integral values as "12.0"
fn parse_id(raw: &str, key: &str) -> Result<u64> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<u64>() {
        return Ok(id);
    }
    match raw.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => Ok(v as u64),
        _ => Err(ReaderError::parse(format!("Invalid {} '{}'", key, raw))),
    }
}

fn parse_count(raw: &str, key: &str) -> Result<usize> {
    parse_id(raw, key).map(|n| n as usize)
}

fn parse_frame(raw: &str) -> Result<u32> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ReaderError::parse(format!("Invalid frame '{}'", raw)))?;
    frame_from_f64(value)
}

fn frame_from_f64(value: f64) -> Result<u32> {
    if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Ok(value as u32)
    } else {
        Err(ReaderError::parse(format!("Invalid frame {}", value)))
    }
}

fn parse_roi(text: &str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| ReaderError::parse(format!("Invalid ROI coordinate '{}'", token)))
        })
        .collect()
}
