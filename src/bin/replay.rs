//! Replay recorded detections through the tracker and print the counts.
//!
//! The input is a JSON array with one entry per frame, each an array of
//! detector boxes: `{"bbox": [a, b, c, d], "class_id": 2, "confidence": 0.9}`.
//! The box layout is chosen with `--box-format`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use linecount_rs::integration::DetectionFilter;
use linecount_rs::{BoxFormat, ClassId, CountingLine, Detection, DetectionBuilder, LineTracker, Point, Settings};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay recorded detections against a counting line", long_about = None)]
struct Args {
    /// JSON file of per-frame detections
    detections: PathBuf,

    /// Layout of each box: tlbr, xywh or tlwh
    #[arg(long, default_value_t = BoxFormat::Tlbr)]
    box_format: BoxFormat,

    /// Counting line as x1,y1,x2,y2
    #[arg(long, value_parser = parse_line)]
    line: Option<[i32; 4]>,

    /// Frame size as WIDTHxHEIGHT; boxes are clamped to it and automatic lines use it
    #[arg(long, value_parser = parse_frame_size, default_value = "1920x1080")]
    frame_size: (u32, u32),

    /// Tolerance band in pixels (overrides the settings)
    #[arg(long)]
    band: Option<f64>,

    /// Swap the up and down directions
    #[arg(long, default_value_t = false)]
    invert: bool,

    /// Settings file; defaults apply when missing
    #[arg(short, long, default_value = "linecount.json")]
    settings: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Record {
    bbox: [f32; 4],
    class_id: ClassId,
    #[serde(alias = "score")]
    confidence: f32,
}

fn parse_line(s: &str) -> std::result::Result<[i32; 4], String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<i32>().map_err(|e| format!("`{p}`: {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    parts
        .try_into()
        .map_err(|_| "expected four comma-separated integers".to_string())
}

fn parse_frame_size(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = s.split_once('x').ok_or("expected WIDTHxHEIGHT")?;
    let w = w.parse().map_err(|e| format!("width: {e}"))?;
    let h = h.parse().map_err(|e| format!("height: {e}"))?;
    Ok((w, h))
}

fn counting_line(args: &Args, settings: &mut Settings) -> Result<CountingLine> {
    if let Some(band) = args.band {
        settings.line.band_px = band;
    }
    settings.line.invert_direction |= args.invert;
    settings.validate()?;

    if let Some([x1, y1, x2, y2]) = args.line {
        return Ok(settings.line.line(Point::new(x1, y1), Point::new(x2, y2)));
    }
    let (width, height) = args.frame_size;
    match settings.line.auto_line(width, height) {
        Some(line) => Ok(line),
        None => bail!("the settings use a manual line; pass --line"),
    }
}

/// Vehicle-class boxes above the size threshold, in frame coordinates.
fn ingest(records: Vec<Record>, args: &Args, filter: &DetectionFilter, min_size: i32) -> Vec<Detection> {
    let (width, height) = args.frame_size;
    records
        .into_iter()
        .map(|r| {
            DetectionBuilder::new()
                .bbox(args.box_format, r.bbox)
                .class_id(r.class_id)
                .score(r.confidence)
                .build()
        })
        .filter(|raw| filter.accepts(raw) && raw.is_larger_than(min_size))
        .filter_map(|raw| raw.to_detection((0, 0), width, height))
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("linecount_rs=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = Settings::load_or_default(&args.settings)
        .with_context(|| format!("loading {}", args.settings.display()))?;
    let line = counting_line(&args, &mut settings)?;
    if line.is_degenerate() {
        warn!("counting line has zero length; nothing will be counted");
    }

    let raw = fs::read_to_string(&args.detections)
        .with_context(|| format!("reading {}", args.detections.display()))?;
    let frames: Vec<Vec<Record>> = serde_json::from_str(&raw).context("parsing detections")?;

    let filter = DetectionFilter::classes(settings.classes.ids(), settings.runtime.detection_confidence);
    let mut tracker = LineTracker::with_classes(settings.tracker_config(), settings.classes.ids());
    let min_size = tracker.config().min_detection_size;
    for (frame, records) in frames.into_iter().enumerate() {
        tracker.update_prefiltered(ingest(records, &args, &filter, min_size));
        for event in tracker.check_line_crossings(&line) {
            info!(
                frame,
                track_id = event.track_id,
                class = settings.classes.label(event.class_id),
                direction = ?event.direction,
                "counted"
            );
        }
    }

    let counts = tracker.counts().labelled(|id| settings.classes.label(id));
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}
