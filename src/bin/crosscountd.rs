//! crosscountd - line-crossing counter daemon
//!
//! This daemon:
//! 1. Loads counting configuration (file + environment overrides)
//! 2. Reads tracked frames as JSON lines from a file or stdin
//! 3. Feeds every observation of a configured class to its counters
//! 4. Appends crossing events to an optional JSON-lines file
//! 5. Prints the per-class totals as JSON when the input ends

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crossline::{CounterdConfig, JsonLinesSource, ObservationSource};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Tracked-frame JSON lines; `-` reads stdin.
    #[arg(long, default_value = "-")]
    input: String,
    /// Counting configuration file (TOML, or JSON with a .json extension).
    #[arg(long, env = "CROSSCOUNT_CONFIG")]
    config: Option<PathBuf>,
    /// Append crossing events as JSON lines to this file.
    #[arg(long)]
    events_out: Option<PathBuf>,
    /// Log a progress line every N frames (0 disables).
    #[arg(long, default_value_t = 0)]
    summary_every: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = CounterdConfig::load_from(args.config.as_deref())?;
    log::info!(
        "line axis={} position={} tolerance={} classes={}",
        cfg.line.axis.as_str(),
        cfg.line.position,
        cfg.line.tolerance_offset,
        cfg.classes
            .iter()
            .map(|class| class.label.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );
    if cfg.line.tolerance_offset == 0 {
        log::warn!("tolerance offset is 0: centroid jitter at the line can count twice");
    }

    let mut processor = cfg.build_processor()?;

    let mut source: Box<dyn ObservationSource> = if args.input == "-" {
        Box::new(JsonLinesSource::new("stdin", BufReader::new(std::io::stdin())))
    } else {
        Box::new(JsonLinesSource::open(Path::new(&args.input))?)
    };

    let mut events_out = match &args.events_out {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow!("failed to open events file {}: {}", path.display(), e))?;
            log::info!("writing crossing events to {}", path.display());
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let mut frames_seen = 0u64;
    let summary_every = args.summary_every;
    processor.run(source.as_mut(), |report| {
        if let Some(out) = events_out.as_mut() {
            for event in &report.crossings {
                serde_json::to_writer(&mut *out, event)?;
                out.write_all(b"\n")?;
            }
            if !report.crossings.is_empty() {
                out.flush()?;
            }
        }
        frames_seen += 1;
        if summary_every > 0 && frames_seen % summary_every == 0 {
            log::info!(
                "frame {}: {} frames processed, {} crossings on this frame",
                report.frame,
                frames_seen,
                report.crossings.len()
            );
        }
        Ok(())
    })?;

    let stats = source.stats();
    log::info!(
        "processed {} frames ({} observations, {} skipped)",
        stats.frames_read,
        stats.observations_read,
        processor.frames_skipped()
    );
    for totals in processor.summary() {
        log::info!(
            "{}: {} (positive={}, negative={})",
            totals.class,
            totals.total,
            totals.positive,
            totals.negative
        );
    }
    println!("{}", serde_json::to_string_pretty(&processor.summary())?);
    Ok(())
}
