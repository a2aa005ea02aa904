//! Replay recorded marker detections and extract consolidated marker poses.

use clap::*;
use log::*;
use marker_pose::prelude::v1::{Result, *};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

mod config;
mod replay;
mod source;

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("marker-replay")
        .version(crate_version!())
        .author(crate_authors!())
        .about(crate_description!())
        .arg(
            Arg::new("settings")
                .long("settings")
                .short('s')
                .takes_value(true)
                .help("JSON settings file"),
        )
        .arg(
            Arg::new("behavior")
                .long("behavior")
                .short('b')
                .takes_value(true)
                .possible_values(["stationary", "moving"])
                .help("Expected marker behavior, overrides the settings file"),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Override a single property, e.g. \"Required observations=12\""),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .takes_value(true)
                .help("Output CSV file, standard output if omitted"),
        )
        .arg(
            Arg::new("print-settings")
                .long("print-settings")
                .help("Print the effective settings as JSON and exit"),
        )
        .arg(
            Arg::new("input")
                .takes_value(true)
                .required_unless_present("print-settings")
                .help("Detections CSV file, `-` for standard input, or tcp://host:port"),
        )
        .get_matches();

    let behavior = matches
        .value_of("behavior")
        .map(|b| format!("Behavior={b}"));

    let overrides = matches
        .values_of("set")
        .into_iter()
        .flatten()
        .chain(behavior.as_deref());

    let mut settings =
        config::resolve_settings(matches.value_of("settings").map(Path::new), overrides)?;

    if matches.is_present("print-settings") {
        serde_json::to_writer_pretty(io::stdout(), &settings)?;
        println!();
        return Ok(());
    }

    for (name, prop) in settings.props() {
        info!("{name}: {prop}");
    }

    let input = matches
        .value_of("input")
        .ok_or_else(|| anyhow!("Please supply a detections file!"))?;

    let source = source::CsvDetections::new(BufReader::new(source::open_input(input)?));

    let output: Box<dyn Write> = match matches.value_of("output") {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout()),
    };

    let stats = replay::replay(source, settings, output)?;

    info!(
        "Replayed {} frames with {} detections, finalized {} poses",
        stats.frames, stats.detections, stats.finalized
    );

    Ok(())
}
