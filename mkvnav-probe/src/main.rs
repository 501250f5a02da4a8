// mkvnav Probe Tool
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::fs::File;
use std::path::{Path, PathBuf};

use mkvnav_core::errors::{Error, Result};
use mkvnav_core::io::{MediaSource, ReadOnlySource};
use mkvnav_format_mkv::{MkvDemuxer, MkvOptions, SeekTo};

use clap::Parser;
use log::{error, info, warn};

mod report;

use report::Report;

#[derive(Parser, Debug)]
#[command(name = "mkvnav-probe", version, about = "Inspect Matroska and WebM files")]
struct Args {
    /// The main file, then sibling files holding linked segments. Use '-' to read the main file
    /// from standard input.
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Print a JSON document instead of text
    #[arg(long)]
    json: bool,

    /// Dump the first N blocks
    #[arg(long, value_name = "N", default_value_t = 0)]
    blocks: usize,

    /// Seek to the time in seconds before dumping blocks
    #[arg(long, value_name = "SECS", conflicts_with = "percent")]
    seek: Option<f64>,

    /// Seek to a fraction of the title, from 0.0 to 1.0, before dumping blocks
    #[arg(long, value_name = "FRACTION")]
    percent: Option<f64>,

    /// Play ordered editions as plain chapter markers
    #[arg(long)]
    no_ordered_chapters: bool,

    /// Do not run chapter commands
    #[arg(long)]
    no_chapter_codecs: bool,

    /// Prefer byte positions over the index for percent seeks
    #[arg(long)]
    seek_percent: bool,

    /// Keep elements with unknown ids
    #[arg(long)]
    accept_dummy_elements: bool,

    /// Ignore sibling files
    #[arg(long)]
    no_siblings: bool,

    /// The maximum element nesting
    #[arg(long, default_value_t = 10)]
    max_depth: usize,

    /// The maximum length of a chain of seek heads pointing at each other
    #[arg(long, default_value_t = 10)]
    max_seekhead_depth: usize,

    /// Log more, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn options(&self) -> MkvOptions {
        MkvOptions {
            use_ordered_chapters: !self.no_ordered_chapters,
            use_chapter_codecs: !self.no_chapter_codecs,
            seek_percent: self.seek_percent,
            accept_dummy_elements: self.accept_dummy_elements,
            preload_local_dir: !self.no_siblings,
            max_depth: self.max_depth,
            max_seekhead_depth: self.max_seekhead_depth,
        }
    }

    fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }

        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

fn open_source(path: &Path) -> Result<Box<dyn MediaSource>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(ReadOnlySource::new(std::io::stdin())))
    }
    else {
        Ok(Box::new(File::open(path)?))
    }
}

fn run(args: &Args) -> Result<Report> {
    let main = &args.inputs[0];

    info!("opening {}", main.display());

    let mut demuxer = MkvDemuxer::try_new(open_source(main)?, args.options())?;

    for sibling in args.inputs[1..].iter() {
        let source = match open_source(sibling) {
            Ok(source) => source,
            Err(err) => {
                warn!("skipping {}: {}", sibling.display(), err);
                continue;
            }
        };

        match demuxer.add_sibling(source) {
            Ok(count) => info!("{}: {} linked segment(s)", sibling.display(), count),
            Err(err) => warn!("skipping {}: {}", sibling.display(), err),
        }
    }

    let seek = match (args.seek, args.percent) {
        (Some(secs), _) => Some(SeekTo::Time((secs * 1_000_000.0) as i64)),
        (None, Some(fraction)) => Some(SeekTo::Percent(fraction)),
        (None, None) => None,
    };

    let mut report = Report::new(&mut demuxer);

    if let Some(to) = seek {
        report.set_seek(demuxer.seek(to)?);
    }

    for _ in 0..args.blocks {
        match demuxer.next_block()? {
            Some(block) => report.push_block(&block),
            None => break,
        }
    }

    report.set_diagnostics(demuxer.diagnostics());

    Ok(report)
}

fn main() {
    let args = Args::parse();

    let mut logger = pretty_env_logger::formatted_builder();
    logger.filter_level(args.log_level());

    // RUST_LOG refines the level picked on the command line.
    if let Ok(filters) = std::env::var("RUST_LOG") {
        logger.parse_filters(&filters);
    }

    logger.init();

    let report = match run(&args) {
        Ok(report) => report,
        Err(Error::Unsupported(what)) => {
            error!("the input is not supported: {}", what);
            std::process::exit(1);
        }
        Err(err) => {
            error!("{}", err.to_string().to_lowercase());
            std::process::exit(1);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                error!("cannot serialize the report: {}", err);
                std::process::exit(2);
            }
        }
    }
    else {
        report.print(&args.inputs[0]);
    }
}
