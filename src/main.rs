use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Context;
use clap::AppSettings;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use structopt::StructOpt;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;

mod error;
mod input;
mod output;
mod timing;
mod usb;

use output::SessionWriter;
use timing::Reconciler;
use usb::encoder::Encoder;
use usb::signal::{Speed, CHANNELS};

/// Rebuilds the D+/D- waveform of a USB low/full speed packet capture as a sigrok session.
#[derive(Debug, StructOpt)]
#[structopt(name = "usb-trace-synth", setting = AppSettings::ColoredHelp)]
struct Opt {
    /// PCAP file.
    #[structopt(parse(from_os_str))]
    pcap: PathBuf,
    /// Sigrok session file.
    #[structopt(parse(from_os_str))]
    sr: PathBuf,
    /// Type of USB signaling (ls, fs).
    signaling: Speed,
    /// Interpolate samples to be Nx the clock rate.
    #[structopt(short = "x", long, value_name = "N", default_value = "4")]
    interpolate: NonZeroUsize,
    /// Idle padding before the first packet, in cycles.
    #[structopt(short = "s", long, value_name = "CYCLES", default_value = "4")]
    start_padding: u32,
    /// Idle padding after the last packet, in cycles.
    #[structopt(short = "e", long, value_name = "CYCLES", default_value = "0")]
    end_padding: u32,
    /// Largest slice of samples stored as a single archive entry.
    #[structopt(long, value_name = "BYTES", default_value = "16777216")]
    slice_limit: NonZeroUsize,
    /// Refuse to replace an existing session file.
    #[structopt(short = "n", long)]
    no_overwrite: bool,
    /// Raise the log level (-v info, -vv debug, -vvv trace).
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(opt: &Opt) -> anyhow::Result<()> {
    let speed = opt.signaling;
    let interpolate = opt.interpolate.get();

    let capture = input::read_capture(&opt.pcap)
        .with_context(|| format!("Loading packets from {:?}", opt.pcap))?;
    if let Some(captured) = capture.link_type.speed() {
        if captured != speed {
            warn!(%captured, selected = %speed, "capture link type disagrees with the signaling");
        }
    }

    let writer = SessionWriter::open(
        &opt.sr,
        &CHANNELS,
        speed.clock_rate() * interpolate as u64,
        !opt.no_overwrite,
        opt.slice_limit.get(),
    )
    .with_context(|| format!("Creating session {:?}", opt.sr))?;
    let encoder = Encoder::new(writer, speed, interpolate);

    let progress_bar = ProgressBar::new(capture.packets.len() as u64);
    progress_bar.set_style(
        ProgressStyle::with_template(" {spinner} [{bar:40}] {pos}/{len} packets ({eta})")?
            .progress_chars("=> "),
    );

    let reconciler = Reconciler {
        speed,
        start_padding: opt.start_padding,
        end_padding: opt.end_padding,
    };
    let outcome = reconciler.reconstruct(encoder, progress_bar.wrap_iter(capture.packets.iter()));
    progress_bar.finish_and_clear();

    outcome
        .map(|_| ())
        .with_context(|| format!("Rebuilding {:?} (session left truncated)", opt.sr))
}

fn main() {
    let opt = Opt::from_args();
    init_logging(opt.verbose);

    if let Err(e) = run(&opt) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
