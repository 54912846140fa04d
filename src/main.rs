mod classifier;
mod error;
mod ui;

use clap::{ArgAction, Parser};
use classifier::cidr::CidrList;
use classifier::config::{AutoMode, ClassifierConfig, WalkPolicy};
use classifier::containers::Role;
use classifier::core::Classifier;
use classifier::dispatch::{dispatch, SplitRule};
use classifier::packet::source_ip;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use ui::output;

/// hostsplit decides which hosts in a capture are clients and which are servers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// pcap file to classify
    #[arg(short = 'f', long, value_parser)]
    file: PathBuf,

    /// How unseen hosts and the client/server split are handled
    #[arg(short = 'm', long, value_enum, default_value_t = AutoMode::Bridge)]
    mode: AutoMode,

    /// A host is a server when server packets >= client packets * ratio
    #[arg(short = 'r', long, default_value_t = classifier::config::DEFAULT_RATIO, value_parser)]
    ratio: f64,

    /// First mask length tried in router mode
    #[arg(long, default_value_t = classifier::config::DEFAULT_START_MASK, value_parser)]
    start_mask: u8,

    /// Last mask length tried in router mode
    #[arg(long, default_value_t = classifier::config::DEFAULT_END_MASK, value_parser)]
    end_mask: u8,

    /// Stop each CIDR pass at the first host with a different role
    #[arg(long, action = ArgAction::SetTrue)]
    legacy_walk: bool,

    /// Include the per-packet verdicts in JSON output
    #[arg(short = 'p', long, action = ArgAction::SetTrue)]
    packets: bool,

    /// Display output as formatted JSON
    #[arg(short = 'j', long, action = ArgAction::SetTrue)]
    json: bool,

    /// Directory to write classification.json to
    #[arg(short = 'o', long, value_parser)]
    output_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    if let Err(e) = simple_logger::init_with_env() {
        eprintln!("Failed to initialise logging: {e}");
    }

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClassifierConfig {
        ratio: args.ratio,
        start_mask: args.start_mask,
        end_mask: args.end_mask,
        walk: if args.legacy_walk { WalkPolicy::StopAtMismatch } else { WalkPolicy::SkipMismatched },
    };

    let capture = classifier::utils::load_file(&args.file)?;
    let mut hosts = Classifier::new(config, capture.link)?;

    // ---- Classification ----
    let mut unreadable = 0usize;
    for (index, frame) in capture.frames.iter().enumerate() {
        let ip = match source_ip(frame, capture.link) {
            Ok(ip) => ip,
            Err(e) => {
                log::debug!("Ignoring packet {index}: {e}");
                unreadable += 1;
                continue;
            }
        };
        hosts.add(ip, frame)?;
    }
    if unreadable > 0 {
        log::warn!("{unreadable} packets were not readable IPv4");
    }
    if hosts.store().is_empty() {
        log::warn!("No IPv4 hosts found in {}", args.file.display());
    }
    log::info!("Collected {} hosts", hosts.store().len());
    hosts.finalize_all();

    // ---- Router mode ----
    let mut cidrs = CidrList::new();
    let mut mask = None;
    if args.mode == AutoMode::Router {
        mask = hosts.find_separating_mask(&mut cidrs, Role::Server, Role::Client);
        if mask.is_some() && cidrs.is_empty() {
            log::warn!("No servers found; every packet goes to the client side");
        } else if mask.is_none() {
            log::warn!(
                "No mask between /{} and /{} separates servers from clients; falling back to per-host lookup",
                args.start_mask,
                args.end_mask
            );
        }
    }

    // ---- Dispatch ----
    let rule = match mask {
        Some(_) => SplitRule::Cidr(&cidrs),
        None => SplitRule::Lookup { default_mode: args.mode.default_role() },
    };
    let frames = capture.frames.iter().map(Vec::as_slice);
    let summary = dispatch(&hosts, rule, frames, capture.link, args.packets)?;

    // ---- Output ----
    let report = output::Report::new(args.mode, mask, &cidrs, hosts.store(), summary);
    if args.json || args.output_dir.is_some() {
        let json = output::data_as_json(&report)?;
        match args.output_dir.as_deref() {
            Some(out_dir) => write_report(out_dir, json)?,
            None => println!("{json}"),
        }
    }
    if !args.json {
        output::print_results(&report);
    }

    Ok(())
}

fn write_report(out_dir: &Path, json: String) -> std::io::Result<()> {
    log::info!("Output directory {}", out_dir.display());
    fs::create_dir_all(out_dir)?;
    output::data_to_file(json, &out_dir.join("classification.json"))
}
