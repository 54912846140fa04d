use crate::classifier::cidr::{CidrBlock, CidrList};
use crate::classifier::config::AutoMode;
use crate::classifier::containers::{format_mac, ClassificationEntry, Role};
use crate::classifier::dispatch::DispatchSummary;
use crate::classifier::store::ClassificationStore;
use ansi_term::Colour;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Everything a run produced, in serialisable form.
#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: String,
    pub mode: AutoMode,
    pub mask: Option<u8>,
    pub cidrs: Vec<String>,
    pub hosts: Vec<ClassificationEntry>,
    pub summary: DispatchSummary,
}

impl Report {
    pub fn new(
        mode: AutoMode,
        mask: Option<u8>,
        cidrs: &CidrList,
        store: &ClassificationStore,
        summary: DispatchSummary,
    ) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            mode,
            mask,
            cidrs: cidrs.iter().map(CidrBlock::to_string).collect(),
            hosts: store.iter().cloned().collect(),
            summary,
        }
    }
}

fn paint_role(role: Role) -> String {
    let colour = match role {
        Role::Server => Colour::Red,
        Role::Client => Colour::Green,
        Role::Unknown => Colour::Fixed(244),
    };
    colour.paint(format!("{:<7}", role.to_string())).to_string()
}

pub fn print_results(report: &Report) {
    println!("\n\u{250F}\u{2501}\u{2501}\u{2501}\u{2501} Results");
    print_hosts(&report.hosts);
    print_cidrs(report);
    print_summary(&report.summary);
}

pub fn print_hosts(hosts: &[ClassificationEntry]) {
    println!("\u{2503}");
    println!("\u{2503} {:<15}  {:<17}  {:>6}  {:>6}  Role", "Host", "MAC", "Srvr", "Clnt");
    for entry in hosts {
        println!(
            "\u{2503} {:<15}  {:<17}  {:>6}  {:>6}  {}",
            entry.addr().to_string(),
            format_mac(&entry.mac),
            entry.server_evidence,
            entry.client_evidence,
            paint_role(entry.role)
        );
    }
}

fn print_cidrs(report: &Report) {
    if report.mode != AutoMode::Router {
        return;
    }
    println!("\u{2503}");
    match report.mask {
        Some(mask) => {
            println!("\u{2503} Separating mask  : {}", Colour::Fixed(226).paint(format!("/{mask}")));
            for cidr in &report.cidrs {
                println!("\u{2503}   {}", Colour::Fixed(226).paint(cidr));
            }
        }
        None => println!("\u{2503} Separating mask  : {}", Colour::Red.paint("none")),
    }
}

pub fn print_summary(summary: &DispatchSummary) {
    println!("\u{2503}");
    println!("\u{2503} Server packets   : {}", summary.server_packets);
    println!("\u{2503} Client packets   : {}", summary.client_packets);
    println!("\u{2503} Unknown packets  : {}", summary.unknown_packets);
    println!("\u{2503} Skipped          : {}", summary.skipped);
    println!("\u{2503} ");
}

pub fn data_as_json(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

pub fn data_to_file(json: String, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    log::info!("Wrote {}", path.display());
    Ok(())
}
