//! Second pass: assign every packet to the client or server side.
use serde::Serialize;
use std::net::Ipv4Addr;

use super::cidr::CidrList;
use super::containers::Role;
use super::core::Classifier;
use super::packet::{source_ip, LinkLayer};
use crate::error::ClassifyError;

/// Where packets are split: a CIDR summary of servers, or a per-host lookup.
#[derive(Clone, Copy, Debug)]
pub enum SplitRule<'a> {
    Cidr(&'a CidrList),
    Lookup { default_mode: Role },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
    pub index: usize,
    pub src: Ipv4Addr,
    pub role: Role,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub server_packets: usize,
    pub client_packets: usize,
    pub unknown_packets: usize,
    /// Frames that aren't IPv4 or whose IPv4 header is unreadable.
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub verdicts: Vec<Verdict>,
}

impl DispatchSummary {
    fn count(&mut self, role: Role) {
        match role {
            Role::Server => self.server_packets += 1,
            Role::Client => self.client_packets += 1,
            Role::Unknown => self.unknown_packets += 1,
        }
    }
}

pub fn dispatch<'f>(
    classifier: &Classifier,
    rule: SplitRule<'_>,
    frames: impl IntoIterator<Item = &'f [u8]>,
    link: LinkLayer,
    keep_verdicts: bool,
) -> Result<DispatchSummary, ClassifyError> {
    log::info!("Dispatching packets.");
    let mut summary = DispatchSummary::default();

    for (index, frame) in frames.into_iter().enumerate() {
        let ip = match source_ip(frame, link) {
            Ok(ip) => ip,
            Err(e) => {
                log::debug!("Skipping packet {index}: {e}");
                summary.skipped += 1;
                continue;
            }
        };

        let role = match rule {
            SplitRule::Cidr(cidrs) if cidrs.contains(ip) => Role::Server,
            SplitRule::Cidr(_) => Role::Client,
            SplitRule::Lookup { default_mode } => classifier.role_of(default_mode, ip)?,
        };

        summary.count(role);
        if keep_verdicts {
            summary.verdicts.push(Verdict { index, src: Ipv4Addr::from(ip), role });
        }
    }

    Ok(summary)
}
