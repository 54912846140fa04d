use serde::{Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What a single frame tells us about its sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketRole {
    pub ip: u32,
    pub mac: [u8; 6],
    pub role: Role,
}

/// Accumulated evidence for one source address.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassificationEntry {
    #[serde(serialize_with = "as_dotted_quad")]
    pub ip: u32,
    #[serde(serialize_with = "as_mac")]
    pub mac: [u8; 6],
    pub role: Role,
    pub server_evidence: u64,
    pub client_evidence: u64,
    pub mask_len: Option<u8>,
}

impl ClassificationEntry {
    pub fn new(ip: u32, mac: [u8; 6]) -> Self {
        Self { ip, mac, role: Role::Unknown, server_evidence: 0, client_evidence: 0, mask_len: None }
    }

    /// Counts one packet's worth of evidence. Unknown counts for neither side.
    pub fn record(&mut self, role: Role) {
        match role {
            Role::Server => self.server_evidence += 1,
            Role::Client => self.client_evidence += 1,
            Role::Unknown => {}
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip)
    }
}

impl fmt::Display for ClassificationEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mask = self.mask_len.map_or(-1, i16::from);
        write!(
            f,
            "IP: {} MAC: {} Mask: {} Srvr: {} Clnt: {} Type: {}",
            self.addr(),
            format_mac(&self.mac),
            mask,
            self.server_evidence,
            self.client_evidence,
            self.role
        )
    }
}

pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter().map(|b| hex::encode([*b])).collect::<Vec<_>>().join(":")
}

fn as_dotted_quad<S: Serializer>(ip: &u32, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&Ipv4Addr::from(*ip))
}

fn as_mac<S: Serializer>(mac: &[u8; 6], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_mac(mac))
}
