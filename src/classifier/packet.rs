//! Per-packet role heuristics.
//!
//! Fields are decoded one at a time from the byte slice at fixed offsets, so
//! nothing here depends on the alignment of the capture buffer.
use super::containers::{PacketRole, Role};
use crate::error::FrameError;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const AF_INET: u32 = 2;

const IPV4_MIN_HEADER_LEN: usize = 20;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const DNS_HEADER_LEN: usize = 12;
const ICMP_HEADER_LEN: usize = 4;

const IPPROTO_ICMP: u8 = 1;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

const TH_SYN: u8 = 0x02;
const TH_ACK: u8 = 0x10;

const FTP_DATA_PORT: u16 = 20;
const DNS_PORT: u16 = 53;
const DNS_RESPONSE_FLAG: u16 = 0x8000;

const ICMP_UNREACH: u8 = 3;
const ICMP_UNREACH_PORT: u8 = 3;

fn read_u8(data: &[u8], offset: usize) -> Option<u8> {
    data.get(offset).copied()
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Link-layer framing in front of the IPv4 header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkLayer {
    /// Ethernet II, optionally with a single 802.1Q tag.
    Ethernet,
    /// Linux cooked capture (SLL).
    LinuxSll,
    /// BSD loopback: a 4-byte address family in either byte order.
    Null,
    /// Bare IP, no link header.
    Raw,
}

impl LinkLayer {
    /// Offset of the IPv4 header, once the link protocol field says IPv4.
    fn ip_offset(self, frame: &[u8]) -> Result<usize, FrameError> {
        let truncated = |needed| FrameError::Truncated { needed, actual: frame.len() };
        match self {
            LinkLayer::Ethernet => {
                let ethertype = read_u16(frame, 12).ok_or(truncated(14))?;
                match ethertype {
                    ETHERTYPE_IPV4 => Ok(14),
                    ETHERTYPE_VLAN => match read_u16(frame, 16).ok_or(truncated(18))? {
                        ETHERTYPE_IPV4 => Ok(18),
                        inner => Err(FrameError::NotIpv4Link { protocol: u32::from(inner) }),
                    },
                    other => Err(FrameError::NotIpv4Link { protocol: u32::from(other) }),
                }
            }
            LinkLayer::LinuxSll => match read_u16(frame, 14).ok_or(truncated(16))? {
                ETHERTYPE_IPV4 => Ok(16),
                other => Err(FrameError::NotIpv4Link { protocol: u32::from(other) }),
            },
            LinkLayer::Null => {
                let family = frame.get(..4).ok_or(truncated(4))?;
                let family = [family[0], family[1], family[2], family[3]];
                if u32::from_le_bytes(family) == AF_INET || u32::from_be_bytes(family) == AF_INET {
                    Ok(4)
                } else {
                    Err(FrameError::NotIpv4Link { protocol: u32::from_be_bytes(family) })
                }
            }
            LinkLayer::Raw => Ok(0),
        }
    }
}

/// Reads the IPv4 source address of a frame without classifying it.
pub fn source_ip(frame: &[u8], link: LinkLayer) -> Result<u32, FrameError> {
    ipv4_header(frame, link).map(|ip| ip.src)
}

struct Ipv4Header {
    src: u32,
    protocol: u8,
    offset: usize,
    header_len: usize,
}

fn ipv4_header(frame: &[u8], link: LinkLayer) -> Result<Ipv4Header, FrameError> {
    let offset = link.ip_offset(frame)?;
    let needed = offset + IPV4_MIN_HEADER_LEN;
    if frame.len() < needed {
        return Err(FrameError::Truncated { needed, actual: frame.len() });
    }

    let version_ihl = frame[offset];
    let version = version_ihl >> 4;
    if version != 4 {
        return Err(FrameError::NotIpv4 { version });
    }

    let ihl = version_ihl & 0x0f;
    let header_len = usize::from(ihl) * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return Err(FrameError::BadHeaderLength { ihl });
    }

    let protocol = frame[offset + 9];
    let src = read_u32(frame, offset + 12).ok_or(FrameError::Truncated { needed, actual: frame.len() })?;

    Ok(Ipv4Header { src, protocol, offset, header_len })
}

/// Guesses whether the sender of `frame` is acting as a server or a client.
///
/// Frames whose link header doesn't announce IPv4 are rejected, as is an
/// unreadable IPv4 header. A frame too short for its transport header is
/// reported as [Role::Unknown] instead.
pub fn classify_frame(frame: &[u8], link: LinkLayer) -> Result<PacketRole, FrameError> {
    let ip = ipv4_header(frame, link)?;

    let mut mac = [0u8; 6];
    if matches!(link, LinkLayer::Ethernet | LinkLayer::LinuxSll) {
        mac.copy_from_slice(&frame[6..12]);
    }

    let l4 = ip.offset + ip.header_len;
    let role = match ip.protocol {
        IPPROTO_TCP => tcp_role(frame, l4),
        IPPROTO_UDP => udp_role(frame, l4),
        IPPROTO_ICMP => icmp_role(frame, l4),
        other => {
            log::trace!("IP protocol {other} carries no role hint");
            None
        }
    }
    .unwrap_or(Role::Unknown);

    log::debug!("{} classified as {}", std::net::Ipv4Addr::from(ip.src), role);

    Ok(PacketRole { ip: ip.src, mac, role })
}

fn tcp_role(frame: &[u8], offset: usize) -> Option<Role> {
    if frame.len() < offset + TCP_MIN_HEADER_LEN {
        log::trace!("short TCP header: {}", hex::encode(&frame[offset.min(frame.len())..]));
        return None;
    }

    // ftp-data connections are opened by the server and would skew the counts
    if read_u16(frame, offset)? == FTP_DATA_PORT {
        return None;
    }

    match read_u8(frame, offset + 13)? {
        TH_SYN => Some(Role::Client),
        flags if flags == TH_SYN | TH_ACK => Some(Role::Server),
        _ => None,
    }
}

fn udp_role(frame: &[u8], offset: usize) -> Option<Role> {
    let sport = read_u16(frame, offset)?;
    let dport = read_u16(frame, offset + 2)?;

    if dport != DNS_PORT && sport != DNS_PORT {
        log::trace!("unknown UDP protocol: {sport}->{dport}");
        return None;
    }

    let dns = offset + UDP_HEADER_LEN;
    if frame.len() < dns + DNS_HEADER_LEN {
        return None;
    }

    let flags = read_u16(frame, dns + 2)?;
    if flags & DNS_RESPONSE_FLAG != 0 {
        Some(Role::Server)
    } else {
        Some(Role::Client)
    }
}

fn icmp_role(frame: &[u8], offset: usize) -> Option<Role> {
    if frame.len() < offset + ICMP_HEADER_LEN {
        return None;
    }

    // port unreachable: the sender was reached on a closed port
    let kind = read_u8(frame, offset)?;
    let code = read_u8(frame, offset + 1)?;
    (kind == ICMP_UNREACH && code == ICMP_UNREACH_PORT).then_some(Role::Server)
}
