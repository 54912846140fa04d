//! Error types for classification and capture loading.
use std::net::Ipv4Addr;
use thiserror::Error;

/// A frame whose IPv4 header could not be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated: needed {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("link layer carries protocol {protocol:#06x}, not IPv4")]
    NotIpv4Link { protocol: u32 },

    #[error("not an IPv4 packet (version {version})")]
    NotIpv4 { version: u8 },

    #[error("invalid IPv4 header length ({ihl} words)")]
    BadHeaderLength { ihl: u8 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{} is already in the store", Ipv4Addr::from(*ip))]
    DuplicateKey { ip: u32 },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("ratio must be a positive number, got {0}")]
    InvalidRatio(f64),

    #[error("{name} must be between 1 and 32, got {value}")]
    InvalidMask { name: &'static str, value: u8 },
}

#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{} ({ip}) is an unknown system... aborting. Try a different auto mode (-m router|client|server)", Ipv4Addr::from(*ip))]
    UnknownHost { ip: u32 },

    #[error("frame is from {} but was recorded for {}", Ipv4Addr::from(*found), Ipv4Addr::from(*given))]
    SourceMismatch { given: u32, found: u32 },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read pcap: {0}")]
    Pcap(#[from] pcap_file::PcapError),

    #[error("unsupported link type {0:?}")]
    UnsupportedLinkType(pcap_file::DataLink),
}
