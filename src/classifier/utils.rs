//! Capture loading helpers.
use pcap_file::pcap::PcapReader;
use pcap_file::DataLink;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::packet::LinkLayer;
use crate::error::CaptureError;

/// Raw frames of one capture, in file order.
#[derive(Debug)]
pub struct Capture {
    pub link: LinkLayer,
    pub frames: Vec<Vec<u8>>,
}

/// Framing used by a pcap datalink, if frames of that type can carry IPv4.
pub fn link_layer(link_type: DataLink) -> Option<LinkLayer> {
    match link_type {
        DataLink::ETHERNET => Some(LinkLayer::Ethernet),
        DataLink::LINUX_SLL => Some(LinkLayer::LinuxSll),
        DataLink::NULL | DataLink::LOOP => Some(LinkLayer::Null),
        DataLink::RAW | DataLink::IPV4 => Some(LinkLayer::Raw),
        _ => None,
    }
}

/// Loads every frame of a classic pcap file.
///
/// Both passes walk the same frames, so they are kept in memory.
pub fn load_file(path: &Path) -> Result<Capture, CaptureError> {
    log::info!("Loading capture file.");

    let file = File::open(path)?;
    let mut reader = PcapReader::new(BufReader::new(file))?;
    log::info!("Reading from {}", path.display());

    let link_type = reader.header().datalink;
    let link = link_layer(link_type).ok_or(CaptureError::UnsupportedLinkType(link_type))?;

    let mut frames = Vec::new();
    while let Some(packet) = reader.next_packet() {
        frames.push(packet?.data.into_owned());
    }
    log::info!("Loaded {} frames ({:?})", frames.len(), link_type);

    Ok(Capture { link, frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::packet::testframes::syn;
    use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
    use std::time::Duration;

    #[test]
    fn test_link_layer() {
        assert_eq!(link_layer(DataLink::ETHERNET), Some(LinkLayer::Ethernet));
        assert_eq!(link_layer(DataLink::LINUX_SLL), Some(LinkLayer::LinuxSll));
        assert_eq!(link_layer(DataLink::LOOP), Some(LinkLayer::Null));
        assert_eq!(link_layer(DataLink::RAW), Some(LinkLayer::Raw));
        assert_eq!(link_layer(DataLink::IEEE802_11), None);
    }

    #[test]
    fn test_load_file_reads_frames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("capture.pcap");

        let file = File::create(&path).expect("create");
        let header = PcapHeader { datalink: DataLink::ETHERNET, ..Default::default() };
        let mut writer = PcapWriter::with_header(file, header).expect("writer");
        for host in [0x0A000001u32, 0x0A000002] {
            let data = syn(host);
            let packet = PcapPacket::new(Duration::from_secs(1), data.len() as u32, &data);
            writer.write_packet(&packet).expect("write");
        }
        drop(writer);

        let capture = load_file(&path).expect("load");
        assert_eq!(capture.link, LinkLayer::Ethernet);
        assert_eq!(capture.frames.len(), 2);
        assert_eq!(capture.frames[1], syn(0x0A000002));
    }

    #[test]
    fn test_load_file_missing() {
        let err = load_file(Path::new("/nonexistent/capture.pcap")).unwrap_err();
        assert!(matches!(err, CaptureError::Io(_)));
    }
}
