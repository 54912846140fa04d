use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Netmask with the top `mask_len` bits set. Lengths above 32 saturate.
pub fn netmask(mask_len: u8) -> u32 {
    match mask_len {
        0 => 0,
        len => u32::MAX << (32 - u32::from(len.min(32))),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CidrBlock {
    pub network: u32,
    pub mask_len: u8,
}

impl CidrBlock {
    /// The block of length `mask_len` that `ip` falls in.
    pub fn containing(ip: u32, mask_len: u8) -> Self {
        Self { network: ip & netmask(mask_len), mask_len }
    }

    pub fn contains(&self, ip: u32) -> bool {
        ip & netmask(self.mask_len) == self.network
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.network), self.mask_len)
    }
}

/// Insertion-ordered set of CIDR blocks.
#[derive(Clone, Debug, Default)]
pub struct CidrList {
    blocks: Vec<CidrBlock>,
}

impl CidrList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// True if `ip` falls inside any stored block.
    pub fn contains(&self, ip: u32) -> bool {
        self.blocks.iter().any(|block| block.contains(ip))
    }

    /// Adds the block unless the same network/length pair is already stored.
    /// Returns whether anything was added.
    pub fn insert_if_absent(&mut self, network: u32, mask_len: u8) -> bool {
        let block = CidrBlock { network, mask_len };
        if self.blocks.contains(&block) {
            return false;
        }
        self.blocks.push(block);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &CidrBlock> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
