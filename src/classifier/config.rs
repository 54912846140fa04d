//! Tunables for classification and the CIDR search.
use clap::ValueEnum;
use serde::Serialize;

use super::containers::Role;
use crate::error::ConfigError;

pub const DEFAULT_RATIO: f64 = 2.0;
pub const DEFAULT_START_MASK: u8 = 8;
pub const DEFAULT_END_MASK: u8 = 30;

/// How the CIDR search walks the store when an entry's role doesn't match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WalkPolicy {
    /// Skip the entry and keep going.
    #[default]
    SkipMismatched,
    /// End the whole pass at the first mismatch. Bit-compatible with legacy cache files.
    StopAtMismatch,
}

/// How packets are split between the client and server sides when dispatching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMode {
    /// Per-host lookup, unseen hosts are fatal
    #[default]
    Bridge,
    /// Summarise servers as CIDR blocks
    Router,
    /// Per-host lookup, unseen hosts are clients
    Client,
    /// Per-host lookup, unseen hosts are servers
    Server,
}

impl AutoMode {
    /// Role assumed for hosts that were never seen during classification.
    pub fn default_role(self) -> Role {
        match self {
            AutoMode::Bridge => Role::Unknown,
            AutoMode::Router | AutoMode::Client => Role::Client,
            AutoMode::Server => Role::Server,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierConfig {
    /// A host is a server when `server_evidence >= client_evidence * ratio`.
    pub ratio: f64,
    pub start_mask: u8,
    pub end_mask: u8,
    pub walk: WalkPolicy,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_RATIO,
            start_mask: DEFAULT_START_MASK,
            end_mask: DEFAULT_END_MASK,
            walk: WalkPolicy::default(),
        }
    }
}

impl ClassifierConfig {
    /// A start mask above the end mask is allowed and simply searches nothing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ratio.is_finite() || self.ratio <= 0.0 {
            return Err(ConfigError::InvalidRatio(self.ratio));
        }
        for (name, value) in [("start_mask", self.start_mask), ("end_mask", self.end_mask)] {
            if !(1..=32).contains(&value) {
                return Err(ConfigError::InvalidMask { name, value });
            }
        }
        Ok(())
    }
}
