//! Client/server classification of every source address in a capture.
//!
//! Runs in phases: [Classifier::add] once per packet, [Classifier::finalize_all]
//! once all packets are in, optionally [Classifier::find_separating_mask] for
//! router mode, then [Classifier::role_of] while dispatching.
use std::net::Ipv4Addr;

use super::cidr::{CidrBlock, CidrList};
use super::config::{ClassifierConfig, WalkPolicy};
use super::containers::{ClassificationEntry, Role};
use super::packet::{classify_frame, LinkLayer};
use super::store::ClassificationStore;
use crate::error::ClassifyError;

#[derive(Debug)]
pub struct Classifier {
    config: ClassifierConfig,
    link: LinkLayer,
    store: ClassificationStore,
}

impl Classifier {
    /// `link` is the framing of every frame passed to [Classifier::add].
    pub fn new(config: ClassifierConfig, link: LinkLayer) -> Result<Self, ClassifyError> {
        config.validate()?;
        Ok(Self { config, link, store: ClassificationStore::new() })
    }

    pub fn store(&self) -> &ClassificationStore {
        &self.store
    }

    /// Records one packet sent by `ip`. Returns the role the packet suggested.
    ///
    /// `ip` must be the source address carried in `frame`; anything else is
    /// rejected before the store is touched.
    pub fn add(&mut self, ip: u32, frame: &[u8]) -> Result<Role, ClassifyError> {
        let parsed = classify_frame(frame, self.link)?;
        if parsed.ip != ip {
            return Err(ClassifyError::SourceMismatch { given: ip, found: parsed.ip });
        }

        if parsed.role == Role::Unknown {
            log::debug!("{} ({}) unknown client/server", Ipv4Addr::from(ip), ip);
        }

        match self.store.find_mut(ip) {
            Some(entry) => {
                entry.record(parsed.role);
                log::trace!("update node {entry}");
            }
            None => {
                let mut entry = ClassificationEntry::new(ip, parsed.mac);
                entry.record(parsed.role);
                log::trace!("new node {entry}");
                self.store.insert(entry)?;
            }
        }

        Ok(parsed.role)
    }

    /// Turns accumulated evidence into a role for every host.
    ///
    /// Hosts with no evidence are Unknown; otherwise a host is a server when
    /// `server_evidence >= client_evidence * ratio`. Idempotent.
    pub fn finalize_all(&mut self) {
        log::info!("Finalizing roles.");
        let ratio = self.config.ratio;

        for entry in self.store.iter_mut() {
            entry.role = if entry.server_evidence == 0 && entry.client_evidence == 0 {
                Role::Unknown
            } else if entry.server_evidence as f64 >= entry.client_evidence as f64 * ratio {
                Role::Server
            } else {
                Role::Client
            };
            log::trace!("Setting {} to {}", entry.addr(), entry.role);
        }
    }

    /// Searches mask lengths from `start_mask` up to `end_mask` for one where the
    /// CIDR blocks covering every `target` host contain no `check` host.
    ///
    /// On success `cidrs` holds the winning blocks. On failure it is left empty.
    pub fn find_separating_mask(&mut self, cidrs: &mut CidrList, target: Role, check: Role) -> Option<u8> {
        log::info!("Searching for separating mask.");
        self.finalize_all();
        for entry in self.store.iter_mut() {
            entry.mask_len = None;
        }

        for mask_len in self.config.start_mask..=self.config.end_mask {
            log::debug!("Current mask: {mask_len}");
            cidrs.clear();

            for entry in self.walk(target) {
                let block = CidrBlock::containing(entry.ip, mask_len);
                if cidrs.insert_if_absent(block.network, block.mask_len) {
                    log::trace!("{} added {block}", entry.addr());
                }
            }

            let collision = self.walk(check).find(|entry| cidrs.contains(entry.ip));
            match collision {
                Some(entry) => {
                    log::debug!("/{mask_len} rejected: {} {} falls inside a {} block", check, entry.addr(), target);
                }
                None => {
                    log::info!("Found separating mask /{mask_len} with {} blocks", cidrs.len());
                    let walk = self.config.walk;
                    for entry in self.store.iter_mut() {
                        if entry.role == target {
                            entry.mask_len = Some(mask_len);
                        } else if walk == WalkPolicy::StopAtMismatch {
                            break;
                        }
                    }
                    return Some(mask_len);
                }
            }
        }

        cidrs.clear();
        None
    }

    /// Entries with `role` in ascending address order, honouring the walk policy.
    fn walk(&self, role: Role) -> Box<dyn Iterator<Item = &ClassificationEntry> + '_> {
        let entries = self.store.iter();
        match self.config.walk {
            WalkPolicy::SkipMismatched => Box::new(entries.filter(move |e| e.role == role)),
            WalkPolicy::StopAtMismatch => Box::new(entries.take_while(move |e| e.role == role)),
        }
    }

    /// The finalized role of `ip`, or `default_mode` for hosts never seen.
    ///
    /// An unseen host with an Unknown default is an error: there is no policy
    /// to fall back on.
    pub fn role_of(&self, default_mode: Role, ip: u32) -> Result<Role, ClassifyError> {
        match self.store.find(ip) {
            Some(entry) => {
                log::trace!("{}: {}", entry.role, entry.addr());
                Ok(entry.role)
            }
            None if default_mode == Role::Unknown => Err(ClassifyError::UnknownHost { ip }),
            None => Ok(default_mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::packet::testframes::*;
    use crate::error::ConfigError;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> u32 {
        u32::from(Ipv4Addr::new(a, b, c, d))
    }

    fn classifier(config: ClassifierConfig) -> Classifier {
        Classifier::new(config, LinkLayer::Ethernet).expect("valid config")
    }

    fn feed(c: &mut Classifier, host: u32, servers: usize, clients: usize) {
        for _ in 0..servers {
            c.add(host, &syn_ack(host)).expect("add");
        }
        for _ in 0..clients {
            c.add(host, &syn(host)).expect("add");
        }
    }

    fn masks(start_mask: u8, end_mask: u8, walk: WalkPolicy) -> ClassifierConfig {
        ClassifierConfig { start_mask, end_mask, walk, ..Default::default() }
    }

    // ===========================================
    // Aggregation
    // ===========================================

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ClassifierConfig { ratio: 0.0, ..Default::default() };
        let err = Classifier::new(config, LinkLayer::Ethernet).unwrap_err();
        assert_eq!(err, ClassifyError::Config(ConfigError::InvalidRatio(0.0)));
    }

    #[test]
    fn test_one_entry_per_source() {
        let mut c = classifier(ClassifierConfig::default());
        let a = ip(10, 0, 0, 1);
        let b = ip(10, 0, 0, 2);
        c.add(a, &syn(a)).expect("add");
        c.add(b, &syn_ack(b)).expect("add");
        c.add(a, &syn_ack(a)).expect("add");
        c.add(a, &icmp(a, 8, 0)).expect("add");
        assert_eq!(c.store().len(), 2);
    }

    #[test]
    fn test_evidence_counts_per_packet() {
        let mut c = classifier(ClassifierConfig::default());
        let a = ip(10, 0, 0, 1);

        assert_eq!(c.add(a, &syn(a)), Ok(Role::Client));
        assert_eq!(c.add(a, &dns(a, 53, 40000, true)), Ok(Role::Server));
        assert_eq!(c.add(a, &tcp(a, 20, 80, 0x02)), Ok(Role::Unknown));
        assert_eq!(c.add(a, &syn(a)), Ok(Role::Client));

        let entry = c.store().find(a).expect("entry");
        assert_eq!(entry.server_evidence, 1);
        assert_eq!(entry.client_evidence, 2);
        assert_eq!(entry.mac, SRC_MAC);
        assert_eq!(entry.role, Role::Unknown);
    }

    #[test]
    fn test_unknown_packet_still_creates_entry() {
        let mut c = classifier(ClassifierConfig::default());
        let a = ip(172, 16, 0, 1);
        c.add(a, &icmp(a, 0, 0)).expect("add");
        let entry = c.store().find(a).expect("entry");
        assert_eq!((entry.server_evidence, entry.client_evidence), (0, 0));
    }

    #[test]
    fn test_add_rejects_mismatched_source() {
        let mut c = classifier(ClassifierConfig::default());
        let a = ip(10, 0, 0, 1);
        let b = ip(10, 0, 0, 2);
        let err = c.add(a, &syn(b)).unwrap_err();
        assert_eq!(err, ClassifyError::SourceMismatch { given: a, found: b });
        assert!(c.store().is_empty());
    }

    #[test]
    fn test_non_ip_frame_creates_no_host() {
        let mut c = classifier(ClassifierConfig::default());
        let a = ip(10, 0, 0, 5);
        let tagged = vlan_tagged(with_ethertype(syn(a), 0x88b5), 0x4500);
        assert!(matches!(c.add(a, &tagged), Err(ClassifyError::Frame(_))));
        assert!(c.store().is_empty());
    }

    #[test]
    fn test_unreadable_frame_is_error() {
        let mut c = classifier(ClassifierConfig::default());
        let a = ip(10, 0, 0, 1);
        assert!(matches!(c.add(a, &syn(a)[..16]), Err(ClassifyError::Frame(_))));
        assert!(c.store().is_empty());
    }

    // ===========================================
    // Finalization
    // ===========================================

    #[test]
    fn test_ratio_boundary() {
        let mut c = classifier(ClassifierConfig { ratio: 2.0, ..Default::default() });
        let even = ip(10, 0, 0, 1);
        let short = ip(10, 0, 0, 2);
        feed(&mut c, even, 6, 3);
        feed(&mut c, short, 5, 3);
        c.finalize_all();
        assert_eq!(c.store().find(even).map(|e| e.role), Some(Role::Server));
        assert_eq!(c.store().find(short).map(|e| e.role), Some(Role::Client));
    }

    #[test]
    fn test_no_evidence_finalizes_unknown() {
        let mut c = classifier(ClassifierConfig::default());
        let a = ip(10, 0, 0, 1);
        c.add(a, &icmp(a, 8, 0)).expect("add");
        c.finalize_all();
        assert_eq!(c.store().find(a).map(|e| e.role), Some(Role::Unknown));
    }

    #[test]
    fn test_server_only_evidence() {
        let mut c = classifier(ClassifierConfig::default());
        let a = ip(10, 0, 0, 1);
        feed(&mut c, a, 1, 0);
        c.finalize_all();
        assert_eq!(c.store().find(a).map(|e| e.role), Some(Role::Server));
    }

    #[test]
    fn test_finalize_idempotent() {
        let mut c = classifier(ClassifierConfig::default());
        for (n, (s, cl)) in [(3, 1), (1, 3), (0, 0), (2, 1)].into_iter().enumerate() {
            let host = ip(10, 0, 0, n as u8 + 1);
            feed(&mut c, host, s, cl);
            if s + cl == 0 {
                c.add(host, &icmp(host, 8, 0)).expect("add");
            }
        }
        c.finalize_all();
        let first: Vec<Role> = c.store().iter().map(|e| e.role).collect();
        c.finalize_all();
        let second: Vec<Role> = c.store().iter().map(|e| e.role).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![Role::Server, Role::Client, Role::Unknown, Role::Server]);
    }

    // ===========================================
    // CIDR search
    // ===========================================

    fn separable() -> Classifier {
        let mut c = classifier(masks(24, 24, WalkPolicy::SkipMismatched));
        feed(&mut c, ip(10, 0, 0, 1), 1, 0);
        feed(&mut c, ip(10, 0, 0, 200), 1, 0);
        feed(&mut c, ip(10, 0, 1, 5), 0, 1);
        feed(&mut c, ip(192, 168, 1, 1), 0, 1);
        c
    }

    #[test]
    fn test_search_finds_separating_mask() {
        let mut c = separable();
        let mut cidrs = CidrList::new();
        assert_eq!(c.find_separating_mask(&mut cidrs, Role::Server, Role::Client), Some(24));

        let blocks: Vec<String> = cidrs.iter().map(|b| b.to_string()).collect();
        assert_eq!(blocks, vec!["10.0.0.0/24"]);
        assert_eq!(c.store().find(ip(10, 0, 0, 1)).and_then(|e| e.mask_len), Some(24));
        assert_eq!(c.store().find(ip(10, 0, 1, 5)).and_then(|e| e.mask_len), None);
    }

    #[test]
    fn test_search_fails_when_overlapping() {
        let mut c = classifier(masks(8, 30, WalkPolicy::SkipMismatched));
        feed(&mut c, ip(10, 0, 0, 4), 1, 0);
        feed(&mut c, ip(10, 0, 0, 5), 0, 1);
        feed(&mut c, ip(10, 0, 0, 6), 1, 0);

        let mut cidrs = CidrList::new();
        cidrs.insert_if_absent(0, 1);
        assert_eq!(c.find_separating_mask(&mut cidrs, Role::Server, Role::Client), None);
        assert!(cidrs.is_empty());
    }

    #[test]
    fn test_search_takes_first_passing_mask() {
        let mut c = classifier(masks(8, 30, WalkPolicy::SkipMismatched));
        feed(&mut c, ip(10, 1, 0, 1), 1, 0);
        feed(&mut c, ip(10, 2, 0, 1), 0, 1);

        let mut cidrs = CidrList::new();
        assert_eq!(c.find_separating_mask(&mut cidrs, Role::Server, Role::Client), Some(15));
        let blocks: Vec<String> = cidrs.iter().map(|b| b.to_string()).collect();
        assert_eq!(blocks, vec!["10.0.0.0/15"]);
    }

    #[test]
    fn test_search_empty_range() {
        let mut c = separable();
        c.config.start_mask = 25;
        c.config.end_mask = 24;
        let mut cidrs = CidrList::new();
        assert_eq!(c.find_separating_mask(&mut cidrs, Role::Server, Role::Client), None);
        assert!(cidrs.is_empty());
    }

    #[test]
    fn test_search_dedups_blocks() {
        let mut c = classifier(masks(16, 16, WalkPolicy::SkipMismatched));
        for host in 1..=5 {
            feed(&mut c, ip(10, 0, 0, host), 1, 0);
        }
        feed(&mut c, ip(10, 9, 0, 1), 1, 0);
        feed(&mut c, ip(10, 5, 0, 1), 0, 1);

        let mut cidrs = CidrList::new();
        assert_eq!(c.find_separating_mask(&mut cidrs, Role::Server, Role::Client), Some(16));
        assert_eq!(cidrs.len(), 2);
    }

    #[test]
    fn test_stop_at_mismatch_only_walks_leading_run() {
        // ascending: server 10.0.0.1, client 10.0.0.2, server 10.0.0.3
        let build = |walk| {
            let mut c = classifier(masks(30, 30, walk));
            feed(&mut c, ip(10, 0, 0, 1), 1, 0);
            feed(&mut c, ip(10, 0, 0, 2), 0, 1);
            feed(&mut c, ip(10, 0, 0, 3), 1, 0);
            c
        };

        // fixed walk covers both servers and catches the client in 10.0.0.0/30
        let mut cidrs = CidrList::new();
        let mut fixed = build(WalkPolicy::SkipMismatched);
        assert_eq!(fixed.find_separating_mask(&mut cidrs, Role::Server, Role::Client), None);

        // legacy walk only sees 10.0.0.1, and the check pass stops at the first
        // (server) entry so no client is ever tested
        let mut legacy = build(WalkPolicy::StopAtMismatch);
        assert_eq!(legacy.find_separating_mask(&mut cidrs, Role::Server, Role::Client), Some(30));
        assert_eq!(cidrs.len(), 1);
        assert_eq!(legacy.store().find(ip(10, 0, 0, 3)).and_then(|e| e.mask_len), None);
    }

    #[test]
    fn test_search_clears_masks_from_earlier_run() {
        let mut c = separable();
        let mut cidrs = CidrList::new();
        assert_eq!(c.find_separating_mask(&mut cidrs, Role::Server, Role::Client), Some(24));
        assert!(c.store().iter().any(|e| e.mask_len.is_some()));

        c.config.start_mask = 25;
        c.config.end_mask = 24;
        assert_eq!(c.find_separating_mask(&mut cidrs, Role::Server, Role::Client), None);
        assert!(c.store().iter().all(|e| e.mask_len.is_none()));
    }

    #[test]
    fn test_search_masks_follow_latest_winner() {
        let mut c = separable();
        let mut cidrs = CidrList::new();
        assert_eq!(c.find_separating_mask(&mut cidrs, Role::Server, Role::Client), Some(24));

        // 10.0.0.200 now looks like a client, so only 10.0.0.1 carries the mask
        feed(&mut c, ip(10, 0, 0, 200), 0, 5);
        c.config.start_mask = 25;
        c.config.end_mask = 25;
        assert_eq!(c.find_separating_mask(&mut cidrs, Role::Server, Role::Client), Some(25));
        assert_eq!(c.store().find(ip(10, 0, 0, 1)).and_then(|e| e.mask_len), Some(25));
        assert_eq!(c.store().find(ip(10, 0, 0, 200)).and_then(|e| e.mask_len), None);
    }

    // ===========================================
    // Role queries
    // ===========================================

    #[test]
    fn test_role_of_known_host() {
        let mut c = separable();
        c.finalize_all();
        assert_eq!(c.role_of(Role::Unknown, ip(10, 0, 0, 1)), Ok(Role::Server));
        assert_eq!(c.role_of(Role::Server, ip(192, 168, 1, 1)), Ok(Role::Client));
    }

    #[test]
    fn test_role_of_unseen_host_uses_default() {
        let c = separable();
        let unseen = ip(8, 8, 8, 8);
        assert_eq!(c.role_of(Role::Client, unseen), Ok(Role::Client));
        assert_eq!(c.role_of(Role::Server, unseen), Ok(Role::Server));
    }

    #[test]
    fn test_role_of_unseen_host_strict() {
        let c = separable();
        let unseen = ip(8, 8, 8, 8);
        let err = c.role_of(Role::Unknown, unseen).unwrap_err();
        assert_eq!(err, ClassifyError::UnknownHost { ip: unseen });
        assert!(err.to_string().contains("8.8.8.8"));
        assert!(err.to_string().contains("Try a different auto mode"));
    }
}
