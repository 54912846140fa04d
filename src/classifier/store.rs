//! Ordered per-host classification store.
//!
//! Entries are keyed by the numeric IPv4 address, so iteration is always in
//! ascending address order.
use std::collections::BTreeMap;

use super::containers::ClassificationEntry;
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct ClassificationStore {
    entries: BTreeMap<u32, ClassificationEntry>,
}

impl ClassificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, ip: u32) -> Option<&ClassificationEntry> {
        self.entries.get(&ip)
    }

    pub fn find_mut(&mut self, ip: u32) -> Option<&mut ClassificationEntry> {
        self.entries.get_mut(&ip)
    }

    /// Inserts a new entry. Callers must `find` first; an existing key is rejected.
    pub fn insert(&mut self, entry: ClassificationEntry) -> Result<(), StoreError> {
        use std::collections::btree_map::Entry;

        match self.entries.entry(entry.ip) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey { ip: entry.ip }),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassificationEntry> {
        self.entries.values()
    }

    /// Field mutation only; the key set cannot change while walking.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClassificationEntry> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
