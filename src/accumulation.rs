//! Per-genre accumulation map.
//!
//! Holds placeholder slots for tracks the store already has under the genre
//! and fresh entries fetched during the run. Only fresh entries count toward
//! the run's target and only fresh entries are ever committed.

use rustc_hash::FxHashMap;

use crate::models::AccumulationEntry;

#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    /// Already persisted; carries no content
    Placeholder,
    Fresh(AccumulationEntry),
}

/// Result of offering an entry to the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Inserted,
    Duplicate,
    Full,
}

#[derive(Debug)]
pub struct AccumulationMap {
    slots: FxHashMap<String, Slot>,
    order: Vec<String>, // fresh ids in insertion order
    target: usize,
}

impl AccumulationMap {
    /// `target` is the number of fresh entries wanted (`quota - existing`).
    pub fn new(target: usize) -> Self {
        Self {
            slots: FxHashMap::default(),
            order: Vec::new(),
            target,
        }
    }

    pub fn seed_placeholders<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        for id in ids {
            self.slots.entry(id).or_insert(Slot::Placeholder);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn fresh_len(&self) -> usize {
        self.order.len()
    }

    pub fn placeholder_len(&self) -> usize {
        self.slots.len() - self.order.len()
    }

    pub fn is_full(&self) -> bool {
        self.order.len() >= self.target
    }

    pub fn remaining(&self) -> usize {
        self.target.saturating_sub(self.order.len())
    }

    /// Insert a fresh entry unless the map is full or the id is already present.
    pub fn admit(&mut self, entry: AccumulationEntry) -> Admission {
        if self.is_full() {
            return Admission::Full;
        }
        if self.slots.contains_key(&entry.track.id) {
            return Admission::Duplicate;
        }
        let id = entry.track.id.clone();
        self.order.push(id.clone());
        self.slots.insert(id, Slot::Fresh(entry));
        Admission::Inserted
    }

    /// Fresh entries in insertion order; placeholders are never yielded.
    pub fn fresh_entries(&self) -> impl Iterator<Item = &AccumulationEntry> {
        self.order.iter().filter_map(|id| match self.slots.get(id) {
            Some(Slot::Fresh(entry)) => Some(entry),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fresh_entry;

    fn entry(id: &str) -> AccumulationEntry {
        fresh_entry(id, "afrobeat")
    }

    #[test]
    fn test_admit_until_full() {
        let mut map = AccumulationMap::new(2);
        assert_eq!(map.admit(entry("a")), Admission::Inserted);
        assert_eq!(map.admit(entry("b")), Admission::Inserted);
        assert_eq!(map.admit(entry("c")), Admission::Full);
        assert_eq!(map.fresh_len(), 2);
        assert!(map.is_full());
        assert_eq!(map.remaining(), 0);
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut map = AccumulationMap::new(5);
        map.admit(entry("a"));
        assert_eq!(map.admit(entry("a")), Admission::Duplicate);
        assert_eq!(map.fresh_len(), 1);
    }

    #[test]
    fn test_placeholders_block_ids_but_not_target() {
        let mut map = AccumulationMap::new(2);
        map.seed_placeholders(vec!["old1".to_string(), "old2".to_string()]);

        assert_eq!(map.placeholder_len(), 2);
        assert_eq!(map.fresh_len(), 0);
        assert!(!map.is_full());
        assert_eq!(map.admit(entry("old1")), Admission::Duplicate);
        assert_eq!(map.admit(entry("new1")), Admission::Inserted);

        let fresh: Vec<&str> = map.fresh_entries().map(|e| e.track.id.as_str()).collect();
        assert_eq!(fresh, vec!["new1"]);
    }

    #[test]
    fn test_fresh_entries_keep_insertion_order() {
        let mut map = AccumulationMap::new(10);
        for id in ["z", "a", "m"] {
            map.admit(entry(id));
        }
        let fresh: Vec<&str> = map.fresh_entries().map(|e| e.track.id.as_str()).collect();
        assert_eq!(fresh, vec!["z", "a", "m"]);
    }
}
