//! Per-endpoint HPACK dynamic table: a bounded, LRU-evicted header cache
//! (RFC 7541 §2.3.2).

use std::collections::VecDeque;

/// RFC 7541 §4.1: every entry costs its name/value lengths plus 32 bytes
/// of accounting overhead, regardless of the encoding used on the wire.
const ENTRY_OVERHEAD: usize = 32;

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    value: String,
}

fn entry_size(name: &str, value: &str) -> usize {
    name.len() + value.len() + ENTRY_OVERHEAD
}

/// A dynamic table, indexed (from the decoder/encoder's point of view) so
/// that index 1 is the most recently inserted entry — insertion is always
/// at the front, eviction always from the back (RFC 7541 §2.3.2).
#[derive(Debug, Default)]
pub struct DynamicTable {
    entries: VecDeque<Entry>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    /// Creates an empty table with the given maximum size in bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    /// Current maximum size in bytes.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Applies a dynamic-table-size-update, evicting entries until the new
    /// bound is satisfied.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to_fit();
    }

    /// Inserts a new entry at the front, evicting from the back as needed.
    /// An entry larger than the whole table is itself simply not stored
    /// (RFC 7541 §4.4), which the encoder/decoder must treat as "the table
    /// is now conceptually empty" rather than an error.
    pub fn insert(&mut self, name: String, value: String) {
        let added = entry_size(&name, &value);
        self.entries.push_front(Entry { name, value });
        self.size += added;
        self.evict_to_fit();
    }

    fn evict_to_fit(&mut self) {
        while self.size > self.max_size {
            match self.entries.pop_back() {
                Some(e) => self.size -= entry_size(&e.name, &e.value),
                None => break,
            }
        }
    }

    /// Looks up a dynamic-table entry by its 1-based index *within the
    /// dynamic table* (the caller is responsible for subtracting the
    /// static table's 61 entries first).
    pub fn get(&self, index: usize) -> Option<(&str, &str)> {
        if index == 0 {
            return None;
        }
        self.entries
            .get(index - 1)
            .map(|e| (e.name.as_str(), e.value.as_str()))
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_by_index_1() {
        let mut table = DynamicTable::new(4096);
        table.insert("custom-key".into(), "custom-value".into());
        assert_eq!(table.get(1), Some(("custom-key", "custom-value")));
    }

    #[test]
    fn most_recent_insert_is_always_index_1() {
        let mut table = DynamicTable::new(4096);
        table.insert("first".into(), "1".into());
        table.insert("second".into(), "2".into());
        assert_eq!(table.get(1), Some(("second", "2")));
        assert_eq!(table.get(2), Some(("first", "1")));
    }

    #[test]
    fn eviction_drops_oldest_entries_first() {
        let mut table = DynamicTable::new(entry_size("a", "1") + entry_size("b", "2"));
        table.insert("a".into(), "1".into());
        table.insert("b".into(), "2".into());
        table.insert("c".into(), "3".into());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(("c", "3")));
        assert_eq!(table.get(2), Some(("b", "2")));
    }

    #[test]
    fn shrinking_max_size_evicts_immediately() {
        let mut table = DynamicTable::new(4096);
        table.insert("a".into(), "1".into());
        table.insert("b".into(), "2".into());
        table.set_max_size(entry_size("b", "2"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1), Some(("b", "2")));
    }
}
