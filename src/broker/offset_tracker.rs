use std::collections::HashMap;

#[derive(Debug, Default)]
struct GroupOffsets {
    partitions: HashMap<u32, u64>,
    last_active_ms: u64,
}

/// Committed read positions: (group, topic) -> partition -> next offset.
///
/// Each entry remembers when its group last read or committed, so groups of
/// nodes that went away can be forgotten.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    store: HashMap<(String, String), GroupOffsets>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&mut self, group: &str, topic: &str, partition: u32, offset: u64, now_ms: u64) {
        let entry = self
            .store
            .entry((group.to_string(), topic.to_string()))
            .or_default();
        entry.partitions.insert(partition, offset);
        entry.last_active_ms = now_ms;
    }

    pub fn fetch(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        self.store
            .get(&(group.to_string(), topic.to_string()))
            .and_then(|m| m.partitions.get(&partition))
            .copied()
    }

    /// Records a read by `group`; a group that never committed stays unknown.
    pub fn touch(&mut self, group: &str, topic: &str, now_ms: u64) {
        if let Some(entry) = self.store.get_mut(&(group.to_string(), topic.to_string())) {
            entry.last_active_ms = now_ms;
        }
    }

    /// Forgets every group idle since before `cutoff_ms`. Returns how many.
    pub fn expire_idle(&mut self, cutoff_ms: u64) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| entry.last_active_ms >= cutoff_ms);
        before - self.store.len()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}
