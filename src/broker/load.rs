//! Moderator load tracking

use uuid::Uuid;

/// One moderator's concurrent session count
#[derive(Debug, Clone)]
struct LoadEntry {
    id: Uuid,
    load: u32,
}

/// Tracks how many sessions each connected moderator is carrying and
/// answers "least loaded under capacity" queries.
///
/// Entries are kept in insertion order so that ties between equally
/// loaded moderators resolve deterministically.
pub struct ModeratorLoadTable {
    capacity: u32,
    entries: Vec<LoadEntry>,
}

impl ModeratorLoadTable {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Add a moderator to the pool with zero load. Re-inserting an
    /// existing id keeps the current entry.
    pub fn insert(&mut self, id: Uuid) {
        if self.entries.iter().any(|e| e.id == id) {
            return;
        }
        self.entries.push(LoadEntry { id, load: 0 });
    }

    /// Remove a moderator from the pool entirely.
    pub fn remove(&mut self, id: &Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != *id);
        self.entries.len() != before
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.iter().any(|e| e.id == *id)
    }

    pub fn load(&self, id: &Uuid) -> Option<u32> {
        self.entries.iter().find(|e| e.id == *id).map(|e| e.load)
    }

    /// The moderator with the smallest load strictly under capacity, or
    /// None if every moderator is saturated (or the pool is empty). Ties
    /// resolve to the earliest-inserted entry.
    pub fn least_loaded_available(&self) -> Option<Uuid> {
        self.entries
            .iter()
            .filter(|e| e.load < self.capacity)
            .min_by_key(|e| e.load)
            .map(|e| e.id)
    }

    pub fn increment(&mut self, id: &Uuid) {
        match self.entries.iter_mut().find(|e| e.id == *id) {
            Some(entry) => entry.load += 1,
            None => tracing::warn!("Load increment for unknown moderator {}", id),
        }
    }

    /// Saturating decrement. Missing entries are tolerated: the moderator
    /// may have disconnected before its sessions finished tearing down.
    pub fn decrement(&mut self, id: &Uuid) {
        match self.entries.iter_mut().find(|e| e.id == *id) {
            Some(entry) => entry.load = entry.load.saturating_sub(1),
            None => tracing::warn!("Load decrement for unknown moderator {}", id),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
