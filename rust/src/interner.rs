//! String interning for activity ids.
//!
//! The network stores activities in an arena; every external id string maps to
//! a compact index into that arena.

use rustc_hash::FxHashMap;

/// Interned activity index (u32 for compact edge storage).
pub type ActivityIdx = u32;

/// Maps activity id strings to arena indices and back.
#[derive(Debug, Clone)]
pub struct ActivityIdInterner {
    to_idx: FxHashMap<String, ActivityIdx>,
    from_idx: Vec<String>,
}

impl ActivityIdInterner {
    /// Create a new interner with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_idx: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            from_idx: Vec::with_capacity(capacity),
        }
    }

    /// Intern an id. Returns `Err` with the existing index if it was already present.
    pub fn intern_unique(&mut self, id: &str) -> Result<ActivityIdx, ActivityIdx> {
        if let Some(&idx) = self.to_idx.get(id) {
            return Err(idx);
        }
        let idx = self.from_idx.len() as ActivityIdx;
        self.from_idx.push(id.to_string());
        self.to_idx.insert(id.to_string(), idx);
        Ok(idx)
    }

    /// Get the arena index for an id, if it exists.
    #[inline]
    pub fn get(&self, id: &str) -> Option<ActivityIdx> {
        self.to_idx.get(id).copied()
    }

    /// Get the id string for an arena index.
    #[inline]
    pub fn resolve(&self, idx: ActivityIdx) -> Option<&str> {
        self.from_idx.get(idx as usize).map(|s| s.as_str())
    }

    /// Number of interned ids.
    pub fn len(&self) -> usize {
        self.from_idx.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.from_idx.is_empty()
    }
}

impl Default for ActivityIdInterner {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let mut interner = ActivityIdInterner::with_capacity(10);

        let a = interner.intern_unique("act-a").unwrap();
        let b = interner.intern_unique("act-b").unwrap();

        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), Some("act-a"));
        assert_eq!(interner.resolve(b), Some("act-b"));
        assert_eq!(interner.get("act-a"), Some(a));
        assert_eq!(interner.get("missing"), None);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_duplicate_returns_existing_index() {
        let mut interner = ActivityIdInterner::default();
        let a = interner.intern_unique("act-a").unwrap();
        assert_eq!(interner.intern_unique("act-a"), Err(a));
        assert_eq!(interner.len(), 1);
    }
}
