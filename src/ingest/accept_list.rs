//! Bounded allow-list of sources

use tracing::info;

use super::SourceId;

/// Maximum number of listed sources
pub const MAX_ACCEPT_LIST_SOURCES: usize = 10;

/// Result of adding a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Added,
    AlreadyPresent,
    Full,
}

/// Sources allowed through ingestion
#[derive(Debug, Clone, Default)]
pub struct AcceptList {
    sources: Vec<SourceId>,
}

impl AcceptList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of sources, ignoring entries beyond capacity
    pub fn from_sources<I: IntoIterator<Item = SourceId>>(sources: I) -> Self {
        let mut list = Self::new();
        for source in sources {
            list.add(source);
        }
        list
    }

    pub fn add(&mut self, source: SourceId) -> AcceptOutcome {
        if self.contains(&source) {
            info!("Source {} already in accept list", source);
            return AcceptOutcome::AlreadyPresent;
        }
        if self.sources.len() >= MAX_ACCEPT_LIST_SOURCES {
            info!("Accept list full, {} not added", source);
            return AcceptOutcome::Full;
        }

        self.sources.push(source);
        info!("Added source {} to accept list", source);
        AcceptOutcome::Added
    }

    /// Returns `true` if the source was listed
    pub fn remove(&mut self, source: &SourceId) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s != source);
        let removed = self.sources.len() != before;
        if removed {
            info!("Removed source {} from accept list", source);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        info!("Cleared accept list");
    }

    pub fn contains(&self, source: &SourceId) -> bool {
        self.sources.contains(source)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceId> {
        self.sources.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(n: u8) -> SourceId {
        SourceId::random([0xF0, 0, 0, 0, 0, n])
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut list = AcceptList::new();
        assert_eq!(list.add(source(1)), AcceptOutcome::Added);
        assert_eq!(list.add(source(1)), AcceptOutcome::AlreadyPresent);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_address_type_distinguishes_sources() {
        let mut list = AcceptList::new();
        list.add(SourceId::public([1, 2, 3, 4, 5, 6]));
        assert!(!list.contains(&SourceId::random([1, 2, 3, 4, 5, 6])));
    }

    #[test]
    fn test_capacity() {
        let mut list = AcceptList::from_sources((0..MAX_ACCEPT_LIST_SOURCES as u8).map(source));
        assert_eq!(list.len(), MAX_ACCEPT_LIST_SOURCES);
        assert_eq!(list.add(source(200)), AcceptOutcome::Full);
        assert!(!list.contains(&source(200)));

        // Freeing a slot allows a new source
        assert!(list.remove(&source(0)));
        assert_eq!(list.add(source(200)), AcceptOutcome::Added);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut list = AcceptList::from_sources([source(1), source(2)]);
        assert!(list.remove(&source(1)));
        assert!(!list.remove(&source(1)));
        assert!(list.contains(&source(2)));

        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.iter().count(), 0);
    }
}
