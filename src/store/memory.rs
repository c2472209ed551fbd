//! In-memory content store with fill-once construction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::types::{Link, LinkKey, ReadResult};
use super::{ContentSource, ContentSourceExt, StoreEntry, StoreError, StoredValue};

/// In-memory content store.
///
/// Uses BTreeMap for deterministic iteration order. Entries are replaced
/// wholesale on write, never mutated in place, so anything holding an old
/// `Arc` keeps seeing the old value.
#[derive(Clone, Default)]
pub struct ContentStore {
    /// Entries by link key.
    entries: BTreeMap<LinkKey, StoreEntry>,
    /// Links whose factory is currently running.
    filling: BTreeSet<LinkKey>,
}

impl ContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: impl IntoIterator<Item = (LinkKey, StoreEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            filling: BTreeSet::new(),
        }
    }

    /// Get number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if a key has been written (data or error).
    pub fn contains(&self, key: &LinkKey) -> bool {
        self.entries.contains_key(key)
    }

    /// All written keys, in key order.
    pub fn keys(&self) -> impl Iterator<Item = &LinkKey> {
        self.entries.keys()
    }

    /// All entries, in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&LinkKey, &StoreEntry)> {
        self.entries.iter()
    }

    /// Consume the store and return its entries.
    pub fn into_entries(self) -> impl Iterator<Item = (LinkKey, StoreEntry)> {
        self.entries.into_iter()
    }

    /// Read a link. `Ok(None)` means the link was never written.
    pub fn read<T: Send + Sync + 'static>(
        &self,
        link: &Link<T>,
    ) -> Result<Option<ReadResult<Arc<T>>>, StoreError> {
        ContentSourceExt::read(self, link)
    }

    /// Read a link that must exist.
    pub fn read_required<T: Send + Sync + 'static>(
        &self,
        link: &Link<T>,
    ) -> Result<ReadResult<Arc<T>>, StoreError> {
        ContentSourceExt::read_required(self, link)
    }

    /// Write a result, replacing any prior entry.
    pub fn write<T: Send + Sync + 'static>(&mut self, link: &Link<T>, result: ReadResult<T>) {
        let entry: StoreEntry = result.map(|value| -> StoredValue { Arc::new(value) });
        self.entries.insert(link.key().clone(), entry);
    }

    /// Fill a link with the value produced by `factory`, at most once.
    ///
    /// If the link already has an entry (data or error) the factory is not
    /// run. The factory receives the store so it can fill the links it
    /// depends on (parents, replies) through this same method.
    pub fn fill_link_once<T, E, F>(&mut self, link: &Link<T>, factory: F) -> Result<Link<T>, E>
    where
        T: Send + Sync + 'static,
        E: From<StoreError>,
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        self.fill_read_once(link, |store| factory(store).map(ReadResult::Data))
    }

    /// Like [`fill_link_once`](Self::fill_link_once), but the factory may
    /// resolve the link to a per-link error.
    ///
    /// A factory that fills its own link (directly or through a longer
    /// cycle) fails with [`StoreError::ReentrantFill`]. A factory that
    /// returns `Err` leaves the link unwritten.
    pub fn fill_read_once<T, E, F>(&mut self, link: &Link<T>, factory: F) -> Result<Link<T>, E>
    where
        T: Send + Sync + 'static,
        E: From<StoreError>,
        F: FnOnce(&mut Self) -> Result<ReadResult<T>, E>,
    {
        let key = link.key();
        if self.entries.contains_key(key) {
            tracing::trace!(link = %key, "fill skipped, link already resolved");
            return Ok(link.clone());
        }
        if !self.filling.insert(key.clone()) {
            return Err(StoreError::ReentrantFill(key.clone()).into());
        }

        let result = factory(self);
        self.filling.remove(key);
        let result = result?;

        tracing::debug!(link = %key, is_error = result.is_error(), "filled link");
        self.write(link, result);
        Ok(link.clone())
    }
}

impl ContentSource for ContentStore {
    fn entry(&self, key: &LinkKey) -> Option<StoreEntry> {
        self.entries.get(key).cloned()
    }
}

impl fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, entry)| {
                let state = match entry {
                    ReadResult::Data(_) => "data",
                    ReadResult::Error(_) => "error",
                };
                (key.to_string(), state)
            }))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    struct Node {
        name: &'static str,
        parent: Option<Link<Node>>,
    }

    #[test]
    fn test_read_absent_vs_error() {
        let mut store = ContentStore::new();
        let missing: Link<u32> = Link::named("missing");
        let failed: Link<u32> = Link::named("failed");

        store.write(&failed, ReadResult::error("fetch failed"));

        assert!(store.read(&missing).unwrap().is_none());
        assert_eq!(
            store.read(&failed).unwrap().unwrap().error_message(),
            Some("fetch failed")
        );
        assert!(matches!(
            store.read_required(&missing),
            Err(StoreError::MissingLink(_))
        ));
    }

    #[test]
    fn test_write_replaces_entry() {
        let mut store = ContentStore::new();
        let link: Link<u32> = Link::named("n");

        store.write(&link, ReadResult::Data(1));
        let before = store.read_required(&link).unwrap();
        store.write(&link, ReadResult::Data(2));
        let after = store.read_required(&link).unwrap();

        assert_eq!(**before.data().unwrap(), 1);
        assert_eq!(**after.data().unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fill_once_runs_factory_once() {
        let mut store = ContentStore::new();
        let link: Link<u32> = Link::named("n");
        let calls = Cell::new(0);

        for _ in 0..3 {
            let got = store
                .fill_link_once(&link, |_| -> Result<u32, StoreError> {
                    calls.set(calls.get() + 1);
                    Ok(7)
                })
                .unwrap();
            assert_eq!(got, link);
        }

        assert_eq!(calls.get(), 1);
        assert_eq!(**store.read_required(&link).unwrap().data().unwrap(), 7);
    }

    #[test]
    fn test_fill_does_not_overwrite_error() {
        let mut store = ContentStore::new();
        let link: Link<u32> = Link::named("n");
        store.write(&link, ReadResult::error("gone"));

        store
            .fill_link_once(&link, |_| -> Result<u32, StoreError> { Ok(1) })
            .unwrap();

        assert!(store.read_required(&link).unwrap().is_error());
    }

    #[test]
    fn test_shared_parent_filled_once() {
        let mut store = ContentStore::new();
        let community: Link<Node> = Link::named("community");
        let parent_builds = Cell::new(0);

        let fill_child = |store: &mut ContentStore, name: &'static str| {
            let child: Link<Node> = Link::named(name);
            store
                .fill_link_once(&child, |store| -> Result<Node, StoreError> {
                    let parent = store.fill_link_once(&community, |_| -> Result<Node, StoreError> {
                        parent_builds.set(parent_builds.get() + 1);
                        Ok(Node { name: "community", parent: None })
                    })?;
                    Ok(Node { name, parent: Some(parent) })
                })
                .unwrap()
        };

        let a = fill_child(&mut store, "a");
        let b = fill_child(&mut store, "b");

        assert_eq!(parent_builds.get(), 1);
        let a = store.read_required(&a).unwrap();
        let b = store.read_required(&b).unwrap();
        assert_eq!(a.data().unwrap().parent, b.data().unwrap().parent);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_reentrant_fill_is_rejected() {
        let mut store = ContentStore::new();
        let link: Link<u32> = Link::named("loop");

        let result = store.fill_link_once(&link, |store| -> Result<u32, StoreError> {
            store.fill_link_once(&link, |_| -> Result<u32, StoreError> { Ok(1) })?;
            Ok(2)
        });

        assert!(matches!(result, Err(StoreError::ReentrantFill(_))));
        assert!(!store.contains(link.key()));

        // The link is fillable again once the failed pass is over.
        store
            .fill_link_once(&link, |_| -> Result<u32, StoreError> { Ok(3) })
            .unwrap();
        assert_eq!(**store.read_required(&link).unwrap().data().unwrap(), 3);
    }

    #[test]
    fn test_type_mismatch() {
        let mut store = ContentStore::new();
        let as_u32: Link<u32> = Link::named("n");
        let as_string: Link<String> = Link::named("n");
        store.write(&as_u32, ReadResult::Data(1));

        assert!(matches!(
            store.read(&as_string),
            Err(StoreError::TypeMismatch { .. })
        ));
    }
}
