//! Reactive content manager.
//!
//! The manager holds one cell per link and accepts store fragments produced
//! by adapters:
//!
//! | Entry point | Semantics | Used for |
//! |-------------|-----------|----------|
//! | [`ContentManager::set_data`] | full replace: tracked links missing from the fragment are cleared | loading a new page |
//! | [`ContentManager::add_data`] | incremental merge: only keys in the fragment are written | loader and action responses |
//! | [`ContentManager::add_data_fenced`] | merge that skips links written by a newer fetch | responses that may arrive out of order |
//!
//! ## Batch Guarantees
//!
//! - All writes of one call happen under a single write lock, so readers see
//!   the state before or after the batch, never in between.
//! - Subscribers run after the batch is committed and the lock is released.
//!   A callback may read any other link and observes the whole batch.
//! - Each subscriber is called at most once per batch.
//!
//! ## Locking
//!
//! [`ContentManager::view`], [`ContentManager::subscribe`] and the other
//! readers never wait on a [`ManagerView`] held by the same thread. Batches
//! do: drop the view before calling `set_data`/`add_data`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::config::ManagerConfig;
use crate::store::{downcast_entry, ContentSource, ContentStore, StoreEntry, StoreError};
use crate::types::{Link, LinkKey, ReadResult};

type Callback = Arc<dyn Fn(Option<&StoreEntry>) + Send + Sync>;

/// Identifies one fetch for stale-response fencing.
///
/// Tickets are issued in increasing order; a higher ticket is a newer fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

impl FetchTicket {
    /// Raw ticket number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Summary of one applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    /// Sequence number of the batch (1-based).
    pub batch: u64,
    /// Links written with a new value.
    pub written: usize,
    /// Links cleared by a full replace.
    pub cleared: usize,
    /// Links skipped because a newer fetch already wrote them.
    pub skipped_stale: usize,
}

#[derive(Debug, Clone, Copy)]
enum MergeMode {
    Replace,
    Merge,
    Fenced(FetchTicket),
}

/// One link's cell.
#[derive(Default)]
struct Cell {
    /// Current value. `None` means cleared or never written.
    value: Option<StoreEntry>,
    /// Bumped on every change.
    version: u64,
    /// Ticket of the fetch that last wrote the cell.
    written_by: u64,
}

#[derive(Default)]
struct CellTable {
    cells: BTreeMap<LinkKey, Cell>,
    batches: u64,
}

#[derive(Default)]
struct SubscriberTable {
    next_id: u64,
    by_key: BTreeMap<LinkKey, Vec<(u64, Callback)>>,
}

/// Long-lived holder of reactive per-link cells.
///
/// Cells are created on first access and kept for the manager's lifetime.
pub struct ContentManager {
    config: ManagerConfig,
    table: RwLock<CellTable>,
    /// Links accessed before their cell exists; moved into the table by the
    /// next batch.
    requested: Mutex<BTreeSet<LinkKey>>,
    subscribers: Arc<Mutex<SubscriberTable>>,
    next_ticket: AtomicU64,
}

impl ContentManager {
    /// Create a new empty manager.
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            table: RwLock::new(CellTable::default()),
            requested: Mutex::new(BTreeSet::new()),
            subscribers: Arc::new(Mutex::new(SubscriberTable::default())),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Issue a ticket for a fetch about to start.
    pub fn begin_fetch(&self) -> FetchTicket {
        FetchTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst))
    }

    /// Replace the tracked content with `fragment`.
    ///
    /// Tracked links absent from the fragment are cleared to `None`.
    pub fn set_data(&self, fragment: ContentStore) -> BatchReport {
        self.apply(fragment, MergeMode::Replace)
    }

    /// Merge `fragment` into the tracked content.
    ///
    /// Links absent from the fragment are left untouched.
    pub fn add_data(&self, fragment: ContentStore) -> BatchReport {
        self.apply(fragment, MergeMode::Merge)
    }

    /// Merge a fragment fetched under `ticket`.
    ///
    /// With fencing enabled, links that a newer fetch (or any later
    /// `set_data`/`add_data`) already wrote keep their value. With fencing
    /// disabled this behaves like [`add_data`](Self::add_data).
    pub fn add_data_fenced(&self, ticket: FetchTicket, fragment: ContentStore) -> BatchReport {
        self.apply(fragment, MergeMode::Fenced(ticket))
    }

    /// Current value of a link.
    ///
    /// `Ok(None)` means the link was never written or has been cleared.
    pub fn view<T: Send + Sync + 'static>(
        &self,
        link: &Link<T>,
    ) -> Result<Option<ReadResult<Arc<T>>>, StoreError> {
        let existing = self
            .table
            .read_recursive()
            .cells
            .get(link.key())
            .map(|cell| cell.value.clone());

        let value = match existing {
            Some(value) => value,
            None => {
                self.track(link.key());
                None
            }
        };

        value.map(|entry| downcast_entry(link.key(), entry)).transpose()
    }

    /// Change counter of a link's cell (0 if untracked).
    pub fn version(&self, key: &LinkKey) -> u64 {
        self.table.read_recursive().cells.get(key).map(|cell| cell.version).unwrap_or(0)
    }

    /// Number of tracked cells.
    pub fn tracked_len(&self) -> usize {
        let table = self.table.read_recursive();
        let requested = self.requested.lock();
        table.cells.len() + requested.iter().filter(|key| !table.cells.contains_key(*key)).count()
    }

    fn track(&self, key: &LinkKey) {
        self.requested.lock().insert(key.clone());
    }

    /// Lock the cells for a consistent multi-link read.
    ///
    /// Batches wait until the view is dropped. Flatten through a view so the
    /// whole walk sees one state.
    pub fn read_view(&self) -> ManagerView<'_> {
        ManagerView {
            table: self.table.read(),
        }
    }

    /// Copy every non-cleared cell into a standalone store.
    pub fn snapshot(&self) -> ContentStore {
        let table = self.table.read_recursive();
        ContentStore::from_entries(
            table
                .cells
                .iter()
                .filter_map(|(key, cell)| cell.value.clone().map(|value| (key.clone(), value))),
        )
    }

    /// Call `callback` after every batch that touches `link`.
    ///
    /// The callback receives the link's new value, downcast to `T`. It stops
    /// being called once the returned [`Subscription`] is dropped.
    pub fn subscribe<T, F>(&self, link: &Link<T>, callback: F) -> Subscription
    where
        T: Send + Sync + 'static,
        F: Fn(Result<Option<ReadResult<Arc<T>>>, StoreError>) + Send + Sync + 'static,
    {
        self.track(link.key());

        let key = link.key().clone();
        let typed_key = key.clone();
        let wrapped: Callback = Arc::new(move |entry: Option<&StoreEntry>| {
            let typed = entry
                .cloned()
                .map(|entry| downcast_entry::<T>(&typed_key, entry))
                .transpose();
            callback(typed);
        });

        let mut subscribers = self.subscribers.lock();
        subscribers.next_id += 1;
        let id = subscribers.next_id;
        subscribers.by_key.entry(key.clone()).or_default().push((id, wrapped));

        Subscription {
            key,
            id,
            table: Arc::downgrade(&self.subscribers),
        }
    }

    fn apply(&self, fragment: ContentStore, mode: MergeMode) -> BatchReport {
        let (ticket, fence) = match mode {
            MergeMode::Fenced(ticket) => (ticket.0, self.config.fence_stale_fetches),
            MergeMode::Replace | MergeMode::Merge => (self.begin_fetch().0, false),
        };

        let mut report = BatchReport::default();
        let mut changed: Vec<(LinkKey, Option<StoreEntry>)> = Vec::new();

        {
            let mut guard = self.table.write();
            let table = &mut *guard;
            table.batches += 1;
            report.batch = table.batches;

            for key in std::mem::take(&mut *self.requested.lock()) {
                table.cells.entry(key).or_default();
            }

            let incoming: BTreeMap<LinkKey, StoreEntry> = fragment.into_entries().collect();

            if let MergeMode::Replace = mode {
                for (key, cell) in table.cells.iter_mut() {
                    if incoming.contains_key(key) || cell.value.is_none() {
                        continue;
                    }
                    cell.value = None;
                    cell.version += 1;
                    cell.written_by = cell.written_by.max(ticket);
                    changed.push((key.clone(), None));
                    report.cleared += 1;
                }
            }

            for (key, entry) in incoming {
                let cell = table.cells.entry(key.clone()).or_default();
                if fence && cell.written_by > ticket {
                    report.skipped_stale += 1;
                    continue;
                }
                cell.value = Some(entry.clone());
                cell.version += 1;
                cell.written_by = cell.written_by.max(ticket);
                changed.push((key, Some(entry)));
                report.written += 1;
            }
        }

        if report.skipped_stale > 0 {
            tracing::warn!(
                batch = report.batch,
                ticket,
                skipped = report.skipped_stale,
                "Dropped stale links from superseded fetch"
            );
        }
        tracing::debug!(
            batch = report.batch,
            mode = ?mode,
            written = report.written,
            cleared = report.cleared,
            "Applied content batch"
        );

        self.notify(&changed);
        report
    }

    fn notify(&self, changed: &[(LinkKey, Option<StoreEntry>)]) {
        if changed.is_empty() {
            return;
        }

        // Collect under the lock, call outside it: callbacks may subscribe,
        // unsubscribe or read the manager.
        let pending: Vec<(Callback, Option<StoreEntry>)> = {
            let subscribers = self.subscribers.lock();
            changed
                .iter()
                .flat_map(|(key, value)| {
                    subscribers
                        .by_key
                        .get(key)
                        .into_iter()
                        .flatten()
                        .map(move |(_, callback)| (Arc::clone(callback), value.clone()))
                })
                .collect()
        };

        for (callback, value) in pending {
            callback(value.as_ref());
        }
    }
}

impl Default for ContentManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl ContentSource for ContentManager {
    fn entry(&self, key: &LinkKey) -> Option<StoreEntry> {
        self.table.read_recursive().cells.get(key).and_then(|cell| cell.value.clone())
    }
}

/// Read-locked view over the manager's cells.
pub struct ManagerView<'a> {
    table: RwLockReadGuard<'a, CellTable>,
}

impl ContentSource for ManagerView<'_> {
    fn entry(&self, key: &LinkKey) -> Option<StoreEntry> {
        self.table.cells.get(key).and_then(|cell| cell.value.clone())
    }
}

/// Handle that keeps a subscription alive. Dropping it unsubscribes.
pub struct Subscription {
    key: LinkKey,
    id: u64,
    table: Weak<Mutex<SubscriberTable>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut table = table.lock();
        if let Some(list) = table.by_key.get_mut(&self.key) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                table.by_key.remove(&self.key);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
