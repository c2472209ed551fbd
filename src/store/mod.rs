//! Content storage.
//!
//! A content store maps links to resolution results. Absence of a key means
//! the link was never requested; a stored error is a per-link failure.
//! Values are type-erased and downcast on read through the typed [`Link`].

pub mod memory;

use std::any::Any;
use std::sync::Arc;

use crate::canonical::CanonicalError;
use crate::types::{Link, LinkKey, ReadResult};

/// Type-erased node value.
pub type StoredValue = Arc<dyn Any + Send + Sync>;

/// Type-erased store entry.
pub type StoreEntry = ReadResult<StoredValue>;

/// Error type for store operations.
///
/// These are logic-level failures: a caller broke the store contract.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Link holds a value of a different type than requested.
    #[error("Link {key} does not hold a {expected}")]
    TypeMismatch {
        /// Offending link.
        key: LinkKey,
        /// Requested type name.
        expected: &'static str,
    },

    /// Required link was never written.
    #[error("Link not found: {0}")]
    MissingLink(LinkKey),

    /// A factory tried to fill the link it is computing.
    #[error("Re-entrant fill of link {0}")]
    ReentrantFill(LinkKey),

    /// Base descriptor could not be turned into a link.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// Read access to stored content.
///
/// Implemented by [`ContentStore`] and by the content manager, so the
/// flattener can walk either.
pub trait ContentSource {
    /// Fetch the raw entry for a key. `None` means never written (or cleared).
    fn entry(&self, key: &LinkKey) -> Option<StoreEntry>;
}

/// Typed reads over any [`ContentSource`].
pub trait ContentSourceExt: ContentSource {
    /// Read a link. `Ok(None)` means the link was never written.
    fn read<T: Send + Sync + 'static>(
        &self,
        link: &Link<T>,
    ) -> Result<Option<ReadResult<Arc<T>>>, StoreError> {
        self.entry(link.key())
            .map(|entry| downcast_entry(link.key(), entry))
            .transpose()
    }

    /// Read a link that must exist.
    fn read_required<T: Send + Sync + 'static>(
        &self,
        link: &Link<T>,
    ) -> Result<ReadResult<Arc<T>>, StoreError> {
        self.read(link)?
            .ok_or_else(|| StoreError::MissingLink(link.key().clone()))
    }
}

impl<S: ContentSource + ?Sized> ContentSourceExt for S {}

/// Downcast a type-erased entry to the link's declared type.
pub(crate) fn downcast_entry<T: Send + Sync + 'static>(
    key: &LinkKey,
    entry: StoreEntry,
) -> Result<ReadResult<Arc<T>>, StoreError> {
    match entry {
        ReadResult::Data(value) => value
            .downcast::<T>()
            .map(ReadResult::Data)
            .map_err(|_| StoreError::TypeMismatch {
                key: key.clone(),
                expected: std::any::type_name::<T>(),
            }),
        ReadResult::Error(message) => Ok(ReadResult::Error(message)),
    }
}

pub use memory::ContentStore;
