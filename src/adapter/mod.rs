//! Backend adapter contract.
//!
//! An adapter turns a backend's data into store fragments. The core never
//! parses backend responses; it only relies on this contract:
//!
//! | Call | Returns | Merged with |
//! |------|---------|-------------|
//! | [`Adapter::get_page`] | fragment + pivot link | [`ContentManager::set_data`] |
//! | [`Adapter::loader`] | fragment | [`ContentManager::add_data_fenced`] |
//! | [`Adapter::act`] | fragment | [`ContentManager::add_data_fenced`] |
//!
//! Loader and action tokens must be handed back to the adapter whose codec
//! produced them. [`AdapterRegistry`] dispatches on the node's `client_id`,
//! and the adapter's codec rejects anything it did not issue.

pub mod builder;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::canonical::CanonicalError;
use crate::manager::{BatchReport, ContentManager};
use crate::store::{ContentStore, StoreError};
use crate::types::{ActionKind, LoaderKind, Opaque, PostLink, PostNode, TokenError};

pub use builder::{BaseDescriptor, GraphBuilder};
pub use memory::{ForumBase, InMemoryForum};

/// Error type for adapter operations.
///
/// All variants are logic-tier: per-link fetch failures are stored as
/// `ReadResult::Error` inside the fragment instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// Token could not be decoded (wrong adapter, tampered, malformed).
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Store contract violation while building a fragment.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Base descriptor could not be encoded.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// Locator does not name anything this adapter serves.
    #[error("Unknown locator: {0}")]
    UnknownLocator(String),

    /// Base descriptor kind not handled at this position.
    #[error("Unsupported base descriptor: {0}")]
    UnsupportedBase(String),

    /// No adapter registered under this client id.
    #[error("Unknown client: {0}")]
    UnknownClient(String),

    /// Action requires user input that was not supplied.
    #[error("Action {0} requires input")]
    MissingInput(&'static str),
}

/// Result of loading a page.
#[derive(Debug, Clone)]
pub struct PageFragment {
    /// Content needed to render the page.
    pub content: ContentStore,
    /// Focused post.
    pub pivot: PostLink,
}

/// Result of a loader or action.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    /// Content to merge.
    pub content: ContentStore,
}

/// A backend adapter.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Identifier stamped on every node this adapter builds.
    fn client_id(&self) -> &str;

    /// Load the page at `locator`.
    async fn get_page(&self, locator: &str) -> Result<PageFragment, AdapterError>;

    /// Resolve a loader token issued by this adapter.
    async fn loader(&self, token: &Opaque<LoaderKind>) -> Result<Fragment, AdapterError>;

    /// Perform a mutation issued by this adapter. `input` carries user text
    /// for actions that need it (replies).
    async fn act(
        &self,
        action: &Opaque<ActionKind>,
        input: Option<String>,
    ) -> Result<Fragment, AdapterError>;
}

/// Adapters by client id.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its client id, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        let client_id = adapter.client_id().to_string();
        if self.adapters.insert(client_id.clone(), adapter).is_some() {
            tracing::warn!(client_id = %client_id, "replaced registered adapter");
        }
    }

    /// Look up an adapter.
    pub fn get(&self, client_id: &str) -> Result<&Arc<dyn Adapter>, AdapterError> {
        self.adapters
            .get(client_id)
            .ok_or_else(|| AdapterError::UnknownClient(client_id.to_string()))
    }

    /// Registered client ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Get the number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Load a page and make it the manager's content.
    pub async fn open_page(
        &self,
        client_id: &str,
        locator: &str,
        manager: &ContentManager,
    ) -> Result<PostLink, AdapterError> {
        let page = self.get(client_id)?.get_page(locator).await?;
        let report = manager.set_data(page.content);
        tracing::info!(
            client_id = %client_id,
            locator = %locator,
            pivot = %page.pivot,
            written = report.written,
            cleared = report.cleared,
            "opened page"
        );
        Ok(page.pivot)
    }

    /// Issue the loader carried by `node` and merge its fragment.
    ///
    /// The fetch is fenced, so a response that loses the race to a newer
    /// fetch does not overwrite fresher links.
    pub async fn issue_loader(
        &self,
        node: &PostNode,
        manager: &ContentManager,
    ) -> Result<BatchReport, AdapterError> {
        let loader = node
            .as_loader()
            .ok_or_else(|| AdapterError::UnsupportedBase("post node is not a loader".to_string()))?;

        let ticket = manager.begin_fetch();
        let fragment = self.get(&loader.client_id)?.loader(&loader.token).await?;
        let report = manager.add_data_fenced(ticket, fragment.content);
        tracing::info!(
            client_id = %loader.client_id,
            ticket = ticket.as_u64(),
            written = report.written,
            skipped_stale = report.skipped_stale,
            "merged loader fragment"
        );
        Ok(report)
    }

    /// Perform an action and merge its fragment.
    pub async fn issue_action(
        &self,
        client_id: &str,
        action: &Opaque<ActionKind>,
        input: Option<String>,
        manager: &ContentManager,
    ) -> Result<BatchReport, AdapterError> {
        let ticket = manager.begin_fetch();
        let fragment = self.get(client_id)?.act(action, input).await?;
        let report = manager.add_data_fenced(ticket, fragment.content);
        tracing::info!(
            client_id = %client_id,
            ticket = ticket.as_u64(),
            written = report.written,
            "merged action fragment"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("clients", &self.list())
            .finish()
    }
}
