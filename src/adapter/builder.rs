//! Graph construction helpers shared by adapters.
//!
//! Adapters describe backend objects with a base descriptor (a small,
//! serializable, closed enum). The descriptor's canonical JSON is the link
//! key, so two code paths that reach the same backend object reach the same
//! link, and [`GraphBuilder::fill`] builds it at most once per fragment.

use serde::Serialize;

use super::AdapterError;
use crate::canonical::CanonicalError;
use crate::store::ContentStore;
use crate::types::{
    Link, LoaderData, LoaderKind, Opaque, PostContent, PostData, PostLink, PostNode, ReadResult,
    Replies,
};

/// Adapter-private identity of a backend object.
pub trait BaseDescriptor: Serialize {
    /// Discriminator, used in diagnostics.
    fn kind(&self) -> &'static str;

    /// Deterministic link for this descriptor.
    fn link(&self) -> Result<PostLink, CanonicalError> {
        Link::from_base(self)
    }
}

/// Builds one fragment for one adapter.
pub struct GraphBuilder<'s> {
    store: &'s mut ContentStore,
    client_id: String,
}

impl<'s> GraphBuilder<'s> {
    /// Build into `store`, stamping nodes with `client_id`.
    pub fn new(store: &'s mut ContentStore, client_id: impl Into<String>) -> Self {
        Self {
            store,
            client_id: client_id.into(),
        }
    }

    /// Client id stamped on built nodes.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The store being filled.
    pub fn store(&self) -> &ContentStore {
        self.store
    }

    /// Fill the node for `base` at most once.
    ///
    /// The factory receives a builder over the same store, so it can fill
    /// the nodes it depends on. Returns the base's link either way.
    pub fn fill<B, F>(&mut self, base: &B, factory: F) -> Result<PostLink, AdapterError>
    where
        B: BaseDescriptor + ?Sized,
        F: FnOnce(&mut GraphBuilder<'_>) -> Result<ReadResult<PostNode>, AdapterError>,
    {
        let link = base.link()?;
        let client_id = &self.client_id;
        self.store.fill_read_once(&link, |store| {
            let mut nested = GraphBuilder {
                store,
                client_id: client_id.clone(),
            };
            factory(&mut nested)
        })
    }

    /// Resolve `base` to a per-link error, unless already filled.
    pub fn fill_error<B>(&mut self, base: &B, message: impl Into<String>) -> Result<PostLink, AdapterError>
    where
        B: BaseDescriptor + ?Sized,
    {
        let message = message.into();
        self.fill(base, |_| Ok(ReadResult::error(message)))
    }

    /// Build a post node owned by this builder's client.
    pub fn post(
        &self,
        url: Option<String>,
        parent: Option<PostLink>,
        replies: Option<Replies>,
        content: PostContent,
    ) -> PostNode {
        PostNode::Post(PostData {
            url,
            client_id: self.client_id.clone(),
            parent,
            replies,
            content,
        })
    }

    /// Write a loader node under a fresh symbol link.
    pub fn loader(
        &mut self,
        parent: Option<PostLink>,
        load_count: Option<u32>,
        token: Opaque<LoaderKind>,
    ) -> PostLink {
        let link = Link::symbol();
        let node = PostNode::Loader(LoaderData {
            client_id: self.client_id.clone(),
            parent,
            load_count,
            token,
        });
        self.store.write(&link, ReadResult::Data(node));
        link
    }
}

impl std::fmt::Debug for GraphBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("client_id", &self.client_id)
            .field("entries", &self.store.len())
            .finish()
    }
}
