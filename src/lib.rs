//! # content-graph
//!
//! Link-addressed content graph for discussion trees.
//!
//! Backend adapters describe posts, comments and pages as nodes addressed by
//! links. The graph answers one question:
//!
//! > Given a pivot post, in what order and at what depth is everything below
//! > it rendered?
//!
//! ## Core Contract
//!
//! 1. Adapters build store fragments with fill-once construction, so every
//!    link is computed at most once per fragment
//! 2. Fragments are merged into a long-lived, reactive [`ContentManager`]
//! 3. The [`Flattener`] walks the graph depth-first from a pivot and emits an
//!    ordered, indentation-aware render list
//! 4. Loader and action tokens are branded per adapter, so a token can only
//!    be decoded by the adapter that issued it
//!
//! ## Architecture
//!
//! ```text
//! Adapter ──fill_link_once──▶ ContentStore fragment ──set_data/add_data──▶ ContentManager
//!    ▲                                                                          │
//!    │ Opaque<loader> / Opaque<action>                                          ▼
//!    └───────────────────────────── renderer ◀── Vec<FlatItem> ◀── Flattener (pivot)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same pivot + same content + same collapse states → identical item list
//! - Reply ordering is exactly the stored order
//! - Indent identities depend only on the path from the pivot

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod store;
pub mod manager;
pub mod flatten;
pub mod adapter;
pub mod canonical;
pub mod config;
pub mod telemetry;

// Re-exports
pub use types::{
    Link, LinkKey, ReadResult, PostLink, PostNode, PostData, LoaderData, PostContent, PostBody,
    Replies, ReplyAffordance, Author, Collapsible, ActionButton,
    Opaque, OpaqueCodec, TokenKind, LoaderKind, ActionKind, CodecMarker, TokenError,
};
pub use store::{ContentSource, ContentSourceExt, ContentStore, StoreEntry, StoreError, StoredValue};
pub use manager::{BatchReport, ContentManager, FetchTicket, ManagerView, Subscription};
pub use flatten::{
    CollapseStates, FlatItem, FlattenError, FlattenOptions, Flattener, IndentId, IndentMarker,
    Page, Placeholder, flatten_fingerprint,
};
pub use adapter::{
    Adapter, AdapterError, AdapterRegistry, BaseDescriptor, ForumBase, Fragment, GraphBuilder,
    InMemoryForum, PageFragment,
};
pub use canonical::{to_canonical_bytes, to_canonical_string, canonical_hash, canonical_hash_hex, CanonicalError};
pub use config::{GraphConfig, LogFormat, ManagerConfig};
pub use telemetry::init_tracing;

/// Schema version for serialized render lists and tokens.
/// Increment on breaking changes to any serialized type.
pub const CONTENT_GRAPH_SCHEMA_VERSION: &str = "1.0.0";
