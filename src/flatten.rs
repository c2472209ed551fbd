//! Render-list flattening.
//!
//! The flattener walks the graph depth-first from a pivot post and produces
//! the ordered list of items a renderer consumes.
//!
//! ## Algorithm
//!
//! 1. Resolve the pivot. A pivot error fails the whole flatten.
//! 2. Emit the above-pivot placeholder, then the pivot itself.
//! 3. If the pivot's replies are known: emit `horizontal_line`, the compose
//!    placeholder when replying is allowed, then one `wrapper_start` /
//!    subtree / `wrapper_end` group per reply (or a single `no_replies`
//!    placeholder when the list is empty).
//! 4. A subtree emits its post, then, unless the post is collapsed, each
//!    reply's subtree one indent level deeper.
//!
//! Failed reply links become inline `error` items at the position the reply
//! would have taken. Ordering is exactly the stored `items` order. There is
//! no cycle detection: adapters must hand over acyclic reply graphs.
//!
//! ## Determinism
//!
//! Same pivot + same content + same collapse states → identical item list.
//! Indent identities are derived from the path of links from the pivot, so
//! they are stable across runs and usable as keys for collapse state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Arc;
use xxhash_rust::xxh64::Xxh64;

use crate::canonical::{canonical_hash_hex, CanonicalError};
use crate::store::{ContentSource, ContentSourceExt, StoreError};
use crate::types::{LinkKey, PostLink, PostNode, ReadResult, ReplyAffordance};

/// Error type for flatten operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlattenError {
    /// The pivot resolved to a per-link error.
    #[error("Pivot {key} failed to load: {message}")]
    PivotFailed {
        /// Pivot link.
        key: LinkKey,
        /// Stored error message.
        message: String,
    },

    /// The pivot is a loader, not a post.
    #[error("Pivot {0} is not a post")]
    UnsupportedPivot(LinkKey),

    /// Store contract violation (missing link, wrong type).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Identity of one position in the flattened tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndentId(u64);

impl IndentId {
    /// Identity of `link` at sibling position `index` under `parent`
    /// (`None` for pivot replies).
    ///
    /// The position is part of the identity, so a link repeated in one
    /// replies list gets a distinct id for each occurrence.
    pub fn child_of(parent: Option<IndentId>, index: usize, link: &LinkKey) -> Self {
        let mut hasher = Xxh64::new(0);
        match parent {
            Some(IndentId(id)) => hasher.write(&id.to_le_bytes()),
            None => hasher.write(b"root"),
        }
        hasher.write(b"/");
        hasher.write(&(index as u64).to_le_bytes());
        hasher.write(b"/");
        link.hash_into(&mut hasher);
        Self(hasher.finish())
    }

    /// Raw hash value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for IndentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One level of nesting in a flattened item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndentMarker {
    /// Position identity, used as the collapse-state key.
    pub id: IndentId,
    /// Link that opened this level.
    pub link: LinkKey,
}

/// Collapse overrides keyed by indent identity.
pub type CollapseStates = BTreeMap<IndentId, bool>;

/// Placeholder kinds emitted as `todo` items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "placeholder", rename_all = "snake_case")]
pub enum Placeholder {
    /// Stands in for the posts above the pivot. How ancestors render is
    /// left to the embedding application.
    AncestorsOfPivot {
        /// The pivot link.
        pivot: LinkKey,
    },
    /// Reply composer for the pivot.
    ComposeReply {
        /// Reply permission and token.
        affordance: ReplyAffordance,
    },
    /// The pivot's replies are known and empty.
    NoReplies,
}

/// One render instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlatItem {
    /// A post. Always emitted, collapsed or not.
    Post {
        /// Link of the post.
        link: LinkKey,
        /// The post node.
        node: Arc<PostNode>,
        /// Whether the post's descendants are hidden.
        collapsed: bool,
        /// Nesting, outermost first. Empty for the pivot.
        indent: Vec<IndentMarker>,
    },
    /// Start of one top-level reply group.
    WrapperStart,
    /// End of one top-level reply group.
    WrapperEnd,
    /// Separator between the pivot and its replies.
    HorizontalLine,
    /// Placeholder for content not rendered by the core.
    Todo {
        /// What the placeholder stands for.
        note: Placeholder,
    },
    /// A reply that failed to load.
    Error {
        /// Failed link.
        link: LinkKey,
        /// Stored error message.
        message: String,
        /// Nesting of the position the reply would have taken.
        indent: Vec<IndentMarker>,
    },
    /// A loader standing in for more replies.
    Loader {
        /// Link of the loader node.
        link: LinkKey,
        /// The loader node.
        node: Arc<PostNode>,
        /// Nesting of the loader.
        indent: Vec<IndentMarker>,
    },
}

impl FlatItem {
    /// Nesting depth for rendering.
    pub fn depth(&self) -> usize {
        match self {
            Self::Post { indent, .. } | Self::Error { indent, .. } | Self::Loader { indent, .. } => indent.len(),
            Self::WrapperStart | Self::WrapperEnd | Self::HorizontalLine | Self::Todo { .. } => 0,
        }
    }

    /// Link this item renders, if any.
    pub fn link(&self) -> Option<&LinkKey> {
        match self {
            Self::Post { link, .. } | Self::Error { link, .. } | Self::Loader { link, .. } => Some(link),
            Self::WrapperStart | Self::WrapperEnd | Self::HorizontalLine | Self::Todo { .. } => None,
        }
    }
}

/// Flatten-time settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenOptions {
    /// Emit the above-pivot placeholder.
    pub show_ancestor_placeholder: bool,
    /// Emit the pivot's own post item.
    pub emit_pivot: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            show_ancestor_placeholder: true,
            emit_pivot: true,
        }
    }
}

/// A page: pivot plus the content it was loaded with.
#[derive(Debug, Clone)]
pub struct Page<S> {
    /// Focused post.
    pub pivot: PostLink,
    /// Content to walk.
    pub content: S,
}

/// Depth-first render-list builder.
#[derive(Debug, Clone, Default)]
pub struct Flattener {
    options: FlattenOptions,
}

impl Flattener {
    /// Create a flattener.
    pub fn new(options: FlattenOptions) -> Self {
        Self { options }
    }

    /// Get the options.
    pub fn options(&self) -> &FlattenOptions {
        &self.options
    }

    /// Flatten a page.
    pub fn flatten_page<S: ContentSource>(
        &self,
        page: &Page<S>,
        collapse: &CollapseStates,
    ) -> Result<Vec<FlatItem>, FlattenError> {
        self.flatten(&page.pivot, &page.content, collapse)
    }

    /// Flatten the graph below `pivot`.
    pub fn flatten<S: ContentSource + ?Sized>(
        &self,
        pivot: &PostLink,
        content: &S,
        collapse: &CollapseStates,
    ) -> Result<Vec<FlatItem>, FlattenError> {
        let pivot_key = pivot.key().clone();
        let node = match content.read_required(pivot)? {
            ReadResult::Data(node) => node,
            ReadResult::Error(message) => {
                return Err(FlattenError::PivotFailed { key: pivot_key, message });
            }
        };
        let Some(post) = node.as_post() else {
            return Err(FlattenError::UnsupportedPivot(pivot_key));
        };

        let mut out = Vec::new();

        if self.options.show_ancestor_placeholder {
            out.push(FlatItem::Todo {
                note: Placeholder::AncestorsOfPivot { pivot: pivot_key.clone() },
            });
        }
        if self.options.emit_pivot {
            out.push(FlatItem::Post {
                link: pivot_key.clone(),
                node: Arc::clone(&node),
                collapsed: false,
                indent: Vec::new(),
            });
        }

        if let Some(replies) = &post.replies {
            out.push(FlatItem::HorizontalLine);
            if let Some(affordance) = &replies.reply {
                out.push(FlatItem::Todo {
                    note: Placeholder::ComposeReply { affordance: affordance.clone() },
                });
            }
            if replies.items.is_empty() {
                out.push(FlatItem::Todo { note: Placeholder::NoReplies });
            }
            for (index, reply) in replies.items.iter().enumerate() {
                out.push(FlatItem::WrapperStart);
                self.flatten_reply(content, reply, index, &[], collapse, &mut out)?;
                out.push(FlatItem::WrapperEnd);
            }
        }

        tracing::trace!(pivot = %pivot_key, items = out.len(), "flattened page");
        Ok(out)
    }

    fn flatten_reply<S: ContentSource + ?Sized>(
        &self,
        content: &S,
        link: &PostLink,
        index: usize,
        parent_indent: &[IndentMarker],
        collapse: &CollapseStates,
        out: &mut Vec<FlatItem>,
    ) -> Result<(), FlattenError> {
        match content.read_required(link)? {
            ReadResult::Error(message) => {
                out.push(FlatItem::Error {
                    link: link.key().clone(),
                    message,
                    indent: parent_indent.to_vec(),
                });
                Ok(())
            }
            ReadResult::Data(node) => {
                let marker = IndentMarker {
                    id: IndentId::child_of(parent_indent.last().map(|m| m.id), index, link.key()),
                    link: link.key().clone(),
                };
                self.flatten_subtree(content, marker, node, parent_indent, collapse, out)
            }
        }
    }

    fn flatten_subtree<S: ContentSource + ?Sized>(
        &self,
        content: &S,
        marker: IndentMarker,
        node: Arc<PostNode>,
        parent_indent: &[IndentMarker],
        collapse: &CollapseStates,
        out: &mut Vec<FlatItem>,
    ) -> Result<(), FlattenError> {
        let id = marker.id;
        let key = marker.link.clone();
        let mut self_indent = parent_indent.to_vec();
        self_indent.push(marker);

        match node.as_ref() {
            PostNode::Loader(_) => {
                out.push(FlatItem::Loader {
                    link: key,
                    node: Arc::clone(&node),
                    indent: self_indent,
                });
                Ok(())
            }
            PostNode::Post(post) => {
                let collapsed = collapse
                    .get(&id)
                    .copied()
                    .unwrap_or_else(|| post.content.default_collapsed());

                out.push(FlatItem::Post {
                    link: key,
                    node: Arc::clone(&node),
                    collapsed,
                    indent: self_indent.clone(),
                });

                if collapsed {
                    return Ok(());
                }
                if let Some(replies) = &post.replies {
                    for (index, reply) in replies.items.iter().enumerate() {
                        self.flatten_reply(content, reply, index, &self_indent, collapse, out)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Deterministic fingerprint of a flattened list.
pub fn flatten_fingerprint(items: &[FlatItem]) -> Result<String, CanonicalError> {
    canonical_hash_hex(&items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContentStore;
    use crate::types::{Collapsible, Link, PostBody, PostContent, PostData, Replies};

    fn comment(name: &str, replies: Option<Vec<&str>>, collapsed: bool) -> PostNode {
        PostNode::Post(PostData {
            url: None,
            client_id: "test".to_string(),
            parent: None,
            replies: replies.map(|names| Replies::of(names.into_iter().map(Link::named).collect())),
            content: PostContent::Post(PostBody {
                body: Some(name.to_string()),
                collapsible: Some(Collapsible { default_collapsed: collapsed }),
                ..PostBody::default()
            }),
        })
    }

    fn put(store: &mut ContentStore, name: &str, node: PostNode) {
        store.write(&Link::<PostNode>::named(name), ReadResult::Data(node));
    }

    fn post_names(items: &[FlatItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| match item {
                FlatItem::Post { link, .. } => Some(link.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_pivot_error_fails_flatten() {
        let mut store = ContentStore::new();
        let pivot: PostLink = Link::named("pivot");
        store.write(&pivot, ReadResult::error("not found"));

        let result = Flattener::default().flatten(&pivot, &store, &CollapseStates::new());
        assert!(matches!(result, Err(FlattenError::PivotFailed { .. })));
    }

    #[test]
    fn test_missing_pivot_is_logic_error() {
        let store = ContentStore::new();
        let pivot: PostLink = Link::named("pivot");

        let result = Flattener::default().flatten(&pivot, &store, &CollapseStates::new());
        assert!(matches!(result, Err(FlattenError::Store(StoreError::MissingLink(_)))));
    }

    #[test]
    fn test_unknown_replies_emit_no_separator() {
        let mut store = ContentStore::new();
        put(&mut store, "pivot", comment("pivot", None, false));

        let items = Flattener::default()
            .flatten(&Link::named("pivot"), &store, &CollapseStates::new())
            .unwrap();

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], FlatItem::Todo { note: Placeholder::AncestorsOfPivot { .. } }));
        assert!(matches!(items[1], FlatItem::Post { .. }));
    }

    #[test]
    fn test_nested_indent_and_wrappers() {
        let mut store = ContentStore::new();
        put(&mut store, "pivot", comment("pivot", Some(vec!["a", "b"]), false));
        put(&mut store, "a", comment("a", Some(vec!["a1"]), false));
        put(&mut store, "a1", comment("a1", Some(vec![]), false));
        put(&mut store, "b", comment("b", None, false));

        let items = Flattener::new(FlattenOptions {
            show_ancestor_placeholder: false,
            emit_pivot: false,
        })
        .flatten(&Link::named("pivot"), &store, &CollapseStates::new())
        .unwrap();

        let kinds: Vec<&str> = items
            .iter()
            .map(|item| match item {
                FlatItem::HorizontalLine => "line",
                FlatItem::WrapperStart => "start",
                FlatItem::WrapperEnd => "end",
                FlatItem::Post { .. } => "post",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["line", "start", "post", "post", "end", "start", "post", "end"]);
        assert_eq!(post_names(&items), vec!["a", "a1", "b"]);
        assert_eq!(items[2].depth(), 1);
        assert_eq!(items[3].depth(), 2);
    }

    #[test]
    fn test_collapse_override_beats_default() {
        let mut store = ContentStore::new();
        put(&mut store, "pivot", comment("pivot", Some(vec!["a"]), false));
        put(&mut store, "a", comment("a", Some(vec!["a1"]), true));
        put(&mut store, "a1", comment("a1", None, false));
        let flattener = Flattener::default();
        let pivot: PostLink = Link::named("pivot");

        let by_default = flattener.flatten(&pivot, &store, &CollapseStates::new()).unwrap();
        assert_eq!(post_names(&by_default), vec!["pivot", "a"]);

        let a_id = IndentId::child_of(None, 0, &LinkKey::Named("a".to_string()));
        let overrides = CollapseStates::from([(a_id, false)]);
        let expanded = flattener.flatten(&pivot, &store, &overrides).unwrap();
        assert_eq!(post_names(&expanded), vec!["pivot", "a", "a1"]);
    }

    #[test]
    fn test_indent_ids_follow_path() {
        let a = LinkKey::Named("a".to_string());
        let b = LinkKey::Named("b".to_string());

        let under_root = IndentId::child_of(None, 1, &b);
        let under_a = IndentId::child_of(Some(IndentId::child_of(None, 0, &a)), 0, &b);
        assert_ne!(under_root, under_a);
        assert_eq!(under_a, IndentId::child_of(Some(IndentId::child_of(None, 0, &a)), 0, &b));
    }

    #[test]
    fn test_repeated_sibling_collapses_alone() {
        let mut store = ContentStore::new();
        put(&mut store, "pivot", comment("pivot", Some(vec!["a", "a"]), false));
        put(&mut store, "a", comment("a", Some(vec!["a1"]), false));
        put(&mut store, "a1", comment("a1", None, false));
        let pivot: PostLink = Link::named("pivot");

        let items = Flattener::default().flatten(&pivot, &store, &CollapseStates::new()).unwrap();
        let ids: Vec<IndentId> = items
            .iter()
            .filter_map(|item| match item {
                FlatItem::Post { link, indent, .. } if link.to_string() == "a" => {
                    indent.last().map(|m| m.id)
                }
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let overrides = CollapseStates::from([(ids[0], true)]);
        let collapsed = Flattener::default().flatten(&pivot, &store, &overrides).unwrap();
        assert_eq!(post_names(&collapsed), vec!["pivot", "a", "a", "a1"]);
    }
}
