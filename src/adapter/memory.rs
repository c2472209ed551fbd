//! In-memory forum adapter.
//!
//! A small backend of communities, threads and nested comments that speaks
//! the full adapter contract. It is the reference for how an adapter uses
//! the core:
//!
//! - every backend object is named by a [`ForumBase`] descriptor
//! - the pivot's ancestors are filled with unknown replies, the pivot and its
//!   descendants with known replies down to `reply_depth` levels
//! - below that depth a loader node stands in for the remaining replies
//! - deleted comments become per-link errors
//! - low-scored comments start collapsed
//!
//! ## Locators
//!
//! | Locator | Pivot |
//! |---------|-------|
//! | `/` | client root (lists communities) |
//! | `/c/{community}` | community page (lists threads) |
//! | `/c/{community}/t/{thread}` | thread |
//! | `/c/{community}/t/{thread}/{comment}` | comment |

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::builder::{BaseDescriptor, GraphBuilder};
use super::{Adapter, AdapterError, Fragment, PageFragment};
use crate::config::{GraphConfig, DEFAULT_REPLY_DEPTH};
use crate::store::ContentStore;
use crate::types::{
    ActionButton, ActionKind, Author, Collapsible, LoaderKind, Opaque, OpaqueCodec, PostBody,
    PostContent, PostLink, PostNode, ReadResult, Replies, ReplyAffordance,
};

/// Comments scored at or below this start collapsed.
pub const COLLAPSE_SCORE: i64 = -3;

/// Identity of a forum object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForumBase {
    /// The forum itself.
    Client,
    /// A community.
    Community {
        /// Community name.
        name: String,
    },
    /// A thread in a community.
    Thread {
        /// Community name.
        community: String,
        /// Thread id.
        id: u64,
    },
    /// A comment in a thread.
    Comment {
        /// Community name.
        community: String,
        /// Thread id.
        thread: u64,
        /// Comment id.
        id: u64,
    },
}

impl BaseDescriptor for ForumBase {
    fn kind(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Community { .. } => "community",
            Self::Thread { .. } => "thread",
            Self::Comment { .. } => "comment",
        }
    }
}

impl ForumBase {
    /// Locator that opens this object as the pivot.
    pub fn locator(&self) -> String {
        match self {
            Self::Client => "/".to_string(),
            Self::Community { name } => format!("/c/{}", name),
            Self::Thread { community, id } => format!("/c/{}/t/{}", community, id),
            Self::Comment { community, thread, id } => format!("/c/{}/t/{}/{}", community, thread, id),
        }
    }
}

/// Adapter-private loader payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum LoaderRequest {
    /// Fill the replies of an object whose replies were cut off.
    Horizontal { fill_replies_of: ForumBase },
}

/// Adapter-private action payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ForumAction {
    Vote { target: ForumBase, delta: i64 },
    Reply { to: ForumBase },
}

#[derive(Debug, Clone)]
struct Community {
    title: String,
    description: Option<String>,
}

#[derive(Debug, Clone)]
struct Thread {
    community: String,
    author: String,
    title: String,
    body: String,
    score: i64,
    created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Comment {
    thread: u64,
    parent: Option<u64>,
    author: String,
    body: String,
    score: i64,
    deleted: bool,
    created: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ForumData {
    communities: BTreeMap<String, Community>,
    threads: BTreeMap<u64, Thread>,
    comments: BTreeMap<u64, Comment>,
    next_id: u64,
}

impl ForumData {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn thread_in(&self, community: &str, id: u64) -> Option<&Thread> {
        self.threads.get(&id).filter(|t| t.community == community)
    }

    fn comment_in(&self, thread: u64, id: u64) -> Option<&Comment> {
        self.comments.get(&id).filter(|c| c.thread == thread)
    }

    fn base_of_comment(&self, id: u64) -> Option<ForumBase> {
        let comment = self.comments.get(&id)?;
        let thread = self.threads.get(&comment.thread)?;
        Some(ForumBase::Comment {
            community: thread.community.clone(),
            thread: comment.thread,
            id,
        })
    }

    fn parent_of(&self, base: &ForumBase) -> Option<ForumBase> {
        match base {
            ForumBase::Client => None,
            ForumBase::Community { .. } => Some(ForumBase::Client),
            ForumBase::Thread { community, .. } => Some(ForumBase::Community {
                name: community.clone(),
            }),
            ForumBase::Comment { community, thread, id } => {
                match self.comment_in(*thread, *id).and_then(|c| c.parent) {
                    Some(parent) => self.base_of_comment(parent),
                    None => Some(ForumBase::Thread {
                        community: community.clone(),
                        id: *thread,
                    }),
                }
            }
        }
    }

    fn children_of(&self, base: &ForumBase) -> Vec<ForumBase> {
        match base {
            ForumBase::Client => self
                .communities
                .keys()
                .map(|name| ForumBase::Community { name: name.clone() })
                .collect(),
            ForumBase::Community { name } => self
                .threads
                .iter()
                .filter(|(_, t)| &t.community == name)
                .map(|(id, _)| ForumBase::Thread {
                    community: name.clone(),
                    id: *id,
                })
                .collect(),
            ForumBase::Thread { community, id } => self
                .comments
                .iter()
                .filter(|(_, c)| c.thread == *id && c.parent.is_none())
                .map(|(comment, _)| ForumBase::Comment {
                    community: community.clone(),
                    thread: *id,
                    id: *comment,
                })
                .collect(),
            ForumBase::Comment { community, thread, id } => self
                .comments
                .iter()
                .filter(|(_, c)| c.thread == *thread && c.parent == Some(*id))
                .map(|(comment, _)| ForumBase::Comment {
                    community: community.clone(),
                    thread: *thread,
                    id: *comment,
                })
                .collect(),
        }
    }
}

/// Reference adapter over an in-memory forum.
pub struct InMemoryForum {
    client_id: String,
    name: String,
    reply_depth: usize,
    data: RwLock<ForumData>,
    loaders: OpaqueCodec<LoaderRequest, LoaderKind>,
    actions: OpaqueCodec<ForumAction, ActionKind>,
}

impl InMemoryForum {
    /// Create an empty forum.
    pub fn new(client_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name: name.into(),
            reply_depth: DEFAULT_REPLY_DEPTH,
            data: RwLock::new(ForumData::default()),
            loaders: OpaqueCodec::new(),
            actions: OpaqueCodec::new(),
        }
    }

    /// Create an empty forum using the configured reply depth.
    pub fn with_config(client_id: impl Into<String>, name: impl Into<String>, config: &GraphConfig) -> Self {
        Self::new(client_id, name).with_reply_depth(config.reply_depth)
    }

    /// Set the number of reply levels filled before a loader is emitted.
    pub fn with_reply_depth(mut self, reply_depth: usize) -> Self {
        self.reply_depth = reply_depth;
        self
    }

    /// Reply levels filled before a loader is emitted.
    pub fn reply_depth(&self) -> usize {
        self.reply_depth
    }

    /// Add or replace a community.
    pub fn add_community(&self, name: impl Into<String>, title: impl Into<String>, description: Option<String>) -> ForumBase {
        let name = name.into();
        self.data.write().communities.insert(
            name.clone(),
            Community {
                title: title.into(),
                description,
            },
        );
        ForumBase::Community { name }
    }

    /// Start a thread in an existing community.
    pub fn add_thread(
        &self,
        community: &str,
        author: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<ForumBase, AdapterError> {
        let mut data = self.data.write();
        if !data.communities.contains_key(community) {
            return Err(AdapterError::UnknownLocator(format!("/c/{}", community)));
        }
        let id = data.allocate_id();
        data.threads.insert(
            id,
            Thread {
                community: community.to_string(),
                author: author.into(),
                title: title.into(),
                body: body.into(),
                score: 0,
                created: Utc::now(),
            },
        );
        Ok(ForumBase::Thread {
            community: community.to_string(),
            id,
        })
    }

    /// Reply to a thread or comment.
    pub fn add_comment(
        &self,
        to: &ForumBase,
        author: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<ForumBase, AdapterError> {
        let mut data = self.data.write();
        let (thread, parent) = match to {
            ForumBase::Thread { community, id } if data.thread_in(community, *id).is_some() => (*id, None),
            ForumBase::Comment { thread, id, .. } if data.comment_in(*thread, *id).is_some() => {
                (*thread, Some(*id))
            }
            ForumBase::Thread { .. } | ForumBase::Comment { .. } => {
                return Err(AdapterError::UnknownLocator(to.locator()));
            }
            ForumBase::Client | ForumBase::Community { .. } => {
                return Err(AdapterError::UnsupportedBase(to.kind().to_string()));
            }
        };
        let id = data.allocate_id();
        data.comments.insert(
            id,
            Comment {
                thread,
                parent,
                author: author.into(),
                body: body.into(),
                score: 0,
                deleted: false,
                created: Utc::now(),
            },
        );
        data.base_of_comment(id)
            .ok_or_else(|| AdapterError::UnknownLocator(to.locator()))
    }

    /// Mark a comment deleted. Returns whether the comment existed.
    pub fn delete_comment(&self, id: u64) -> bool {
        match self.data.write().comments.get_mut(&id) {
            Some(comment) => {
                comment.deleted = true;
                true
            }
            None => false,
        }
    }

    /// Adjust the score of a thread or comment. Returns whether it existed.
    pub fn vote(&self, target: &ForumBase, delta: i64) -> bool {
        let mut data = self.data.write();
        let score = match target {
            ForumBase::Thread { community, id } => data
                .threads
                .get_mut(id)
                .filter(|t| &t.community == community)
                .map(|t| &mut t.score),
            ForumBase::Comment { thread, id, .. } => data
                .comments
                .get_mut(id)
                .filter(|c| c.thread == *thread && !c.deleted)
                .map(|c| &mut c.score),
            ForumBase::Client | ForumBase::Community { .. } => None,
        };
        match score {
            Some(score) => {
                *score += delta;
                true
            }
            None => false,
        }
    }

    /// Map a locator to the object it names.
    pub fn route(locator: &str) -> Result<ForumBase, AdapterError> {
        static ROUTE: OnceLock<Regex> = OnceLock::new();
        let route = ROUTE.get_or_init(|| {
            Regex::new(r"^/(?:c/([A-Za-z0-9_]+)(?:/t/([0-9]+)(?:/([0-9]+))?)?)?$")
                .expect("locator pattern is valid")
        });

        let unknown = || AdapterError::UnknownLocator(locator.to_string());
        let caps = route.captures(locator).ok_or_else(unknown)?;
        let number = |i: usize| -> Result<Option<u64>, AdapterError> {
            caps.get(i)
                .map(|m| m.as_str().parse::<u64>().map_err(|_| unknown()))
                .transpose()
        };

        let community = caps.get(1).map(|m| m.as_str().to_string());
        Ok(match (community, number(2)?, number(3)?) {
            (None, _, _) => ForumBase::Client,
            (Some(name), None, _) => ForumBase::Community { name },
            (Some(community), Some(id), None) => ForumBase::Thread { community, id },
            (Some(community), Some(thread), Some(id)) => ForumBase::Comment { community, thread, id },
        })
    }

    /// Fill `base` with known replies, after its ancestors.
    ///
    /// A missing or deleted pivot resolves to an error entry on its own.
    fn fill_pivot(&self, b: &mut GraphBuilder<'_>, data: &ForumData, base: &ForumBase) -> Result<PostLink, AdapterError> {
        if let ReadResult::Error(message) = self.content_of(data, base)? {
            return b.fill_error(base, message);
        }
        b.fill(base, |b| {
            let parent = data
                .parent_of(base)
                .map(|parent| self.fill_ancestor(b, data, &parent))
                .transpose()?;
            self.build(b, data, base, parent, Some(self.reply_depth))
        })
    }

    /// Fill `base` and its ancestors with unknown replies.
    fn fill_ancestor(&self, b: &mut GraphBuilder<'_>, data: &ForumData, base: &ForumBase) -> Result<PostLink, AdapterError> {
        b.fill(base, |b| {
            let parent = data
                .parent_of(base)
                .map(|parent| self.fill_ancestor(b, data, &parent))
                .transpose()?;
            self.build(b, data, base, parent, None)
        })
    }

    /// Fill `base` under an already linked parent.
    fn fill_reply(
        &self,
        b: &mut GraphBuilder<'_>,
        data: &ForumData,
        base: &ForumBase,
        parent: &PostLink,
        depth: usize,
    ) -> Result<PostLink, AdapterError> {
        b.fill(base, |b| self.build(b, data, base, Some(parent.clone()), Some(depth)))
    }

    /// Build the node for `base`. `depth` is `None` for unknown replies,
    /// otherwise the number of reply levels still to fill.
    fn build(
        &self,
        b: &mut GraphBuilder<'_>,
        data: &ForumData,
        base: &ForumBase,
        parent: Option<PostLink>,
        depth: Option<usize>,
    ) -> Result<ReadResult<PostNode>, AdapterError> {
        let content = match self.content_of(data, base)? {
            ReadResult::Data(content) => content,
            ReadResult::Error(message) => return Ok(ReadResult::Error(message)),
        };

        let replies = match depth {
            None => None,
            Some(depth) => {
                let link = base.link()?;
                let children = data.children_of(base);
                let items = if depth == 0 && !children.is_empty() {
                    let token = self.loaders.encode(&LoaderRequest::Horizontal {
                        fill_replies_of: base.clone(),
                    })?;
                    let count = u32::try_from(children.len()).ok();
                    vec![b.loader(Some(link), count, token)]
                } else {
                    children
                        .iter()
                        .map(|child| self.fill_reply(b, data, child, &link, depth.saturating_sub(1)))
                        .collect::<Result<Vec<_>, _>>()?
                };
                let mut replies = Replies::of(items);
                if matches!(base, ForumBase::Thread { .. } | ForumBase::Comment { .. }) {
                    replies = replies.with_reply(ReplyAffordance {
                        action: self.actions.encode(&ForumAction::Reply { to: base.clone() })?,
                    });
                }
                Some(replies)
            }
        };

        Ok(ReadResult::Data(b.post(Some(base.locator()), parent, replies, content)))
    }

    fn content_of(&self, data: &ForumData, base: &ForumBase) -> Result<ReadResult<PostContent>, AdapterError> {
        Ok(match base {
            ForumBase::Client => ReadResult::Data(PostContent::Client {
                name: self.name.clone(),
            }),
            ForumBase::Community { name } => match data.communities.get(name) {
                Some(community) => ReadResult::Data(PostContent::Page {
                    title: community.title.clone(),
                    body: community.description.clone(),
                }),
                None => ReadResult::error(format!("community {} not found", name)),
            },
            ForumBase::Thread { community, id } => match data.thread_in(community, *id) {
                Some(thread) => ReadResult::Data(PostContent::Post(PostBody {
                    title: Some(thread.title.clone()),
                    body: Some(thread.body.clone()),
                    author: Some(self.author(&thread.author)),
                    time: Some(thread.created),
                    collapsible: None,
                    actions: self.vote_buttons(base, thread.score)?,
                })),
                None => ReadResult::error(format!("thread {} not found", id)),
            },
            ForumBase::Comment { thread, id, .. } => match data.comment_in(*thread, *id) {
                Some(comment) if comment.deleted => ReadResult::error(format!("comment {} was deleted", id)),
                Some(comment) => ReadResult::Data(PostContent::Post(PostBody {
                    title: None,
                    body: Some(comment.body.clone()),
                    author: Some(self.author(&comment.author)),
                    time: Some(comment.created),
                    collapsible: Some(Collapsible {
                        default_collapsed: comment.score <= COLLAPSE_SCORE,
                    }),
                    actions: self.vote_buttons(base, comment.score)?,
                })),
                None => ReadResult::error(format!("comment {} not found", id)),
            },
        })
    }

    fn author(&self, name: &str) -> Author {
        Author {
            name: name.to_string(),
            url: Some(format!("/u/{}", name)),
        }
    }

    fn vote_buttons(&self, target: &ForumBase, score: i64) -> Result<Vec<ActionButton>, AdapterError> {
        Ok(vec![
            ActionButton {
                label: "upvote".to_string(),
                count: Some(score),
                action: self.actions.encode(&ForumAction::Vote {
                    target: target.clone(),
                    delta: 1,
                })?,
            },
            ActionButton {
                label: "downvote".to_string(),
                count: None,
                action: self.actions.encode(&ForumAction::Vote {
                    target: target.clone(),
                    delta: -1,
                })?,
            },
        ])
    }

    /// Build a fragment that re-fills `base` with fresh replies.
    fn refill(&self, base: &ForumBase) -> Result<ContentStore, AdapterError> {
        let data = self.data.read();
        let mut content = ContentStore::new();
        let mut builder = GraphBuilder::new(&mut content, self.client_id.clone());
        let parent = data.parent_of(base).map(|p| p.link()).transpose()?;
        builder.fill(base, |b| self.build(b, &data, base, parent, Some(self.reply_depth)))?;
        Ok(content)
    }
}

#[async_trait]
impl Adapter for InMemoryForum {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn get_page(&self, locator: &str) -> Result<PageFragment, AdapterError> {
        let base = Self::route(locator)?;
        let data = self.data.read();
        let mut content = ContentStore::new();
        let pivot = self.fill_pivot(&mut GraphBuilder::new(&mut content, self.client_id.clone()), &data, &base)?;
        tracing::debug!(
            client_id = %self.client_id,
            locator = %locator,
            base = base.kind(),
            entries = content.len(),
            "built page fragment"
        );
        Ok(PageFragment { content, pivot })
    }

    async fn loader(&self, token: &Opaque<LoaderKind>) -> Result<Fragment, AdapterError> {
        let LoaderRequest::Horizontal { fill_replies_of } = self.loaders.decode(token)?;
        let content = self.refill(&fill_replies_of)?;
        tracing::debug!(
            client_id = %self.client_id,
            base = fill_replies_of.kind(),
            entries = content.len(),
            "resolved loader"
        );
        Ok(Fragment { content })
    }

    async fn act(&self, action: &Opaque<ActionKind>, input: Option<String>) -> Result<Fragment, AdapterError> {
        let target = match self.actions.decode(action)? {
            ForumAction::Vote { target, delta } => {
                if !self.vote(&target, delta) {
                    tracing::warn!(client_id = %self.client_id, locator = %target.locator(), "vote on missing target");
                }
                target
            }
            ForumAction::Reply { to } => {
                let text = input.ok_or(AdapterError::MissingInput("reply"))?;
                self.add_comment(&to, "you", text)?;
                to
            }
        };
        Ok(Fragment {
            content: self.refill(&target)?,
        })
    }
}

impl std::fmt::Debug for InMemoryForum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        f.debug_struct("InMemoryForum")
            .field("client_id", &self.client_id)
            .field("reply_depth", &self.reply_depth)
            .field("communities", &data.communities.len())
            .field("threads", &data.threads.len())
            .field("comments", &data.comments.len())
            .finish()
    }
}
