//! Post node types for the content graph.
//!
//! A [`PostNode`] is the dominant node shape: either a real post (thread,
//! comment, community page, client root, notification) or a loader standing
//! in for content that has not been fetched yet.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::link::Link;
use super::token::{ActionKind, LoaderKind, Opaque};

/// Link to a post node.
pub type PostLink = Link<PostNode>;

/// Node stored behind a [`PostLink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostNode {
    /// Materialized post.
    Post(PostData),
    /// Placeholder that fetches more content when issued.
    Loader(LoaderData),
}

impl PostNode {
    /// Adapter that owns this node.
    pub fn client_id(&self) -> &str {
        match self {
            Self::Post(post) => &post.client_id,
            Self::Loader(loader) => &loader.client_id,
        }
    }

    /// Structural parent of this node.
    pub fn parent(&self) -> Option<&PostLink> {
        match self {
            Self::Post(post) => post.parent.as_ref(),
            Self::Loader(loader) => loader.parent.as_ref(),
        }
    }

    /// Replies of this node. Loaders never have replies.
    pub fn replies(&self) -> Option<&Replies> {
        match self {
            Self::Post(post) => post.replies.as_ref(),
            Self::Loader(_) => None,
        }
    }

    /// Get the post data, if this is a post.
    pub fn as_post(&self) -> Option<&PostData> {
        match self {
            Self::Post(post) => Some(post),
            Self::Loader(_) => None,
        }
    }

    /// Get the loader data, if this is a loader.
    pub fn as_loader(&self) -> Option<&LoaderData> {
        match self {
            Self::Post(_) => None,
            Self::Loader(loader) => Some(loader),
        }
    }
}

/// A materialized post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostData {
    /// Routing URL, when the source has one.
    pub url: Option<String>,
    /// Adapter that owns this post. Loader and action tokens found on the
    /// post must be handed back to this adapter.
    pub client_id: String,
    /// Structural parent.
    pub parent: Option<PostLink>,
    /// `None` means the replies are unknown; an empty list means known empty.
    pub replies: Option<Replies>,
    /// What the post displays.
    pub content: PostContent,
}

/// Replies of a post.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Replies {
    /// Reply links in display order.
    pub items: Vec<PostLink>,
    /// Present when the user may compose a reply here.
    pub reply: Option<ReplyAffordance>,
}

impl Replies {
    /// Known-empty replies.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replies from a list of links.
    pub fn of(items: Vec<PostLink>) -> Self {
        Self { items, reply: None }
    }

    /// Attach a reply affordance.
    pub fn with_reply(mut self, reply: ReplyAffordance) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// Permission and token for composing a reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyAffordance {
    /// Action that submits the reply.
    pub action: Opaque<ActionKind>,
}

/// A node standing in for unfetched content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoaderData {
    /// Adapter that issued the token.
    pub client_id: String,
    /// Node the loaded content attaches under.
    pub parent: Option<PostLink>,
    /// Number of items the loader would bring in, when known.
    pub load_count: Option<u32>,
    /// Token to hand back to the adapter.
    pub token: Opaque<LoaderKind>,
}

/// Displayable content of a post.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostContent {
    /// Thread or comment.
    Post(PostBody),
    /// Root node of a client/backend.
    Client {
        /// Display name of the client.
        name: String,
    },
    /// Notification entry.
    Notification {
        /// Headline.
        title: String,
        /// Optional detail text.
        body: Option<String>,
        /// Whether the user has seen it.
        read: bool,
        /// Actions on the notification.
        actions: Vec<ActionButton>,
    },
    /// Landing page (community, profile, ...).
    Page {
        /// Page title.
        title: String,
        /// Optional description.
        body: Option<String>,
    },
    /// Content the adapter cannot render yet.
    Todo {
        /// What is missing.
        note: String,
    },
}

impl PostContent {
    /// Collapse settings, if this content can collapse.
    pub fn collapsible(&self) -> Option<&Collapsible> {
        match self {
            Self::Post(body) => body.collapsible.as_ref(),
            Self::Client { .. } | Self::Notification { .. } | Self::Page { .. } | Self::Todo { .. } => None,
        }
    }

    /// Collapse state used when no override is given.
    pub fn default_collapsed(&self) -> bool {
        self.collapsible().map(|c| c.default_collapsed).unwrap_or(false)
    }
}

/// Body of a thread or comment.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PostBody {
    /// Title (threads usually have one, comments usually do not).
    pub title: Option<String>,
    /// Body text.
    pub body: Option<String>,
    /// Author.
    pub author: Option<Author>,
    /// Creation time.
    pub time: Option<DateTime<Utc>>,
    /// Collapse settings. `None` means the post cannot collapse.
    pub collapsible: Option<Collapsible>,
    /// Actions shown with the post.
    pub actions: Vec<ActionButton>,
}

/// Author of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    /// Display name.
    pub name: String,
    /// Profile URL.
    pub url: Option<String>,
}

/// Collapse settings of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Collapsible {
    /// Whether the post starts collapsed.
    pub default_collapsed: bool,
}

/// A labelled action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionButton {
    /// Button label.
    pub label: String,
    /// Counter shown with the button (score, likes, ...).
    pub count: Option<i64>,
    /// Token to hand back to the adapter.
    pub action: Opaque<ActionKind>,
}
