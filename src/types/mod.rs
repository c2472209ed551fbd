//! Core types for the content graph.

pub mod link;
pub mod read_result;
pub mod post;
pub mod token;

pub use link::{Link, LinkKey};
pub use read_result::ReadResult;
pub use post::{
    PostLink, PostNode, PostData, LoaderData, PostContent, PostBody,
    Replies, ReplyAffordance, Author, Collapsible, ActionButton,
};
pub use token::{
    Opaque, OpaqueCodec, TokenKind, LoaderKind, ActionKind, CodecMarker, TokenError,
};
