//! Link types for the content graph.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use uuid::Uuid;

use crate::canonical::{to_canonical_string, CanonicalError};

/// Untyped identity of a graph node.
///
/// A key is either a stable string (usually the canonical encoding of a
/// base descriptor) or a unique symbol minted at runtime. Equality is
/// identity: two symbols are equal only if they came from the same mint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LinkKey {
    /// Stable string key.
    Named(String),
    /// Unique runtime symbol.
    Symbol(Uuid),
}

impl LinkKey {
    /// Mint a fresh symbol key.
    pub fn symbol() -> Self {
        Self::Symbol(Uuid::new_v4())
    }

    /// Bytes fed to identity hashes. Variants are prefixed so a name can
    /// never hash like a symbol.
    pub(crate) fn hash_into(&self, hasher: &mut impl Hasher) {
        match self {
            Self::Named(name) => {
                hasher.write(b"n:");
                hasher.write(name.as_bytes());
            }
            Self::Symbol(id) => {
                hasher.write(b"s:");
                hasher.write(id.as_bytes());
            }
        }
    }
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{}", name),
            Self::Symbol(id) => write!(f, "symbol:{}", id),
        }
    }
}

/// Typed handle to a node in the content store.
///
/// `T` is the semantic type of the node the link stands for. It is a
/// phantom: links are compared, hashed and ordered by key alone, and a
/// link never changes type.
pub struct Link<T> {
    key: LinkKey,
    _type: PhantomData<fn() -> T>,
}

impl<T> Link<T> {
    /// Create a link from a raw key.
    pub fn from_key(key: LinkKey) -> Self {
        Self {
            key,
            _type: PhantomData,
        }
    }

    /// Create a link with a stable string key.
    pub fn named(name: impl Into<String>) -> Self {
        Self::from_key(LinkKey::Named(name.into()))
    }

    /// Create a link with a fresh unique symbol key.
    pub fn symbol() -> Self {
        Self::from_key(LinkKey::symbol())
    }

    /// Derive a link from a base descriptor.
    ///
    /// Structurally equal descriptors produce equal links.
    pub fn from_base<B: Serialize + ?Sized>(base: &B) -> Result<Self, CanonicalError> {
        Ok(Self::named(to_canonical_string(base)?))
    }

    /// Get the untyped key.
    pub fn key(&self) -> &LinkKey {
        &self.key
    }

    /// Consume the link and return its key.
    pub fn into_key(self) -> LinkKey {
        self.key
    }
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self::from_key(self.key.clone())
    }
}

impl<T> PartialEq for Link<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Link<T> {}

impl<T> Hash for Link<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T> PartialOrd for Link<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Link<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link<{}>({})", std::any::type_name::<T>(), self.key)
    }
}

impl<T> fmt::Display for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl<T> Serialize for Link<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.key.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Link<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        LinkKey::deserialize(deserializer).map(Self::from_key)
    }
}

impl<T> From<Link<T>> for LinkKey {
    fn from(link: Link<T>) -> Self {
        link.key
    }
}
