//! Typed key-value attachments for spans.
//!
//! Tags are identified by a closed set of kinds rather than free-form string
//! keys, so consumers of finished spans can match on them without string
//! comparison. The stored value is always a string; serialization of richer
//! values (for example query parameters) happens on the caller's side.

use std::fmt;

/// The closed enumeration of tag kinds a span can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TagKind {
    /// Database technology, e.g. `Neo4j`.
    DbType,
    /// Database instance name the statement ran against.
    DbInstance,
    /// The statement text itself.
    DbStatement,
    /// Serialized statement parameters, subject to caller-side truncation.
    DbSqlParameters,
    /// Short classification of a recorded failure.
    ErrorKind,
    /// Human-readable failure detail.
    ErrorMessage,
}

impl TagKind {
    /// The stable wire key for this kind.
    pub const fn key(&self) -> &'static str {
        match self {
            TagKind::DbType => "db.type",
            TagKind::DbInstance => "db.instance",
            TagKind::DbStatement => "db.statement",
            TagKind::DbSqlParameters => "db.sql.parameters",
            TagKind::ErrorKind => "error.kind",
            TagKind::ErrorMessage => "error.message",
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A `(kind, value)` pair attached to a span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    kind: TagKind,
    value: String,
}

impl Tag {
    /// Creates a tag of the given kind.
    pub fn new(kind: TagKind, value: impl Into<String>) -> Self {
        Tag {
            kind,
            value: value.into(),
        }
    }

    /// A [`TagKind::DbType`] tag.
    pub fn db_type(value: impl Into<String>) -> Self {
        Tag::new(TagKind::DbType, value)
    }

    /// A [`TagKind::DbInstance`] tag.
    pub fn db_instance(value: impl Into<String>) -> Self {
        Tag::new(TagKind::DbInstance, value)
    }

    /// A [`TagKind::DbStatement`] tag.
    pub fn db_statement(value: impl Into<String>) -> Self {
        Tag::new(TagKind::DbStatement, value)
    }

    /// A [`TagKind::DbSqlParameters`] tag.
    pub fn db_sql_parameters(value: impl Into<String>) -> Self {
        Tag::new(TagKind::DbSqlParameters, value)
    }

    /// An [`TagKind::ErrorKind`] tag.
    pub fn error_kind(value: impl Into<String>) -> Self {
        Tag::new(TagKind::ErrorKind, value)
    }

    /// An [`TagKind::ErrorMessage`] tag.
    pub fn error_message(value: impl Into<String>) -> Self {
        Tag::new(TagKind::ErrorMessage, value)
    }

    /// The tag's kind.
    pub const fn kind(&self) -> TagKind {
        self.kind
    }

    /// The tag's value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An ordered collection of tags, at most one per kind.
///
/// Insertion order of first appearance is preserved. Inserting a kind that is
/// already present overwrites the stored value in place: last write wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagSet(Vec<Tag>);

impl TagSet {
    /// Creates an empty tag set.
    pub const fn new() -> Self {
        TagSet(Vec::new())
    }

    /// Inserts a tag, overwriting any existing tag of the same kind.
    pub fn insert(&mut self, tag: Tag) {
        match self.0.iter_mut().find(|t| t.kind == tag.kind) {
            Some(existing) => existing.value = tag.value,
            None => self.0.push(tag),
        }
    }

    /// Returns the value stored for `kind`, if any.
    pub fn get(&self, kind: TagKind) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| t.value.as_str())
    }

    /// Iterates tags in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// Number of distinct kinds stored.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no tags are stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
