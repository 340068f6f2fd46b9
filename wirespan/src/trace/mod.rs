//! # Spans
//!
//! A span is the timed record of one traced operation: an operation name, a
//! position in the parent/child call tree of its trace, a layer and component
//! classification, and a set of [`Tag`]s. Spans are created through a
//! [`TracingContext`] and live as [`ActiveSpan`] scope guards; when the guard
//! leaves scope the span is closed exactly once and the finished [`SpanData`]
//! is handed to the context's [`Reporter`].
//!
//! [`TracingContext`]: crate::context::TracingContext
//! [`Reporter`]: crate::report::Reporter

use std::fmt;
use std::time::SystemTime;

mod id;
mod span;
mod tags;
mod traced;

pub use id::{SpanId, TraceId};
pub use span::ActiveSpan;
pub use tags::{Tag, TagKind, TagSet};
pub use traced::{FutureTraceExt, Traced};

/// The protocol layer a span's operation belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Layer {
    /// Not classified.
    #[default]
    Unknown,
    /// Call into a database.
    Database,
    /// Call through an RPC framework.
    RpcFramework,
    /// HTTP request.
    Http,
    /// Message-queue produce or consume.
    Mq,
    /// Cache access.
    Cache,
}

impl Layer {
    /// Stable name for the layer.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Layer::Unknown => "Unknown",
            Layer::Database => "Database",
            Layer::RpcFramework => "RPCFramework",
            Layer::Http => "Http",
            Layer::Mq => "MQ",
            Layer::Cache => "Cache",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes the relationship between a span and the operation it records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// An inbound call being handled by this process.
    Entry,
    /// An outbound call from this process to an external system.
    Exit,
    /// An operation local to this process.
    Local,
}

/// Identifies the integrated library or technology that produced a span.
///
/// The numeric ids are stable across agent implementations so that a backend
/// can resolve them without configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Component {
    /// Not classified.
    #[default]
    Unknown,
    /// MySQL driver.
    MySql,
    /// Redis client.
    Redis,
    /// PostgreSQL driver.
    PostgreSql,
    /// Neo4j graph-database driver.
    Neo4j,
}

impl Component {
    /// The component's stable numeric id.
    pub const fn id(&self) -> u32 {
        match self {
            Component::Unknown => 0,
            Component::MySql => 5,
            Component::Redis => 7,
            Component::PostgreSql => 22,
            Component::Neo4j => 112,
        }
    }

    /// The component's display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Component::Unknown => "Unknown",
            Component::MySql => "MySQL",
            Component::Redis => "Redis",
            Component::PostgreSql => "PostgreSQL",
            Component::Neo4j => "Neo4j",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The immutable record of a finished span, as handed to a [`Reporter`].
///
/// [`Reporter`]: crate::report::Reporter
#[derive(Clone, Debug)]
pub struct SpanData {
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// This span's id within the trace.
    pub span_id: SpanId,
    /// Parent span id, `None` for a root span.
    pub parent_span_id: Option<SpanId>,
    /// Operation name, e.g. `Neo4j/Session/run`.
    pub operation_name: String,
    /// Remote peer as `host:port`. Empty for non-exit spans.
    pub peer: String,
    /// Span kind.
    pub kind: SpanKind,
    /// Layer classification.
    pub layer: Layer,
    /// Producing component.
    pub component: Component,
    /// Wall-clock start time.
    pub start_time: SystemTime,
    /// Wall-clock end time, set when the span closed.
    pub end_time: SystemTime,
    /// Attached tags.
    pub tags: TagSet,
    /// Whether the wrapped operation failed (or was cancelled).
    pub errored: bool,
}

impl SpanData {
    /// Elapsed time between start and end, zero if the clock went backwards.
    pub fn duration(&self) -> std::time::Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }
}
