use std::fmt;

use rand::Rng;

/// Identifies one logical trace across every span it contains.
///
/// Generated randomly when a [`TracingContext`] is created, in the same way
/// tracing systems derive ids from a process-local RNG rather than a central
/// authority.
///
/// [`TracingContext`]: crate::context::TracingContext
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// Generates a new random trace id.
    pub fn random() -> Self {
        TraceId(rand::thread_rng().gen::<u128>())
    }

    /// Converts the trace id to its u128 representation.
    pub const fn to_u128(self) -> u128 {
        self.0
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({:032x})", self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Identifies one span within its owning trace.
///
/// Span ids are sequential per context, starting at 1. A root span has no
/// parent id rather than a sentinel value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    pub(crate) const fn new(value: u64) -> Self {
        SpanId(value)
    }

    /// Converts the span id to its u64 representation.
    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
