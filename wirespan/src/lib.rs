//! Tracing context and span engine.
//!
//! `wirespan` provides the core an instrumentation plugin builds on: a
//! per-execution-unit [`TracingContext`] holding a strict stack of open
//! spans, scoped [`ActiveSpan`] guards for outbound ("exit") calls, typed
//! [`Tag`] attachments, and a pluggable [`Reporter`] pipeline that receives
//! every finished span.
//!
//! # Getting started
//!
//! ```
//! use std::sync::Arc;
//! use wirespan::report::InMemoryReporter;
//! use wirespan::trace::{Component, Layer, Tag};
//! use wirespan::TracingContext;
//!
//! let reporter = InMemoryReporter::default();
//! let cx = TracingContext::with_reporter(Arc::new(reporter.clone()));
//! {
//!     let mut span = cx.new_exit_span("Neo4j/Session/run", "db:7687", Component::Neo4j);
//!     span.set_layer(Layer::Database);
//!     span.tag(Tag::db_statement("MATCH (n) RETURN n LIMIT 1"));
//!     // run the outbound call here; the span closes when it leaves scope
//! }
//! assert_eq!(reporter.finished_spans().len(), 1);
//! ```
//!
//! # Execution units
//!
//! [`TracingContext::current`] resolves the caller's context: the innermost
//! explicitly [`attach`]ed context, or a lazily created per-thread ambient
//! one. Async tasks carry a context across suspension points and worker
//! threads with [`FutureContextExt::with_context`], and wrap a whole future
//! in a cancellation-safe span with [`FutureTraceExt::in_span`].
//!
//! # Reporting
//!
//! Finished spans go to the [`Reporter`] snapshotted by the context when it
//! was created; [`global::set_reporter`] installs the process-wide default.
//! Reporter failures never reach the instrumented caller.
//!
//! [`attach`]: TracingContext::attach
//! [`ActiveSpan`]: trace::ActiveSpan
//! [`Tag`]: trace::Tag
//! [`Reporter`]: report::Reporter
//! [`FutureContextExt::with_context`]: context::FutureContextExt::with_context
//! [`FutureTraceExt::in_span`]: trace::FutureTraceExt::in_span

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod context;
pub mod global;
pub mod report;
pub mod trace;

pub use context::{ContextGuard, TracingContext};
