//! Graph-database driver instrumentation over the `wirespan` engine.
//!
//! The crate wraps a driver handle rather than patching driver internals: a
//! driver adapter implements one of the seam traits ([`GraphSession`],
//! [`GraphTransaction`], [`AsyncGraphSession`], [`AsyncGraphTransaction`]),
//! and the [`TracedSession`] / [`TracedTransaction`] wrappers implement the
//! same trait, surrounding every `run` with an exit span tagged with the
//! database type, instance, statement, and (optionally, capped) parameters.
//!
//! Whether a wrapper traces at all, and whether it traces async entry
//! points, is decided once at construction from the driver's reported
//! version; unsupported or unparsable versions degrade to untraced
//! pass-through instead of failing.
//!
//! ```
//! use std::sync::Arc;
//! use wirespan::report::InMemoryReporter;
//! use wirespan::TracingContext;
//! use wirespan_graph::{
//!     GraphConfig, GraphSession, QueryParams, ServerAddress, TracedSession,
//! };
//!
//! struct MySession {
//!     address: ServerAddress,
//! }
//!
//! impl GraphSession for MySession {
//!     type Output = ();
//!     type Error = std::io::Error;
//!
//!     fn database(&self) -> Option<&str> {
//!         Some("movies")
//!     }
//!     fn address(&self) -> &ServerAddress {
//!         &self.address
//!     }
//!     fn run(&mut self, _query: &str, _params: &QueryParams) -> std::io::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let reporter = InMemoryReporter::default();
//! let cx = TracingContext::with_reporter(Arc::new(reporter.clone()));
//! let _guard = cx.attach();
//!
//! let session = MySession {
//!     address: ServerAddress::new("localhost", 7687),
//! };
//! let mut session = TracedSession::new(session, "5.12.0", &GraphConfig::new());
//! session.run("MATCH (n) RETURN n LIMIT 1", &QueryParams::new()).unwrap();
//!
//! assert_eq!(reporter.finished_spans().len(), 1);
//! ```

mod config;
mod params;
mod session;
mod version;

pub use config::{GraphConfig, ENV_SQL_PARAMETERS_MAX_LENGTH};
pub use params::{ParamsPolicy, QueryParams, TRUNCATION_MARKER};
pub use session::{
    AsyncGraphSession, AsyncGraphTransaction, GraphSession, GraphTransaction, ServerAddress,
    TracedSession, TracedTransaction, OP_ASYNC_SESSION_RUN, OP_ASYNC_TRANSACTION_RUN,
    OP_SESSION_RUN, OP_TRANSACTION_RUN,
};
pub use version::{DriverVersion, InstrumentationStrategy, InvalidVersion};
