//! Driver seam traits and the tracing wrappers around them.
//!
//! Instrumentation wraps a driver handle instead of patching the driver:
//! a driver adapter implements [`GraphSession`] / [`GraphTransaction`] (or
//! their async counterparts), and [`TracedSession`] / [`TracedTransaction`]
//! implement the same trait over it, opening an exit span around every
//! `run` and passing the driver's result through unchanged.

use std::fmt;

use async_trait::async_trait;

use wirespan::trace::{ActiveSpan, Component, Layer, Tag};
use wirespan::TracingContext;

use crate::config::GraphConfig;
use crate::params::{ParamsPolicy, QueryParams};
use crate::version::InstrumentationStrategy;

/// Operation name for blocking session runs.
pub const OP_SESSION_RUN: &str = "Neo4j/Session/run";
/// Operation name for blocking transaction runs.
pub const OP_TRANSACTION_RUN: &str = "Neo4j/Transaction/run";
/// Operation name for asynchronous session runs.
pub const OP_ASYNC_SESSION_RUN: &str = "Neo4j/AsyncSession/run";
/// Operation name for asynchronous transaction runs.
pub const OP_ASYNC_TRANSACTION_RUN: &str = "Neo4j/AsyncTransaction/run";

/// The remote server a session is bound to, tagged on spans as `host:port`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    /// Builds an address from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServerAddress {
            host: host.into(),
            port,
        }
    }

    /// The host component.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port component.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A blocking driver session capable of running statements.
pub trait GraphSession {
    /// What a successful `run` yields.
    type Output;
    /// The driver's failure type.
    type Error: std::error::Error;

    /// The database the session is bound to, if the driver exposes one.
    fn database(&self) -> Option<&str>;

    /// The server the session talks to.
    fn address(&self) -> &ServerAddress;

    /// Runs one statement.
    fn run(&mut self, query: &str, params: &QueryParams) -> Result<Self::Output, Self::Error>;
}

/// A blocking driver transaction capable of running statements.
pub trait GraphTransaction {
    type Output;
    type Error: std::error::Error;

    fn database(&self) -> Option<&str>;
    fn address(&self) -> &ServerAddress;
    fn run(&mut self, query: &str, params: &QueryParams) -> Result<Self::Output, Self::Error>;
}

/// An asynchronous driver session capable of running statements.
#[async_trait]
pub trait AsyncGraphSession: Send {
    /// What a successful `run` yields.
    type Output: Send;
    /// The driver's failure type.
    type Error: std::error::Error + Send;

    /// The database the session is bound to, if the driver exposes one.
    fn database(&self) -> Option<&str>;

    /// The server the session talks to.
    fn address(&self) -> &ServerAddress;

    /// Runs one statement.
    async fn run(&mut self, query: &str, params: &QueryParams)
        -> Result<Self::Output, Self::Error>;
}

/// An asynchronous driver transaction capable of running statements.
#[async_trait]
pub trait AsyncGraphTransaction: Send {
    type Output: Send;
    type Error: std::error::Error + Send;

    fn database(&self) -> Option<&str>;
    fn address(&self) -> &ServerAddress;
    async fn run(&mut self, query: &str, params: &QueryParams)
        -> Result<Self::Output, Self::Error>;
}

/// Attaches the database tags every graph span carries.
fn archive_span(
    span: &mut ActiveSpan,
    database: &str,
    query: &str,
    params: &QueryParams,
    policy: &ParamsPolicy,
) {
    span.set_layer(Layer::Database);
    span.tag(Tag::db_type(Component::Neo4j.name()));
    span.tag(Tag::db_instance(database));
    span.tag(Tag::db_statement(query));
    if let Some(rendered) = policy.render(params) {
        span.tag(Tag::db_sql_parameters(rendered));
    }
}

fn open_span(
    operation: &'static str,
    peer: String,
    database: &str,
    query: &str,
    params: &QueryParams,
    policy: &ParamsPolicy,
) -> ActiveSpan {
    let cx = TracingContext::current();
    let mut span = cx.new_exit_span(operation, peer, Component::Neo4j);
    archive_span(&mut span, database, query, params, policy);
    span
}

/// A driver session wrapped with tracing.
///
/// Whether a given `run` is traced is fixed at construction from the driver's
/// reported version; an unsupported version degrades to pure pass-through.
#[derive(Debug)]
pub struct TracedSession<S> {
    inner: S,
    policy: ParamsPolicy,
    strategy: InstrumentationStrategy,
}

impl<S> TracedSession<S> {
    /// Wraps `inner`, deciding the strategy from the driver's version string.
    pub fn new(inner: S, driver_version: &str, config: &GraphConfig) -> Self {
        TracedSession {
            inner,
            policy: ParamsPolicy::new(config),
            strategy: InstrumentationStrategy::for_version_str(driver_version),
        }
    }

    /// The resolved instrumentation strategy.
    pub fn strategy(&self) -> InstrumentationStrategy {
        self.strategy
    }

    /// Borrows the wrapped session.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwraps the session, discarding instrumentation.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: GraphSession> GraphSession for TracedSession<S> {
    type Output = S::Output;
    type Error = S::Error;

    fn database(&self) -> Option<&str> {
        self.inner.database()
    }

    fn address(&self) -> &ServerAddress {
        self.inner.address()
    }

    fn run(&mut self, query: &str, params: &QueryParams) -> Result<Self::Output, Self::Error> {
        if !self.strategy.traces_sync() {
            return self.inner.run(query, params);
        }
        let peer = self.inner.address().to_string();
        let database = self.inner.database().unwrap_or_default().to_string();
        let mut span = open_span(OP_SESSION_RUN, peer, &database, query, params, &self.policy);
        let result = self.inner.run(query, params);
        if let Err(err) = &result {
            span.record_error(err);
        }
        result
    }
}

#[async_trait]
impl<S: AsyncGraphSession> AsyncGraphSession for TracedSession<S> {
    type Output = S::Output;
    type Error = S::Error;

    fn database(&self) -> Option<&str> {
        self.inner.database()
    }

    fn address(&self) -> &ServerAddress {
        self.inner.address()
    }

    async fn run(
        &mut self,
        query: &str,
        params: &QueryParams,
    ) -> Result<Self::Output, Self::Error> {
        if !self.strategy.traces_async() {
            return self.inner.run(query, params).await;
        }
        let peer = self.inner.address().to_string();
        let database = self.inner.database().unwrap_or_default().to_string();
        let mut span = open_span(
            OP_ASYNC_SESSION_RUN,
            peer,
            &database,
            query,
            params,
            &self.policy,
        );
        // If the caller drops this future mid-flight the span still closes,
        // marked as a cancellation.
        span.fail_on_drop(true);
        let result = self.inner.run(query, params).await;
        span.fail_on_drop(false);
        if let Err(err) = &result {
            span.record_error(err);
        }
        result
    }
}

/// A driver transaction wrapped with tracing.
#[derive(Debug)]
pub struct TracedTransaction<T> {
    inner: T,
    policy: ParamsPolicy,
    strategy: InstrumentationStrategy,
}

impl<T> TracedTransaction<T> {
    /// Wraps `inner`, deciding the strategy from the driver's version string.
    pub fn new(inner: T, driver_version: &str, config: &GraphConfig) -> Self {
        TracedTransaction {
            inner,
            policy: ParamsPolicy::new(config),
            strategy: InstrumentationStrategy::for_version_str(driver_version),
        }
    }

    /// The resolved instrumentation strategy.
    pub fn strategy(&self) -> InstrumentationStrategy {
        self.strategy
    }

    /// Borrows the wrapped transaction.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Unwraps the transaction, discarding instrumentation.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: GraphTransaction> GraphTransaction for TracedTransaction<T> {
    type Output = T::Output;
    type Error = T::Error;

    fn database(&self) -> Option<&str> {
        self.inner.database()
    }

    fn address(&self) -> &ServerAddress {
        self.inner.address()
    }

    fn run(&mut self, query: &str, params: &QueryParams) -> Result<Self::Output, Self::Error> {
        if !self.strategy.traces_sync() {
            return self.inner.run(query, params);
        }
        let peer = self.inner.address().to_string();
        let database = self.inner.database().unwrap_or_default().to_string();
        let mut span = open_span(
            OP_TRANSACTION_RUN,
            peer,
            &database,
            query,
            params,
            &self.policy,
        );
        let result = self.inner.run(query, params);
        if let Err(err) = &result {
            span.record_error(err);
        }
        result
    }
}

#[async_trait]
impl<T: AsyncGraphTransaction> AsyncGraphTransaction for TracedTransaction<T> {
    type Output = T::Output;
    type Error = T::Error;

    fn database(&self) -> Option<&str> {
        self.inner.database()
    }

    fn address(&self) -> &ServerAddress {
        self.inner.address()
    }

    async fn run(
        &mut self,
        query: &str,
        params: &QueryParams,
    ) -> Result<Self::Output, Self::Error> {
        if !self.strategy.traces_async() {
            return self.inner.run(query, params).await;
        }
        let peer = self.inner.address().to_string();
        let database = self.inner.database().unwrap_or_default().to_string();
        let mut span = open_span(
            OP_ASYNC_TRANSACTION_RUN,
            peer,
            &database,
            query,
            params,
            &self.policy,
        );
        span.fail_on_drop(true);
        let result = self.inner.run(query, params).await;
        span.fail_on_drop(false);
        if let Err(err) = &result {
            span.record_error(err);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use thiserror::Error;
    use wirespan::report::InMemoryReporter;
    use wirespan::trace::TagKind;

    #[derive(Error, Debug)]
    #[error("query failed: {0}")]
    struct FakeError(&'static str);

    struct FakeSession {
        address: ServerAddress,
        database: Option<String>,
        calls: Vec<(String, QueryParams)>,
        fail: bool,
    }

    impl FakeSession {
        fn new() -> Self {
            FakeSession {
                address: ServerAddress::new("graph.internal", 7687),
                database: Some("movies".to_string()),
                calls: Vec::new(),
                fail: false,
            }
        }
    }

    impl GraphSession for FakeSession {
        type Output = usize;
        type Error = FakeError;

        fn database(&self) -> Option<&str> {
            self.database.as_deref()
        }

        fn address(&self) -> &ServerAddress {
            &self.address
        }

        fn run(&mut self, query: &str, params: &QueryParams) -> Result<usize, FakeError> {
            self.calls.push((query.to_string(), params.clone()));
            if self.fail {
                Err(FakeError("syntax error"))
            } else {
                Ok(self.calls.len())
            }
        }
    }

    fn attach_context() -> (InMemoryReporter, wirespan::ContextGuard) {
        let reporter = InMemoryReporter::default();
        let cx = TracingContext::with_reporter(Arc::new(reporter.clone()));
        let guard = cx.attach();
        (reporter, guard)
    }

    fn some_params() -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("name".to_string(), json!("Keanu"));
        params
    }

    #[test]
    fn session_run_opens_exit_span_with_database_tags() {
        let (reporter, _guard) = attach_context();
        let config = GraphConfig::new().with_sql_parameters_max_length(256);
        let mut session = TracedSession::new(FakeSession::new(), "5.12.0", &config);

        let rows = session
            .run("MATCH (n:Person {name: $name}) RETURN n", &some_params())
            .unwrap();
        assert_eq!(rows, 1);

        let spans = reporter.finished_spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.operation_name, OP_SESSION_RUN);
        assert_eq!(span.peer, "graph.internal:7687");
        assert_eq!(span.layer, Layer::Database);
        assert_eq!(span.component, Component::Neo4j);
        assert_eq!(span.tags.get(TagKind::DbType), Some("Neo4j"));
        assert_eq!(span.tags.get(TagKind::DbInstance), Some("movies"));
        assert_eq!(
            span.tags.get(TagKind::DbStatement),
            Some("MATCH (n:Person {name: $name}) RETURN n")
        );
        assert_eq!(
            span.tags.get(TagKind::DbSqlParameters),
            Some(r#"{"name":"Keanu"}"#)
        );
        assert!(!span.errored);
    }

    #[test]
    fn parameters_are_not_tagged_when_policy_disabled() {
        let (reporter, _guard) = attach_context();
        let mut session = TracedSession::new(FakeSession::new(), "5.12.0", &GraphConfig::new());

        session.run("RETURN 1", &some_params()).unwrap();

        let spans = reporter.finished_spans();
        assert_eq!(spans[0].tags.get(TagKind::DbSqlParameters), None);
    }

    #[test]
    fn driver_error_is_recorded_and_propagated() {
        let (reporter, _guard) = attach_context();
        let mut inner = FakeSession::new();
        inner.fail = true;
        let mut session = TracedSession::new(inner, "5.12.0", &GraphConfig::new());

        let err = session.run("RETURN 1", &QueryParams::new()).unwrap_err();
        assert_eq!(err.to_string(), "query failed: syntax error");

        let spans = reporter.finished_spans();
        assert!(spans[0].errored);
        assert_eq!(
            spans[0].tags.get(TagKind::ErrorMessage),
            Some("query failed: syntax error")
        );
    }

    #[test]
    fn unsupported_version_passes_through_untraced() {
        let (reporter, _guard) = attach_context();
        let mut session = TracedSession::new(FakeSession::new(), "3.5.0", &GraphConfig::new());
        assert_eq!(session.strategy(), InstrumentationStrategy::Disabled);

        session.run("RETURN 1", &QueryParams::new()).unwrap();
        assert_eq!(session.inner().calls.len(), 1);
        assert!(reporter.finished_spans().is_empty());
    }

    #[test]
    fn missing_database_tags_empty_instance() {
        let (reporter, _guard) = attach_context();
        let mut inner = FakeSession::new();
        inner.database = None;
        let mut session = TracedSession::new(inner, "4.4.9", &GraphConfig::new());

        session.run("RETURN 1", &QueryParams::new()).unwrap();
        assert_eq!(reporter.finished_spans()[0].tags.get(TagKind::DbInstance), Some(""));
    }

    #[test]
    fn transaction_run_uses_its_own_operation_name() {
        struct FakeTx(ServerAddress);
        impl GraphTransaction for FakeTx {
            type Output = ();
            type Error = FakeError;

            fn database(&self) -> Option<&str> {
                Some("movies")
            }
            fn address(&self) -> &ServerAddress {
                &self.0
            }
            fn run(&mut self, _query: &str, _params: &QueryParams) -> Result<(), FakeError> {
                Ok(())
            }
        }

        let (reporter, _guard) = attach_context();
        let mut tx = TracedTransaction::new(
            FakeTx(ServerAddress::new("graph.internal", 7687)),
            "4.4.0",
            &GraphConfig::new(),
        );
        tx.run("CREATE (:Person)", &QueryParams::new()).unwrap();

        let spans = reporter.finished_spans();
        assert_eq!(spans[0].operation_name, OP_TRANSACTION_RUN);
    }
}
