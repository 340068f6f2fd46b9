//! End-to-end instrumentation: wrapped drivers, version gating, parameter
//! truncation, and cancellation of in-flight async runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use wirespan::context::FutureContextExt;
use wirespan::report::InMemoryReporter;
use wirespan::trace::{Layer, TagKind};
use wirespan::TracingContext;
use wirespan_graph::{
    AsyncGraphSession, GraphConfig, GraphSession, InstrumentationStrategy, QueryParams,
    ServerAddress, TracedSession, OP_ASYNC_SESSION_RUN, OP_SESSION_RUN, TRUNCATION_MARKER,
};

#[derive(Error, Debug)]
#[error("{0}")]
struct DriverError(&'static str);

struct BlockingSession {
    address: ServerAddress,
    fail: bool,
}

impl BlockingSession {
    fn new() -> Self {
        BlockingSession {
            address: ServerAddress::new("graph.internal", 7687),
            fail: false,
        }
    }
}

impl GraphSession for BlockingSession {
    type Output = u32;
    type Error = DriverError;

    fn database(&self) -> Option<&str> {
        Some("movies")
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn run(&mut self, _query: &str, _params: &QueryParams) -> Result<u32, DriverError> {
        if self.fail {
            Err(DriverError("constraint violation"))
        } else {
            Ok(7)
        }
    }
}

struct AsyncSession {
    address: ServerAddress,
    delay: Duration,
}

impl AsyncSession {
    fn new() -> Self {
        AsyncSession {
            address: ServerAddress::new("graph.internal", 7687),
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl AsyncGraphSession for AsyncSession {
    type Output = u32;
    type Error = DriverError;

    fn database(&self) -> Option<&str> {
        Some("movies")
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn run(&mut self, _query: &str, _params: &QueryParams) -> Result<u32, DriverError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(7)
    }
}

fn reporter_context() -> (InMemoryReporter, TracingContext) {
    let reporter = InMemoryReporter::default();
    let cx = TracingContext::with_reporter(Arc::new(reporter.clone()));
    (reporter, cx)
}

#[test]
fn blocking_run_is_traced_under_the_current_context() {
    let (reporter, cx) = reporter_context();
    let _guard = cx.attach();
    let config = GraphConfig::new().with_sql_parameters_max_length(512);
    let mut session = TracedSession::new(BlockingSession::new(), "4.4.11", &config);

    let mut params = QueryParams::new();
    params.insert("title".to_string(), json!("The Matrix"));
    let rows = session
        .run("MATCH (m:Movie {title: $title}) RETURN m", &params)
        .unwrap();
    assert_eq!(rows, 7);

    let spans = reporter.finished_spans();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.operation_name, OP_SESSION_RUN);
    assert_eq!(span.trace_id, cx.trace_id());
    assert_eq!(span.peer, "graph.internal:7687");
    assert_eq!(span.layer, Layer::Database);
    assert_eq!(span.tags.get(TagKind::DbInstance), Some("movies"));
    assert_eq!(
        span.tags.get(TagKind::DbSqlParameters),
        Some(r#"{"title":"The Matrix"}"#)
    );
}

#[test]
fn driver_error_propagates_unchanged_and_marks_the_span() {
    let (reporter, cx) = reporter_context();
    let _guard = cx.attach();
    let mut inner = BlockingSession::new();
    inner.fail = true;
    let mut session = TracedSession::new(inner, "5.0.0", &GraphConfig::new());

    let err = session
        .run("CREATE (:Movie {title: $title})", &QueryParams::new())
        .unwrap_err();
    assert_eq!(err.to_string(), "constraint violation");

    let spans = reporter.finished_spans();
    assert!(spans[0].errored);
    assert_eq!(
        spans[0].tags.get(TagKind::ErrorMessage),
        Some("constraint violation")
    );
}

#[test]
fn oversized_parameters_are_truncated_with_marker() {
    let (reporter, cx) = reporter_context();
    let _guard = cx.attach();
    let config = GraphConfig::new().with_sql_parameters_max_length(16);
    let mut session = TracedSession::new(BlockingSession::new(), "5.0.0", &config);

    let mut params = QueryParams::new();
    params.insert("bio".to_string(), json!("a".repeat(200)));
    session.run("RETURN 1", &params).unwrap();

    let spans = reporter.finished_spans();
    let tagged = spans[0].tags.get(TagKind::DbSqlParameters).unwrap();
    let serialized = serde_json::to_string(&params).unwrap();
    let expected: String = serialized.chars().take(16).collect::<String>() + TRUNCATION_MARKER;
    assert_eq!(tagged, expected);
}

#[test]
fn sync_only_version_does_not_trace_async_runs() {
    let (reporter, cx) = reporter_context();
    let session = TracedSession::new(AsyncSession::new(), "4.4.9", &GraphConfig::new());
    assert_eq!(session.strategy(), InstrumentationStrategy::SyncOnly);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    rt.block_on(
        async {
            let mut session = session;
            let rows = session.run("RETURN 1", &QueryParams::new()).await.unwrap();
            assert_eq!(rows, 7);
        }
        .with_context(cx),
    );

    assert!(reporter.finished_spans().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_run_is_traced_across_suspension() {
    let (reporter, cx) = reporter_context();
    let mut inner = AsyncSession::new();
    inner.delay = Duration::from_millis(10);
    let mut session = TracedSession::new(inner, "5.3.0", &GraphConfig::new());

    async {
        let rows = session
            .run("MATCH (n) RETURN count(n)", &QueryParams::new())
            .await
            .unwrap();
        assert_eq!(rows, 7);
    }
    .with_context(cx.clone())
    .await;

    let spans = reporter.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].operation_name, OP_ASYNC_SESSION_RUN);
    assert_eq!(spans[0].trace_id, cx.trace_id());
    assert!(!spans[0].errored);
    assert_eq!(cx.depth(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn aborted_async_run_finalizes_span_as_cancelled() {
    let (reporter, cx) = reporter_context();
    let mut inner = AsyncSession::new();
    inner.delay = Duration::from_secs(3600);
    let mut session = TracedSession::new(inner, "5.3.0", &GraphConfig::new());

    let handle = tokio::spawn(
        async move {
            let _ = session.run("MATCH (n) RETURN n", &QueryParams::new()).await;
        }
        .with_context(cx.clone()),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    let spans = reporter.finished_spans();
    assert_eq!(spans.len(), 1, "no leaked open span after cancellation");
    assert_eq!(spans[0].operation_name, OP_ASYNC_SESSION_RUN);
    assert!(spans[0].errored);
    assert_eq!(
        spans[0].tags.get(TagKind::ErrorMessage),
        Some("cancelled before completion")
    );
    assert_eq!(cx.depth(), 0);
}

#[test]
fn unparsable_version_disables_tracing_but_not_the_driver() {
    let (reporter, cx) = reporter_context();
    let _guard = cx.attach();
    let mut session = TracedSession::new(BlockingSession::new(), "nightly", &GraphConfig::new());
    assert_eq!(session.strategy(), InstrumentationStrategy::Disabled);

    let rows = session.run("RETURN 1", &QueryParams::new()).unwrap();
    assert_eq!(rows, 7);
    assert!(reporter.finished_spans().is_empty());
}
