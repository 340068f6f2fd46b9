//! Per-thread context isolation and per-producer report ordering.

use std::sync::Arc;
use std::thread;

use wirespan::report::InMemoryReporter;
use wirespan::trace::Component;
use wirespan::TracingContext;

#[test]
fn threads_produce_independent_span_stacks() {
    let reporter = InMemoryReporter::default();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let reporter = reporter.clone();
            thread::spawn(move || {
                let cx = TracingContext::with_reporter(Arc::new(reporter));
                let _guard = cx.attach();
                let current = TracingContext::current();
                assert!(current.ptr_eq(&cx));

                let outer =
                    current.new_exit_span(format!("thread-{i}/outer"), "db:7687", Component::Neo4j);
                let inner =
                    current.new_exit_span(format!("thread-{i}/inner"), "db:7687", Component::Neo4j);
                assert_eq!(inner.parent_span_id(), Some(outer.span_id()));
                drop(inner);
                drop(outer);
                cx.trace_id()
            })
        })
        .collect();

    let trace_ids: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .collect();

    // all traces distinct
    for (i, a) in trace_ids.iter().enumerate() {
        for b in trace_ids.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }

    // no span of one thread ever parents under another thread's trace
    let spans = reporter.finished_spans();
    assert_eq!(spans.len(), 8);
    for span in &spans {
        if let Some(parent) = span.parent_span_id {
            let parent_span = spans
                .iter()
                .find(|s| s.span_id == parent && s.trace_id == span.trace_id)
                .expect("parent must exist within the same trace");
            assert_eq!(parent_span.trace_id, span.trace_id);
        }
    }
}

#[test]
fn report_order_is_fifo_per_producer() {
    let reporter = InMemoryReporter::default();

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let reporter = reporter.clone();
            thread::spawn(move || {
                let cx = TracingContext::with_reporter(Arc::new(reporter));
                for j in 0..10 {
                    let _span =
                        cx.new_exit_span(format!("p{i}-{j:02}"), "db:7687", Component::Neo4j);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    let spans = reporter.finished_spans();
    assert_eq!(spans.len(), 20);
    for i in 0..2 {
        let names: Vec<&str> = spans
            .iter()
            .map(|s| s.operation_name.as_str())
            .filter(|name| name.starts_with(&format!("p{i}-")))
            .collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted, "per-producer order must be preserved");
    }
}
