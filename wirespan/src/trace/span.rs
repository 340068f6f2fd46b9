use std::error::Error;
use std::time::SystemTime;

use tracing::warn;

use super::{Component, Layer, SpanData, SpanId, SpanKind, Tag, TraceId};
use crate::context::TracingContext;

/// A scope guard over one open span.
///
/// Created by [`TracingContext::new_exit_span`]. While the guard is live the
/// span is open: tags can be attached, the layer set, and failures recorded.
/// Dropping the guard closes the span exactly once on every exit path,
/// normal return, early `?` return, or panic unwind, records the end time,
/// pops the span from its context's active stack, and hands the finished
/// [`SpanData`] to the context's reporter.
///
/// A span is owned by the execution unit that opened it; the guard is not
/// meant to be shared while open.
#[derive(Debug)]
pub struct ActiveSpan {
    context: TracingContext,
    data: Option<SpanData>,
    fail_on_drop: bool,
}

impl ActiveSpan {
    pub(crate) fn begin(
        context: TracingContext,
        op: String,
        peer: String,
        component: Component,
    ) -> Self {
        let (trace_id, span_id, parent_span_id) = {
            let mut inner = context.lock();
            let span_id = SpanId::new(inner.next_span_id);
            inner.next_span_id += 1;
            let parent = inner.active.last().copied();
            inner.active.push(span_id);
            (inner.trace_id, span_id, parent)
        };
        let start_time = SystemTime::now();
        ActiveSpan {
            context,
            data: Some(SpanData {
                trace_id,
                span_id,
                parent_span_id,
                operation_name: op,
                peer,
                kind: SpanKind::Exit,
                layer: Layer::Unknown,
                component,
                start_time,
                end_time: start_time,
                tags: Default::default(),
                errored: false,
            }),
            fail_on_drop: false,
        }
    }

    /// The trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.with_data(|d| d.trace_id)
    }

    /// This span's id.
    pub fn span_id(&self) -> SpanId {
        self.with_data(|d| d.span_id)
    }

    /// The parent span's id, `None` for a root span.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.with_data(|d| d.parent_span_id)
    }

    /// The operation name this span was opened with.
    pub fn operation_name(&self) -> &str {
        match &self.data {
            Some(d) => &d.operation_name,
            None => "",
        }
    }

    /// Attaches a tag, overwriting any previous tag of the same kind.
    pub fn tag(&mut self, tag: Tag) {
        if let Some(data) = &mut self.data {
            data.tags.insert(tag);
        }
    }

    /// Sets the span's layer classification.
    pub fn set_layer(&mut self, layer: Layer) {
        if let Some(data) = &mut self.data {
            data.layer = layer;
        }
    }

    /// Marks the span errored and attaches the failure detail as a tag.
    ///
    /// The failure itself is not consumed or suppressed; callers record it
    /// here and then propagate it unchanged.
    pub fn record_error(&mut self, err: &dyn Error) {
        if let Some(data) = &mut self.data {
            data.errored = true;
            data.tags.insert(Tag::error_message(err.to_string()));
        }
    }

    /// Whether a failure has been recorded on this span.
    pub fn is_errored(&self) -> bool {
        self.with_data(|d| d.errored)
    }

    /// Controls how an unfinished drop of this guard is classified.
    ///
    /// When enabled, dropping the guard marks the span errored with a
    /// `cancelled before completion` detail. Wrappers around cancellable
    /// operations enable this before the operation and disable it once the
    /// operation has produced a result, so a task cancelled mid-flight still
    /// finalizes its span as a failure exit. [`Traced`] does this
    /// automatically.
    ///
    /// [`Traced`]: crate::trace::Traced
    pub fn fail_on_drop(&mut self, enabled: bool) {
        self.fail_on_drop = enabled;
    }

    pub(crate) fn context(&self) -> &TracingContext {
        &self.context
    }

    fn with_data<T>(&self, f: impl FnOnce(&SpanData) -> T) -> T {
        // `data` is only vacated inside `finalize`, which runs at most once
        // and is immediately followed by drop.
        f(self
            .data
            .as_ref()
            .expect("span data present while guard is live"))
    }

    fn finalize(&mut self) {
        let Some(mut data) = self.data.take() else {
            return;
        };
        if self.fail_on_drop {
            data.errored = true;
            data.tags
                .insert(Tag::error_message("cancelled before completion"));
        }
        if std::thread::panicking() {
            data.errored = true;
            if data.tags.get(super::TagKind::ErrorMessage).is_none() {
                data.tags
                    .insert(Tag::error_message("panicked during traced operation"));
            }
        }
        data.end_time = SystemTime::now();

        let reporter = {
            let mut inner = self.context.lock();
            match inner.active.last() {
                Some(&top) if top == data.span_id => {
                    let _ = inner.active.pop();
                }
                _ => {
                    // Stack-discipline violation: this span is being closed
                    // before a child of it. Remove it from wherever it sits;
                    // the children keep their already-recorded parent ids and
                    // close normally later.
                    warn!(
                        span_id = data.span_id.to_u64(),
                        operation = %data.operation_name,
                        "span closed out of creation order; removed from active stack"
                    );
                    inner.active.retain(|id| *id != data.span_id);
                }
            }
            inner.reporter.clone()
        };
        // Reporting happens outside the context lock; reporter failures are
        // the reporter's to log and must never reach the instrumented caller.
        reporter.report(data);
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.finalize();
    }
}
