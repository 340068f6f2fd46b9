use std::pin::Pin;
use std::task::Context as TaskContext;
use std::task::Poll;

use pin_project_lite::pin_project;

use crate::context::TracingContext;
use crate::trace::ActiveSpan;

pin_project! {
    /// A future whose execution is wrapped in a span.
    ///
    /// The span's context is attached for every poll, so spans opened inside
    /// the wrapped future nest under it regardless of which worker thread
    /// resumes the task. Finalization runs identically on every outcome:
    ///
    /// - the future completes: the span closes as it stands (errored only if
    ///   a failure was recorded on it);
    /// - the future is dropped before completing, i.e. the task was
    ///   cancelled: the span closes marked errored with a cancellation
    ///   detail.
    #[derive(Debug)]
    pub struct Traced<F> {
        #[pin]
        inner: F,
        span: Option<ActiveSpan>,
        cx: TracingContext,
    }
}

impl<F: std::future::Future> std::future::Future for Traced<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.attach();
        match this.inner.poll(task_cx) {
            Poll::Ready(output) => {
                if let Some(mut span) = this.span.take() {
                    // Completed: close as a normal scope exit while the
                    // context is still attached.
                    span.fail_on_drop(false);
                }
                Poll::Ready(output)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F: std::future::Future> FutureTraceExt for F {}

/// Extension trait wrapping futures in a span.
pub trait FutureTraceExt: Sized {
    /// Runs this future inside the given span.
    ///
    /// The span must stay open for the future's whole lifetime, so the guard
    /// is moved into the wrapper; use [`TracingContext::new_exit_span`] to
    /// open it immediately before wrapping.
    fn in_span(self, mut span: ActiveSpan) -> Traced<Self> {
        let cx = span.context().clone();
        span.fail_on_drop(true);
        Traced {
            inner: self,
            span: Some(span),
            cx,
        }
    }
}
