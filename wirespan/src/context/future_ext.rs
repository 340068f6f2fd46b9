use std::pin::Pin;
use std::task::Context as TaskContext;
use std::task::Poll;

use futures_core::Stream;
use pin_project_lite::pin_project;

use crate::context::TracingContext;

pin_project! {
    /// A future or stream that carries a [`TracingContext`].
    ///
    /// The context is attached to the polling thread for the duration of each
    /// poll, so spans opened inside the wrapped computation land on the
    /// carried context no matter which worker thread resumes it.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        cx: TracingContext,
    }
}

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.cx.attach();
        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.cx.attach();
        T::poll_next(this.inner, task_cx)
    }
}

impl<F: std::future::Future> FutureContextExt for F {}

/// Extension trait tying futures to a tracing context.
pub trait FutureContextExt: Sized {
    /// Attaches the provided [`TracingContext`] to this future.
    ///
    /// The context is current while the future is being polled.
    fn with_context(self, cx: TracingContext) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the caller's current [`TracingContext`] to this future.
    ///
    /// The context is current while the future is being polled.
    fn with_current_context(self) -> WithContext<Self> {
        self.with_context(TracingContext::current())
    }
}

impl<S: Stream> StreamContextExt for S {}

/// Extension trait tying streams to a tracing context.
pub trait StreamContextExt: Sized {
    /// Attaches the provided [`TracingContext`] to this stream.
    ///
    /// The context is current while the stream is being polled.
    fn with_context(self, cx: TracingContext) -> WithContext<Self> {
        WithContext { inner: self, cx }
    }

    /// Attaches the caller's current [`TracingContext`] to this stream.
    ///
    /// The context is current while the stream is being polled.
    fn with_current_context(self) -> WithContext<Self> {
        self.with_context(TracingContext::current())
    }
}
