//! Execution-scoped tracing-context resolution.
//!
//! A [`TracingContext`] owns the active-span stack for one logical trace
//! within one execution unit (a thread, or an async task that carries the
//! context across its polls). [`TracingContext::current`] resolves the
//! context attached to the calling execution unit, lazily creating a
//! per-thread ambient context the first time a thread is observed.
//!
//! Explicit propagation uses [`TracingContext::attach`], which installs a
//! context for a scope and restores the previous one when the returned
//! [`ContextGuard`] drops. Async tasks re-attach their context on every poll
//! via [`FutureContextExt::with_context`].
//!
//! [`FutureContextExt::with_context`]: future_ext::FutureContextExt::with_context

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::report::Reporter;
use crate::trace::{ActiveSpan, Component, SpanId, TraceId};

mod future_ext;

pub use future_ext::{FutureContextExt, StreamContextExt, WithContext};

thread_local! {
    static CURRENT_CONTEXT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

/// The active-span stack for one logical trace within one execution unit.
///
/// Cloning a `TracingContext` clones a handle to the same underlying stack;
/// the stack itself is mutated only through span creation and finalization.
/// A context is conceptually owned by a single execution unit while its spans
/// are open, but the handle is `Send` so an async task can carry it across
/// worker threads.
#[derive(Clone)]
pub struct TracingContext {
    pub(crate) inner: Arc<Mutex<ContextInner>>,
}

pub(crate) struct ContextInner {
    pub(crate) trace_id: TraceId,
    /// Stack of currently open span ids, bottom to top.
    pub(crate) active: Vec<SpanId>,
    pub(crate) next_span_id: u64,
    pub(crate) reporter: Arc<dyn Reporter>,
}

impl TracingContext {
    /// Creates a fresh context reporting to the global reporter.
    ///
    /// The global reporter is snapshotted here; replacing it later does not
    /// affect contexts that already exist.
    pub fn new() -> Self {
        Self::with_reporter(crate::global::reporter())
    }

    /// Creates a fresh context reporting to the given reporter.
    pub fn with_reporter(reporter: Arc<dyn Reporter>) -> Self {
        TracingContext {
            inner: Arc::new(Mutex::new(ContextInner {
                trace_id: TraceId::random(),
                active: Vec::new(),
                next_span_id: 1,
                reporter,
            })),
        }
    }

    /// Returns the context for the calling execution unit.
    ///
    /// If a context has been [`attach`]ed on this thread the innermost one is
    /// returned; otherwise the thread's ambient context is returned, created
    /// lazily the first time the thread is observed. Repeated calls from the
    /// same execution unit yield handles to the same context.
    ///
    /// [`attach`]: TracingContext::attach
    pub fn current() -> Self {
        CURRENT_CONTEXT.with(|stack| stack.borrow().current())
    }

    /// Installs this context as current for the calling thread.
    ///
    /// Dropping the returned [`ContextGuard`] restores the previously current
    /// context. Guards may nest; dropping them out of order is tolerated and
    /// resolved deterministically, with only the top-of-stack drop actually
    /// restoring a previous context.
    pub fn attach(&self) -> ContextGuard {
        let pos = CURRENT_CONTEXT.with(|stack| stack.borrow_mut().push(self.clone()));
        ContextGuard {
            pos,
            _not_send: PhantomData,
        }
    }

    /// Opens a new exit span recording an outbound call to `peer`.
    ///
    /// The span is pushed as the context's current span; its parent is the
    /// previously current span, or nothing when the stack was empty. The
    /// returned guard closes the span on every exit path of its scope.
    ///
    /// `op` must be non-empty; an empty name is debug-asserted and tolerated
    /// in release builds so that tracing never disturbs the wrapped call.
    pub fn new_exit_span(
        &self,
        op: impl Into<String>,
        peer: impl Into<String>,
        component: Component,
    ) -> ActiveSpan {
        let op = op.into();
        debug_assert!(!op.is_empty(), "exit span operation name must be non-empty");
        if op.is_empty() {
            warn!(component = %component, "opening exit span with empty operation name");
        }
        ActiveSpan::begin(self.clone(), op, peer.into(), component)
    }

    /// The id of the trace this context belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.lock().trace_id
    }

    /// Number of currently open spans.
    pub fn depth(&self) -> usize {
        self.lock().active.len()
    }

    /// The id of the currently active span, if any span is open.
    pub fn active_span_id(&self) -> Option<SpanId> {
        self.lock().active.last().copied()
    }

    /// Whether two handles refer to the same context.
    pub fn ptr_eq(&self, other: &TracingContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, ContextInner> {
        // A context's lock is only ever held for a few field accesses, so a
        // poisoned lock means a panic mid-access; propagating the inner state
        // is still sound for plain reads and writes.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for TracingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TracingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("TracingContext")
            .field("trace_id", &inner.trace_id)
            .field("depth", &inner.active.len())
            .finish()
    }
}

/// Restores the previously current context when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    /// Position of the attached context in the thread's context stack.
    pos: u16,
    /// Guards rely on thread locals and must not move across threads.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.pos > ContextStack::BASE_POS && self.pos < ContextStack::OVERFLOW_POS {
            CURRENT_CONTEXT.with(|stack| stack.borrow_mut().pop_pos(self.pos));
        }
    }
}

/// Per-thread registry of attached contexts.
///
/// The bottom of the stack is the thread's ambient context, created when the
/// thread-local is first touched and torn down with the thread. Attached
/// contexts are addressed by position so that guards dropped out of order
/// simply vacate their slot; only popping the top restores a previous
/// context.
struct ContextStack {
    /// The context currently visible to [`TracingContext::current`]. Kept
    /// out of `stack` for cheap access on the hot path.
    current: TracingContext,
    /// Contexts displaced by attaches, with vacated slots left by
    /// out-of-order guard drops.
    stack: Vec<Option<TracingContext>>,
}

impl ContextStack {
    const BASE_POS: u16 = 0;
    const OVERFLOW_POS: u16 = u16::MAX;

    fn current(&self) -> TracingContext {
        self.current.clone()
    }

    fn push(&mut self, cx: TracingContext) -> u16 {
        let next_pos = self.stack.len() + 1;
        if next_pos >= ContextStack::OVERFLOW_POS as usize {
            warn!(
                limit = ContextStack::OVERFLOW_POS,
                "context attach limit reached; attach ignored"
            );
            return ContextStack::OVERFLOW_POS;
        }
        let previous = std::mem::replace(&mut self.current, cx);
        self.stack.push(Some(previous));
        next_pos as u16
    }

    fn pop_pos(&mut self, pos: u16) {
        let len = self.stack.len() as u16;
        if pos == len {
            // Top of the stack: discard slots vacated by out-of-order drops,
            // then restore the nearest surviving context.
            while let Some(None) = self.stack.last() {
                let _ = self.stack.pop();
            }
            if let Some(Some(previous)) = self.stack.pop() {
                self.current = previous;
            }
        } else if pos < len {
            // Out-of-order drop: vacate the slot this guard's context was
            // saved into, so unwinding skips it.
            let _ = self.stack[pos as usize].take();
        } else {
            warn!(
                position = pos,
                stack_length = len,
                "context guard position beyond stack; pop ignored"
            );
        }
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            current: TracingContext::new(),
            stack: Vec::with_capacity(8),
        }
    }
}
