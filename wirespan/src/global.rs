//! Process-wide reporter registry.
//!
//! Contexts created through [`TracingContext::new`] or
//! [`TracingContext::current`] snapshot the reporter installed here at
//! creation time. Until one is installed, spans go to a [`NoopReporter`].
//! Tests should prefer [`TracingContext::with_reporter`] over mutating the
//! global registry.
//!
//! [`TracingContext::new`]: crate::context::TracingContext::new
//! [`TracingContext::current`]: crate::context::TracingContext::current
//! [`TracingContext::with_reporter`]: crate::context::TracingContext::with_reporter

use std::sync::{Arc, OnceLock, RwLock};

use crate::report::{NoopReporter, Reporter};

fn registry() -> &'static RwLock<Arc<dyn Reporter>> {
    static REGISTRY: OnceLock<RwLock<Arc<dyn Reporter>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Arc::new(NoopReporter)))
}

/// Installs the process-wide default reporter, returning the previous one.
///
/// Only contexts created after this call observe the new reporter.
pub fn set_reporter(reporter: Arc<dyn Reporter>) -> Arc<dyn Reporter> {
    let mut slot = match registry().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    std::mem::replace(&mut *slot, reporter)
}

/// The currently installed process-wide default reporter.
pub fn reporter() -> Arc<dyn Reporter> {
    match registry().read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
