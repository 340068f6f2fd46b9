//! Completed-span reporting pipeline.
//!
//! When an [`ActiveSpan`] guard leaves scope the finished [`SpanData`] is
//! handed to the owning context's [`Reporter`]. Reporters are the one shared
//! resource of the engine: many execution units enqueue concurrently, with
//! FIFO ordering per producer and no cross-producer guarantees. A reporter
//! failure is logged and dropped; it must never surface to the instrumented
//! caller.
//!
//! Built-in implementations:
//!
//! - [`NoopReporter`]: discards everything, the default until a reporter is
//!   installed via [`crate::global::set_reporter`].
//! - [`InMemoryReporter`]: collects spans for inspection in tests.
//! - [`QueueReporter`]: bounded queue drained by a dedicated thread into a
//!   [`SpanExporter`]; full queues drop spans and count them.
//!
//! [`ActiveSpan`]: crate::trace::ActiveSpan

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::trace::SpanData;

/// Maximum number of spans awaiting export.
pub(crate) const ENV_QUEUE_SIZE: &str = "WIRESPAN_REPORT_QUEUE_SIZE";
pub(crate) const DEFAULT_QUEUE_SIZE: usize = 2_048;
/// Maximum number of spans handed to the exporter at once.
pub(crate) const ENV_MAX_BATCH_SIZE: &str = "WIRESPAN_REPORT_MAX_BATCH_SIZE";
pub(crate) const DEFAULT_MAX_BATCH_SIZE: usize = 512;
/// Delay between two scheduled exports of a partially filled batch.
pub(crate) const ENV_SCHEDULE_DELAY_MILLIS: &str = "WIRESPAN_REPORT_SCHEDULE_DELAY_MILLIS";
pub(crate) const DEFAULT_SCHEDULE_DELAY_MILLIS: u64 = 5_000;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures raised by the reporting pipeline.
///
/// These stay inside the pipeline: span finalization swallows them after
/// logging, and only explicit `force_flush`/`shutdown` calls observe them.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReportError {
    /// The reporter has already been shut down.
    #[error("reporter already shut down")]
    AlreadyShutdown,
    /// The drain thread went away.
    #[error("reporting channel closed")]
    ChannelClosed,
    /// The queue had no room for a control message.
    #[error("report queue full")]
    QueueFull,
    /// The operation did not finish in time.
    #[error("reporting operation timed out after {0:?}")]
    Timeout(Duration),
    /// The exporter rejected a batch.
    #[error("span export failed: {0}")]
    ExportFailed(String),
}

/// Receives finished spans from span finalization.
///
/// `report` is called synchronously on the closing execution unit and must
/// not block meaningfully or panic.
pub trait Reporter: Send + Sync + fmt::Debug {
    /// Accepts one finished span.
    fn report(&self, span: SpanData);

    /// Blocks until previously reported spans have been handed downstream.
    fn force_flush(&self) -> Result<(), ReportError> {
        Ok(())
    }

    /// Releases any resources. Safe to call more than once.
    fn shutdown(&self) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Exports batches of finished spans out of the process.
pub trait SpanExporter: Send + fmt::Debug {
    /// Exports a batch of spans.
    fn export(&mut self, batch: Vec<SpanData>) -> Result<(), ReportError>;

    /// Releases exporter resources.
    fn shutdown(&mut self) {}
}

/// A reporter that discards every span.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn report(&self, _span: SpanData) {}
}

/// A reporter that stores finished spans in memory, for tests.
///
/// Clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryReporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemoryReporter {
    /// Returns the spans finished so far, in report order.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.lock().clone()
    }

    /// Clears the stored spans.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SpanData>> {
        match self.spans.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Reporter for InMemoryReporter {
    fn report(&self, span: SpanData) {
        self.lock().push(span);
    }
}

/// A span exporter that emits each span as a `tracing` debug event.
///
/// Useful as a development sink when no out-of-process backend is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingSpanExporter;

impl SpanExporter for LoggingSpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> Result<(), ReportError> {
        for span in batch {
            debug!(
                trace_id = %span.trace_id,
                span_id = span.span_id.to_u64(),
                operation = %span.operation_name,
                peer = %span.peer,
                duration_micros = span.duration().as_micros() as u64,
                errored = span.errored,
                "span finished"
            );
        }
        Ok(())
    }
}

/// Sizing and scheduling knobs for [`QueueReporter`].
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Queue capacity; spans reported beyond it are dropped and counted.
    pub max_queue_size: usize,
    /// Largest batch handed to the exporter in one call.
    pub max_export_batch_size: usize,
    /// How long a partially filled batch may wait before export.
    pub schedule_delay: Duration,
}

impl Default for QueueConfig {
    /// Defaults, overridable through the `WIRESPAN_REPORT_*` environment
    /// variables. Unparsable values fall back to the default.
    fn default() -> Self {
        let max_queue_size = env_usize(ENV_QUEUE_SIZE, DEFAULT_QUEUE_SIZE);
        QueueConfig {
            max_queue_size,
            max_export_batch_size: env_usize(ENV_MAX_BATCH_SIZE, DEFAULT_MAX_BATCH_SIZE)
                .min(max_queue_size),
            schedule_delay: Duration::from_millis(env_u64(
                ENV_SCHEDULE_DELAY_MILLIS,
                DEFAULT_SCHEDULE_DELAY_MILLIS,
            )),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "unparsable value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "unparsable value, using default");
            default
        }),
        Err(_) => default,
    }
}

enum QueueMessage {
    Span(SpanData),
    Flush(SyncSender<Result<(), ReportError>>),
    Shutdown(SyncSender<Result<(), ReportError>>),
}

/// A reporter backed by a bounded queue and a dedicated drain thread.
///
/// `report` enqueues without blocking; a full queue drops the span, counts
/// it, and warns once. The drain thread batches spans up to the configured
/// batch size or schedule delay and hands them to the exporter.
#[derive(Debug)]
pub struct QueueReporter {
    sender: SyncSender<QueueMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    dropped_spans: AtomicUsize,
}

impl QueueReporter {
    /// Spawns the drain thread and returns the reporter.
    pub fn new<E>(exporter: E, config: QueueConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(config.max_queue_size);
        let handle = thread::Builder::new()
            .name("wirespan-report".to_string())
            .spawn(move || drain_loop(exporter, receiver, config))
            .expect("failed to spawn span reporting thread");
        QueueReporter {
            sender,
            handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
            dropped_spans: AtomicUsize::new(0),
        }
    }

    /// Spawns a reporter with [`QueueConfig::default`].
    pub fn with_default_config<E>(exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        Self::new(exporter, QueueConfig::default())
    }

    /// Number of spans dropped because the queue was full.
    pub fn dropped_spans(&self) -> usize {
        self.dropped_spans.load(Ordering::Relaxed)
    }

    fn roundtrip(
        &self,
        make: impl FnOnce(SyncSender<Result<(), ReportError>>) -> QueueMessage,
        timeout: Duration,
        blocking: bool,
    ) -> Result<(), ReportError> {
        let (ack, response) = mpsc::sync_channel(1);
        if blocking {
            self.sender
                .send(make(ack))
                .map_err(|_| ReportError::ChannelClosed)?;
        } else {
            self.sender.try_send(make(ack)).map_err(|err| match err {
                TrySendError::Full(_) => ReportError::QueueFull,
                TrySendError::Disconnected(_) => ReportError::ChannelClosed,
            })?;
        }
        match response.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ReportError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ReportError::ChannelClosed),
        }
    }
}

impl Reporter for QueueReporter {
    fn report(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }
        match self.sender.try_send(QueueMessage::Span(span)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped_spans.fetch_add(1, Ordering::Relaxed);
                if dropped == 0 {
                    warn!("report queue full, dropping spans; this is logged once");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("report queue receiver gone, dropping span");
            }
        }
    }

    fn force_flush(&self) -> Result<(), ReportError> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(ReportError::AlreadyShutdown);
        }
        self.roundtrip(QueueMessage::Flush, FLUSH_TIMEOUT, false)
    }

    fn shutdown(&self) -> Result<(), ReportError> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(ReportError::AlreadyShutdown);
        }
        let result = self.roundtrip(QueueMessage::Shutdown, SHUTDOWN_TIMEOUT, true);
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
        result
    }
}

impl Drop for QueueReporter {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.shutdown() {
                debug!(error = %err, "queue reporter shutdown on drop failed");
            }
        }
    }
}

fn drain_loop(mut exporter: impl SpanExporter, receiver: Receiver<QueueMessage>, config: QueueConfig) {
    let mut batch = Vec::with_capacity(config.max_export_batch_size);
    loop {
        match receiver.recv_timeout(config.schedule_delay) {
            Ok(QueueMessage::Span(span)) => {
                batch.push(span);
                if batch.len() >= config.max_export_batch_size {
                    export_batch(&mut exporter, &mut batch);
                }
            }
            Ok(QueueMessage::Flush(ack)) => {
                let result = try_export_batch(&mut exporter, &mut batch);
                let _ = ack.send(result);
            }
            Ok(QueueMessage::Shutdown(ack)) => {
                let result = try_export_batch(&mut exporter, &mut batch);
                exporter.shutdown();
                let _ = ack.send(result);
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                export_batch(&mut exporter, &mut batch);
            }
            Err(RecvTimeoutError::Disconnected) => {
                export_batch(&mut exporter, &mut batch);
                exporter.shutdown();
                return;
            }
        }
    }
}

fn export_batch(exporter: &mut impl SpanExporter, batch: &mut Vec<SpanData>) {
    if let Err(err) = try_export_batch(exporter, batch) {
        debug!(error = %err, "span export failed");
    }
}

fn try_export_batch(
    exporter: &mut impl SpanExporter,
    batch: &mut Vec<SpanData>,
) -> Result<(), ReportError> {
    if batch.is_empty() {
        return Ok(());
    }
    exporter.export(std::mem::take(batch))
}
