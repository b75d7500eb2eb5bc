//! Compression service - runs the pipeline off the caller's thread

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use flume::Receiver;
use serde::{Deserialize, Serialize};

use super::policy::CompressionLevel;
use super::raster::DocumentLoader;
use super::request::{CancelToken, CompressError, RequestId, WorkerRequest, WorkerResponse};
use super::types::{CompressionRequest, CompressionResult, ProgressEvent};
use super::worker::{PageFailurePolicy, Pipeline, compress_worker};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    RequestId::new(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
}

/// Where requests are executed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Background thread when possible, otherwise the calling thread
    #[default]
    Auto,
    Worker,
    Inline,
}

/// A context could not take the request; the request is handed back
#[derive(Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Unavailable {
    pub request: CompressionRequest,
    pub cause: CompressError,
}

/// Strategy for running a compression request
pub trait ExecutionContext {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    /// Start a request. The request is moved in and only returned through
    /// [`Unavailable`].
    fn submit(&self, request: CompressionRequest) -> Result<CompressionHandle, Unavailable>;
}

/// One dedicated thread per request
#[derive(Clone, Debug)]
pub struct WorkerContext {
    pipeline: Pipeline,
}

impl WorkerContext {
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Whether the target can spawn threads at all
    #[must_use]
    pub const fn threads_supported() -> bool {
        !cfg!(target_family = "wasm")
    }
}

impl ExecutionContext for WorkerContext {
    fn name(&self) -> &'static str {
        "worker"
    }

    fn is_available(&self) -> bool {
        Self::threads_supported()
    }

    fn submit(&self, request: CompressionRequest) -> Result<CompressionHandle, Unavailable> {
        if !self.is_available() {
            return Err(Unavailable {
                request,
                cause: CompressError::unavailable("this target has no thread support"),
            });
        }

        let id = next_request_id();
        let (request_tx, request_rx) = flume::bounded(1);
        let (response_tx, response_rx) = flume::unbounded();
        let cancel = CancelToken::new();

        let pipeline = self.pipeline.clone();
        let worker_cancel = cancel.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("pdfshrink-{}", id.0))
            .spawn(move || compress_worker(pipeline, request_rx, response_tx, worker_cancel));
        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                return Err(Unavailable {
                    request,
                    cause: CompressError::unavailable(format!("failed to spawn worker thread: {e}")),
                });
            }
        };

        // The thread owns the receiving end; bytes only move once it exists
        if let Err(flume::SendError(request)) = request_tx.send(WorkerRequest::from(request)) {
            return Err(Unavailable {
                request: request.into(),
                cause: CompressError::unavailable("worker thread exited before the request"),
            });
        }

        log::debug!("request {id} submitted to worker thread");
        Ok(CompressionHandle::new(id, response_rx, cancel, Some(worker)))
    }
}

/// Runs the request to completion on the calling thread inside `submit`.
///
/// Progress is buffered in the returned handle; cancelling it has no effect
/// on work that already happened.
#[derive(Clone, Debug)]
pub struct InlineContext {
    pipeline: Pipeline,
}

impl InlineContext {
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}

impl ExecutionContext for InlineContext {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn submit(&self, request: CompressionRequest) -> Result<CompressionHandle, Unavailable> {
        let id = next_request_id();
        let (response_tx, response_rx) = flume::unbounded();
        let cancel = CancelToken::new();

        log::debug!("request {id} running inline");
        let mut forward = |event: ProgressEvent| {
            let _ = response_tx.send(WorkerResponse::Progress(event));
        };
        let response = match self.pipeline.run(request, &cancel, &mut forward) {
            Ok(result) => WorkerResponse::Done(result),
            Err(e) => WorkerResponse::Failed(e),
        };
        let _ = response_tx.send(response);

        Ok(CompressionHandle::new(id, response_rx, cancel, None))
    }
}

/// Start `request` on `primary`, falling back to `fallback` when the primary
/// context cannot take it
pub fn submit_with_fallback(
    primary: &dyn ExecutionContext,
    fallback: &dyn ExecutionContext,
    request: CompressionRequest,
) -> Result<CompressionHandle, CompressError> {
    match primary.submit(request) {
        Ok(handle) => Ok(handle),
        Err(Unavailable { request, cause }) => {
            log::warn!(
                "{} execution unavailable ({cause}), falling back to {}",
                primary.name(),
                fallback.name()
            );
            fallback.submit(request).map_err(|e| e.cause)
        }
    }
}

/// Caller's side of one in-flight request
pub struct CompressionHandle {
    id: RequestId,
    responses: Receiver<WorkerResponse>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
    outcome: Option<Result<CompressionResult, CompressError>>,
    terminal_seen: bool,
    cancelled: bool,
}

impl CompressionHandle {
    fn new(
        id: RequestId,
        responses: Receiver<WorkerResponse>,
        cancel: CancelToken,
        worker: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            id,
            responses,
            cancel,
            worker,
            outcome: None,
            terminal_seen: false,
            cancelled: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Whether [`CompressionHandle::wait`] would return without blocking
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.terminal_seen || self.cancelled
    }

    /// Drain progress received so far without blocking.
    ///
    /// A terminal message found while draining is kept for `wait`.
    pub fn poll_progress(&mut self) -> Vec<ProgressEvent> {
        let mut events = vec![];
        if self.is_finished() {
            return events;
        }

        loop {
            match self.responses.try_recv() {
                Ok(WorkerResponse::Progress(event)) => events.push(event),
                Ok(WorkerResponse::Done(result)) => {
                    self.settle(Ok(result));
                    break;
                }
                Ok(WorkerResponse::Failed(e)) => {
                    self.settle(Err(e));
                    break;
                }
                Err(flume::TryRecvError::Empty) => break,
                Err(flume::TryRecvError::Disconnected) => {
                    self.settle(Err(CompressError::WorkerLost));
                    break;
                }
            }
        }

        events
    }

    /// Stop the request. The worker notices at its next page boundary; the
    /// handle stops listening right away.
    pub fn cancel(&mut self) {
        if self.terminal_seen || self.cancelled {
            return;
        }
        log::debug!("request {} cancelled", self.id);
        self.cancel.cancel();
        self.cancelled = true;
        // Detach: the thread exits on its own after the cancellation point
        self.worker.take();
    }

    /// Block until the request finishes
    pub fn wait(self) -> Result<CompressionResult, CompressError> {
        self.wait_with_progress(|_| {})
    }

    /// Block until the request finishes, handing each progress event to
    /// `on_progress` in order
    pub fn wait_with_progress(
        mut self,
        mut on_progress: impl FnMut(ProgressEvent),
    ) -> Result<CompressionResult, CompressError> {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        if self.cancelled {
            return Err(CompressError::Cancelled);
        }

        loop {
            match self.responses.recv() {
                Ok(WorkerResponse::Progress(event)) => on_progress(event),
                Ok(WorkerResponse::Done(result)) => {
                    self.terminal_seen = true;
                    self.join_worker();
                    return Ok(result);
                }
                Ok(WorkerResponse::Failed(e)) => {
                    self.terminal_seen = true;
                    self.join_worker();
                    return Err(e);
                }
                Err(flume::RecvError::Disconnected) => {
                    self.terminal_seen = true;
                    self.join_worker();
                    return Err(CompressError::WorkerLost);
                }
            }
        }
    }

    fn settle(&mut self, outcome: Result<CompressionResult, CompressError>) {
        self.terminal_seen = true;
        self.outcome = Some(outcome);
        self.join_worker();
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("worker thread for request {} panicked", self.id);
            }
        }
    }
}

impl std::fmt::Debug for CompressionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionHandle")
            .field("id", &self.id)
            .field("terminal_seen", &self.terminal_seen)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

impl Drop for CompressionHandle {
    fn drop(&mut self) {
        if !self.terminal_seen {
            self.cancel.cancel();
        }
    }
}

/// Entry point for callers: picks an execution context and runs requests
#[derive(Clone, Debug)]
pub struct Compressor {
    pipeline: Pipeline,
    mode: ExecutionMode,
}

impl Compressor {
    #[must_use]
    pub fn new(loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            pipeline: Pipeline::new(loader),
            mode: ExecutionMode::default(),
        }
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: PageFailurePolicy) -> Self {
        self.pipeline = self.pipeline.with_failure_policy(policy);
        self
    }

    #[must_use]
    pub fn with_execution(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn execution(&self) -> ExecutionMode {
        self.mode
    }

    /// Start a request and return its handle
    pub fn submit(&self, request: CompressionRequest) -> Result<CompressionHandle, CompressError> {
        let worker = WorkerContext::new(self.pipeline.clone());
        let inline = InlineContext::new(self.pipeline.clone());
        match self.mode {
            ExecutionMode::Auto => submit_with_fallback(&worker, &inline, request),
            ExecutionMode::Worker => worker.submit(request).map_err(|e| e.cause),
            ExecutionMode::Inline => inline.submit(request).map_err(|e| e.cause),
        }
    }

    /// Run a request to completion
    pub fn compress(
        &self,
        request: CompressionRequest,
        on_progress: impl FnMut(ProgressEvent),
    ) -> Result<CompressionResult, CompressError> {
        self.submit(request)?.wait_with_progress(on_progress)
    }
}

/// Compress a PDF with MuPDF, on a background thread when the platform
/// allows it
#[cfg(feature = "pdf")]
pub fn compress(
    source_bytes: Vec<u8>,
    level: CompressionLevel,
    fast_mode: bool,
    on_progress: impl FnMut(ProgressEvent),
) -> Result<CompressionResult, CompressError> {
    Compressor::new(Arc::new(super::raster::MupdfLoader)).compress(
        CompressionRequest::new(source_bytes, level, fast_mode),
        on_progress,
    )
}
