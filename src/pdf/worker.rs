//! Compression pipeline - runs on a worker thread or inline

use std::sync::Arc;

use flume::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use super::assembler::PdfAssembler;
use super::encoder::encode;
use super::policy::decide;
use super::raster::DocumentLoader;
use super::request::{CancelToken, CompressError, WorkerRequest, WorkerResponse};
use super::state::{Command, Effect, PipelineState, ProgressTracker};
use super::types::{CompressionRequest, CompressionResult, EncodedPage, ProgressEvent};

/// What to do when a single page fails to render or encode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFailurePolicy {
    /// Leave the page out and keep going
    #[default]
    Skip,
    /// Fail the whole request
    Abort,
}

/// Decode, rasterize, encode and reassemble one document.
///
/// Holds no per-request state; every [`Pipeline::run`] starts from scratch.
#[derive(Clone)]
pub struct Pipeline {
    loader: Arc<dyn DocumentLoader>,
    failure_policy: PageFailurePolicy,
}

impl Pipeline {
    #[must_use]
    pub fn new(loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            loader,
            failure_policy: PageFailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: PageFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn failure_policy(&self) -> PageFailurePolicy {
        self.failure_policy
    }

    /// Run a request to completion, reporting progress as it goes.
    ///
    /// `cancel` is checked between pages and before reassembly.
    pub fn run(
        &self,
        request: CompressionRequest,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<CompressionResult, CompressError> {
        let mut run = Run {
            state: PipelineState::new(),
            tracker: ProgressTracker::new(),
            cancel: cancel.clone(),
            on_progress,
        };

        let result = run.execute(self.loader.as_ref(), self.failure_policy, request);

        match &result {
            Ok(result) => log::info!(
                "compressed {} -> {} bytes, {} page(s), {} skipped",
                result.original_size,
                result.compressed_size,
                result.page_count,
                result.skipped_pages.len()
            ),
            Err(CompressError::Cancelled) => log::info!("compression cancelled"),
            Err(e) => log::error!("compression failed: {e}"),
        }
        if let Err(e) = &result {
            if run.state.apply(Command::Fail(e.to_string())).is_err() {
                log::debug!("pipeline already terminal: {}", run.state.stage());
            }
        }

        result
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

/// Per-request state, dropped when the request ends
struct Run<'a> {
    state: PipelineState,
    tracker: ProgressTracker,
    cancel: CancelToken,
    on_progress: &'a mut dyn FnMut(ProgressEvent),
}

impl Run<'_> {
    fn execute(
        &mut self,
        loader: &dyn DocumentLoader,
        failure_policy: PageFailurePolicy,
        request: CompressionRequest,
    ) -> Result<CompressionResult, CompressError> {
        let CompressionRequest {
            source_bytes,
            level,
            fast_mode,
        } = request;
        let original_size = source_bytes.len();
        log::info!("compressing {original_size} bytes at {level} (fast mode: {fast_mode})");

        self.step(Command::Start)?;
        let doc = loader.open(&source_bytes)?;
        drop(source_bytes);

        let page_count = doc.page_count();
        self.step(Command::Decoded { page_count })?;

        let settings = decide(level, page_count, fast_mode);
        let jpeg_quality = settings.jpeg_quality();
        log::debug!(
            "{page_count} page(s), scale {:.2}, jpeg quality {jpeg_quality}",
            settings.scale
        );

        let mut encoded: Vec<EncodedPage> = Vec::with_capacity(page_count);
        let mut skipped_pages = Vec::new();
        for page_index in 0..page_count {
            self.check_cancelled()?;

            let page = doc
                .render_page(page_index, settings.scale)
                .and_then(|surface| encode(surface, page_index, jpeg_quality));
            match page {
                Ok(page) => encoded.push(page),
                Err(e) if e.is_page_error() && failure_policy == PageFailurePolicy::Skip => {
                    log::warn!("skipping page index {page_index}: {e}");
                    skipped_pages.push(page_index);
                }
                Err(e) => return Err(e),
            }

            self.step(Command::PageCompleted)?;
        }
        drop(doc);

        self.check_cancelled()?;
        let output_pages = encoded.len();
        let pdf_bytes = self.assemble(encoded, PdfAssembler::finish)?;

        Ok(CompressionResult::new(
            pdf_bytes,
            original_size,
            output_pages,
            skipped_pages,
            settings,
        ))
    }

    /// Embed `pages` in order and serialize them with `serialize`.
    ///
    /// The last page's progress step is held back until serialization has
    /// succeeded.
    fn assemble(
        &mut self,
        pages: Vec<EncodedPage>,
        serialize: impl FnOnce(PdfAssembler) -> Result<Vec<u8>, CompressError>,
    ) -> Result<Vec<u8>, CompressError> {
        let total = pages.len();
        self.step(Command::BeginReassembly { pages: total })?;

        let mut assembler = PdfAssembler::new();
        for (i, page) in pages.into_iter().enumerate() {
            assembler.add_page(page)?;
            if i + 1 < total {
                self.step(Command::PageEmbedded)?;
            }
        }
        let pdf_bytes = serialize(assembler)?;

        if total > 0 {
            self.step(Command::PageEmbedded)?;
        }
        self.step(Command::Finish)?;
        Ok(pdf_bytes)
    }

    fn step(&mut self, cmd: Command) -> Result<(), CompressError> {
        let effects = self
            .state
            .apply(cmd)
            .map_err(|e| CompressError::reassembly(e.to_string()))?;
        for effect in effects {
            match effect {
                Effect::Progress(percent) => {
                    if let Some(event) = self.tracker.report(percent) {
                        (self.on_progress)(event);
                    }
                }
            }
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), CompressError> {
        if self.cancel.is_cancelled() {
            Err(CompressError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Worker thread body: serves exactly one request, then exits
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn compress_worker(
    pipeline: Pipeline,
    requests: Receiver<WorkerRequest>,
    responses: Sender<WorkerResponse>,
    cancel: CancelToken,
) {
    let Ok(request) = requests.recv() else {
        log::debug!("worker exiting: request channel closed before a request arrived");
        return;
    };

    let mut forward = |event: ProgressEvent| {
        let _ = responses.send(WorkerResponse::Progress(event));
    };
    let response = match pipeline.run(request.into(), &cancel, &mut forward) {
        Ok(result) => WorkerResponse::Done(result),
        Err(e) => WorkerResponse::Failed(e),
    };
    let _ = responses.send(response);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::policy::CompressionLevel;
    use crate::test_utils::ScriptedLoader;

    fn run(
        loader: ScriptedLoader,
        policy: PageFailurePolicy,
    ) -> (Result<CompressionResult, CompressError>, Vec<f32>) {
        let pipeline = Pipeline::new(Arc::new(loader)).with_failure_policy(policy);
        let mut seen = Vec::new();
        let result = pipeline.run(
            CompressionRequest::new(b"%PDF-1.7 scripted".to_vec(), CompressionLevel::Medium, false),
            &CancelToken::new(),
            &mut |e: ProgressEvent| seen.push(e.percent),
        );
        (result, seen)
    }

    #[test]
    fn all_pages_succeed() {
        let (result, seen) = run(ScriptedLoader::new(4), PageFailurePolicy::Skip);
        let result = result.unwrap();
        assert_eq!(result.page_count, 4);
        assert!(result.skipped_pages.is_empty());
        assert_eq!(result.compressed_size, result.pdf_bytes.len());
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&100.0));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn skip_policy_drops_failing_page() {
        let loader = ScriptedLoader::new(3).fail_render(1);
        let (result, seen) = run(loader, PageFailurePolicy::Skip);
        let result = result.unwrap();
        assert_eq!(result.page_count, 2);
        assert_eq!(result.skipped_pages, vec![1]);
        assert!(seen.contains(&65.0));
    }

    #[test]
    fn abort_policy_fails_on_first_page_error() {
        let loader = ScriptedLoader::new(3).fail_render(1);
        let (result, seen) = run(loader, PageFailurePolicy::Abort);
        let err = result.unwrap_err();
        assert!(matches!(err, CompressError::Render { page_index: 1, .. }));
        assert!(seen.iter().all(|p| *p < 65.0));
    }

    #[test]
    fn every_page_failing_is_a_reassembly_error() {
        let loader = ScriptedLoader::new(2).fail_render(0).fail_render(1);
        let (result, _) = run(loader, PageFailurePolicy::Skip);
        assert!(matches!(result, Err(CompressError::Reassembly { .. })));
    }

    #[test]
    fn corrupt_document_stops_after_start() {
        let (result, seen) = run(ScriptedLoader::corrupt(), PageFailurePolicy::Skip);
        assert!(matches!(result, Err(CompressError::CorruptDocument { .. })));
        assert_eq!(seen, vec![0.0]);
    }

    #[test]
    fn pre_cancelled_request_produces_no_result() {
        let pipeline = Pipeline::new(Arc::new(ScriptedLoader::new(2)));
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = pipeline.run(
            CompressionRequest::new(vec![1, 2, 3], CompressionLevel::Low, false),
            &cancel,
            &mut |_: ProgressEvent| {},
        );
        assert!(matches!(result, Err(CompressError::Cancelled)));
    }

    #[test]
    fn serialization_failure_never_reports_completion() {
        let mut seen = Vec::new();
        let mut on_progress = |e: ProgressEvent| seen.push(e.percent);
        let mut run = Run {
            state: PipelineState::new(),
            tracker: ProgressTracker::new(),
            cancel: CancelToken::new(),
            on_progress: &mut on_progress,
        };
        run.step(Command::Start).unwrap();
        run.step(Command::Decoded { page_count: 2 }).unwrap();
        run.step(Command::PageCompleted).unwrap();
        run.step(Command::PageCompleted).unwrap();

        let pages = (0..2)
            .map(|i| encode(crate::pdf::types::PageSurface::blank(8, 8), i, 60).unwrap())
            .collect();
        let err = run
            .assemble(pages, |_| Err(CompressError::reassembly("disk full")))
            .unwrap_err();
        drop(run);

        assert!(matches!(err, CompressError::Reassembly { .. }));
        assert_eq!(seen.last(), Some(&82.5));
    }

    #[test]
    fn worker_sends_progress_then_one_terminal_message() {
        let (request_tx, request_rx) = flume::bounded(1);
        let (response_tx, response_rx) = flume::unbounded();
        request_tx
            .send(WorkerRequest::from(CompressionRequest::new(
                vec![0; 16],
                CompressionLevel::High,
                true,
            )))
            .unwrap();

        compress_worker(
            Pipeline::new(Arc::new(ScriptedLoader::new(2))),
            request_rx,
            response_tx,
            CancelToken::new(),
        );

        let messages: Vec<WorkerResponse> = response_rx.drain().collect();
        let (last, rest) = messages.split_last().unwrap();
        assert!(matches!(last, WorkerResponse::Done(_)));
        assert!(rest.iter().all(|m| !m.is_terminal()));
    }
}
