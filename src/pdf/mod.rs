//! PDF recompression pipeline

pub mod assembler;
pub mod encoder;
pub mod estimate;
mod policy;
mod raster;
mod request;
mod service;
mod state;
mod types;
mod worker;

pub use assembler::{PdfAssembler, STRIPPED_METADATA, build_pdf};
pub use encoder::encode;
pub use estimate::{
    Recommendation, SizeEstimate, estimate_compressed_size, format_file_size, recommend_level,
    savings_percent,
};
pub use policy::{
    CompressionLevel, FAST_MODE_SCALE_CAP, PAGE_COUNT_CAPS, RenderSettings, UnknownLevel, decide,
};
#[cfg(feature = "pdf")]
pub use raster::MupdfLoader;
pub use raster::{
    DocumentLoader, MAX_SURFACE_AREA, MAX_SURFACE_SIDE, PageDocument, surface_size,
};
pub use request::{
    CancelToken, CompressError, RequestId, WorkerMessage, WorkerRequest, WorkerResponse,
};
#[cfg(feature = "pdf")]
pub use service::compress;
pub use service::{
    CompressionHandle, Compressor, ExecutionContext, ExecutionMode, InlineContext, Unavailable,
    WorkerContext, submit_with_fallback,
};
pub use state::{Command, Effect, IllegalTransition, PipelineStage, PipelineState, ProgressTracker};
pub use types::*;
pub use worker::{PageFailurePolicy, Pipeline, compress_worker};
