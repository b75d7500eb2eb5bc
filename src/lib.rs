pub mod cli;
pub mod filename;
pub mod panic_handler;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use pdf::{
    CompressError, CompressionHandle, CompressionLevel, CompressionRequest, CompressionResult,
    Compressor, ExecutionMode, PageFailurePolicy, ProgressEvent, RenderSettings,
};
#[cfg(feature = "pdf")]
pub use pdf::{MupdfLoader, compress};
