//! Request, response and error types shared by the pipeline and its host

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use super::policy::CompressionLevel;
use super::types::{CompressionRequest, CompressionResult, ProgressEvent};

/// Unique identifier for compression requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors produced while compressing a document
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("corrupt document: {detail}")]
    CorruptDocument { detail: String },

    #[error("failed to render page index {page_index}: {cause}")]
    Render { page_index: usize, cause: String },

    #[error("failed to encode page index {page_index}: {cause}")]
    Encode { page_index: usize, cause: String },

    #[error("failed to build output PDF: {detail}")]
    Reassembly { detail: String },

    #[error("background execution unavailable: {detail}")]
    ExecutionEnvironmentUnavailable { detail: String },

    #[error("compression cancelled")]
    Cancelled,

    #[error("worker stopped without sending a result")]
    WorkerLost,
}

impl CompressError {
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::CorruptDocument {
            detail: detail.into(),
        }
    }

    pub fn render(page_index: usize, cause: impl ToString) -> Self {
        Self::Render {
            page_index,
            cause: cause.to_string(),
        }
    }

    pub fn encode(page_index: usize, cause: impl ToString) -> Self {
        Self::Encode {
            page_index,
            cause: cause.to_string(),
        }
    }

    pub fn reassembly(detail: impl Into<String>) -> Self {
        Self::Reassembly {
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::ExecutionEnvironmentUnavailable {
            detail: detail.into(),
        }
    }

    /// Errors scoped to a single page, subject to the page failure policy
    #[must_use]
    pub fn is_page_error(&self) -> bool {
        matches!(self, Self::Render { .. } | Self::Encode { .. })
    }

    /// Failing page, for page-scoped errors
    #[must_use]
    pub fn page_index(&self) -> Option<usize> {
        match self {
            Self::Render { page_index, .. } | Self::Encode { page_index, .. } => Some(*page_index),
            _ => None,
        }
    }
}

impl From<lopdf::Error> for CompressError {
    fn from(err: lopdf::Error) -> Self {
        Self::reassembly(err.to_string())
    }
}

/// Cooperative cancellation flag shared between a handle and its worker
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Request sent to a compression worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkerRequest {
    #[serde(rename_all = "camelCase")]
    Compress {
        #[serde(with = "base64_bytes")]
        source_bytes: Vec<u8>,
        level: CompressionLevel,
        fast_mode: bool,
    },
}

impl From<CompressionRequest> for WorkerRequest {
    fn from(request: CompressionRequest) -> Self {
        Self::Compress {
            source_bytes: request.source_bytes,
            level: request.level,
            fast_mode: request.fast_mode,
        }
    }
}

impl From<WorkerRequest> for CompressionRequest {
    fn from(request: WorkerRequest) -> Self {
        match request {
            WorkerRequest::Compress {
                source_bytes,
                level,
                fast_mode,
            } => CompressionRequest::new(source_bytes, level, fast_mode),
        }
    }
}

/// Response from a compression worker
#[derive(Debug)]
pub enum WorkerResponse {
    Progress(ProgressEvent),
    Done(CompressionResult),
    Failed(CompressError),
}

impl WorkerResponse {
    /// Whether this is the last message of a request
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// Wire form of [`WorkerResponse`] for hosts on the other side of a process
/// or language boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkerMessage {
    Progress {
        percent: f32,
    },
    #[serde(rename_all = "camelCase")]
    Done {
        #[serde(with = "base64_bytes")]
        pdf_bytes: Vec<u8>,
    },
    Error {
        message: String,
    },
}

impl From<WorkerResponse> for WorkerMessage {
    fn from(response: WorkerResponse) -> Self {
        match response {
            WorkerResponse::Progress(event) => Self::Progress {
                percent: event.percent,
            },
            WorkerResponse::Done(result) => Self::Done {
                pdf_bytes: result.pdf_bytes,
            },
            WorkerResponse::Failed(err) => Self::Error {
                message: err.to_string(),
            },
        }
    }
}

/// Binary payloads travel as standard base64 strings in JSON
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
