//! Pipeline stage machine and progress accounting

use std::fmt;

use super::types::ProgressEvent;

const DECODE_DONE: f32 = 10.0;
const RENDER_BAND: f32 = 55.0;
const RENDER_DONE: f32 = DECODE_DONE + RENDER_BAND;
const REASSEMBLY_BAND: f32 = 100.0 - RENDER_DONE;

/// Where a single request currently is
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineStage {
    Idle,
    Decoding,
    /// `completed` counts rendered and skipped pages alike
    RenderingPages { completed: usize, total: usize },
    Reassembling { embedded: usize, total: usize },
    Done,
    Failed(String),
}

impl PipelineStage {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Decoding => "decoding",
            Self::RenderingPages { .. } => "rendering",
            Self::Reassembling { .. } => "reassembling",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RenderingPages { completed, total } => {
                write!(f, "rendering ({completed}/{total})")
            }
            Self::Reassembling { embedded, total } => {
                write!(f, "reassembling ({embedded}/{total})")
            }
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Commands that move the pipeline forward
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Start,
    Decoded { page_count: usize },
    /// A page was rendered and encoded, or skipped
    PageCompleted,
    BeginReassembly { pages: usize },
    PageEmbedded,
    Finish,
    Fail(String),
}

/// Effects produced by state changes
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Effect {
    Progress(f32),
}

/// Command that is not valid in the current stage
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot apply {command:?} while {stage}")]
pub struct IllegalTransition {
    pub stage: String,
    pub command: Command,
}

/// Stage machine for one request
#[derive(Clone, Debug)]
pub struct PipelineState {
    stage: PipelineStage,
}

impl PipelineState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stage: PipelineStage::Idle,
        }
    }

    #[must_use]
    pub fn stage(&self) -> &PipelineStage {
        &self.stage
    }

    /// Apply a command and return resulting effects
    pub fn apply(&mut self, cmd: Command) -> Result<Vec<Effect>, IllegalTransition> {
        let (next, effects) = match (&self.stage, &cmd) {
            (PipelineStage::Idle, Command::Start) => {
                (PipelineStage::Decoding, vec![Effect::Progress(0.0)])
            }

            (PipelineStage::Decoding, Command::Decoded { page_count }) if *page_count > 0 => (
                PipelineStage::RenderingPages {
                    completed: 0,
                    total: *page_count,
                },
                vec![Effect::Progress(DECODE_DONE)],
            ),

            (PipelineStage::RenderingPages { completed, total }, Command::PageCompleted)
                if completed < total =>
            {
                let completed = completed + 1;
                let percent = DECODE_DONE + RENDER_BAND * completed as f32 / *total as f32;
                (
                    PipelineStage::RenderingPages {
                        completed,
                        total: *total,
                    },
                    vec![Effect::Progress(percent)],
                )
            }

            (
                PipelineStage::RenderingPages { completed, total },
                Command::BeginReassembly { pages },
            ) if completed == total && pages <= total => (
                PipelineStage::Reassembling {
                    embedded: 0,
                    total: *pages,
                },
                vec![Effect::Progress(RENDER_DONE)],
            ),

            (PipelineStage::Reassembling { embedded, total }, Command::PageEmbedded)
                if embedded < total =>
            {
                let embedded = embedded + 1;
                let percent = RENDER_DONE + REASSEMBLY_BAND * embedded as f32 / *total as f32;
                (
                    PipelineStage::Reassembling {
                        embedded,
                        total: *total,
                    },
                    vec![Effect::Progress(percent)],
                )
            }

            (PipelineStage::Reassembling { embedded, total }, Command::Finish)
                if embedded == total && *total > 0 =>
            {
                (PipelineStage::Done, vec![Effect::Progress(100.0)])
            }

            (stage, Command::Fail(reason)) if !stage.is_terminal() => {
                (PipelineStage::Failed(reason.clone()), vec![])
            }

            (stage, _) => {
                return Err(IllegalTransition {
                    stage: stage.to_string(),
                    command: cmd.clone(),
                });
            }
        };

        log::debug!("pipeline: {} -> {}", self.stage, next);
        self.stage = next;
        Ok(effects)
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns raw percentages into a clamped, non-decreasing event stream
#[derive(Clone, Debug, Default)]
pub struct ProgressTracker {
    last: Option<f32>,
}

impl ProgressTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Returns an event only when progress actually moved forward
    pub fn report(&mut self, percent: f32) -> Option<ProgressEvent> {
        if percent.is_nan() {
            return None;
        }
        let percent = percent.clamp(0.0, 100.0);
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(ProgressEvent::new(percent))
            }
        }
    }

    #[must_use]
    pub fn last(&self) -> Option<f32> {
        self.last
    }
}
