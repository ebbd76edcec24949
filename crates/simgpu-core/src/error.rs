//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Bring-up orchestration and device lifecycle management."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;

use crate::stage::StageId;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure reported by a stage collaborator while acquiring or releasing its resource.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StageError {
    message: String,
    #[source]
    source: Option<BoxedSource>,
}

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Bring-up failure. The device has already been rolled back when this is returned.
#[derive(Debug, Error)]
pub enum BringUpError {
    #[error("stage '{stage}' failed to acquire its resource: {source}")]
    StageAcquire {
        stage: StageId,
        /// Stages that were committed when the failure was observed, in commit order.
        committed: Vec<StageId>,
        #[source]
        source: StageError,
    },
    #[error("invalid stage table: {reason}")]
    InvalidStageTable { reason: String },
}

impl BringUpError {
    /// The stage whose acquire failed, if any stage ran.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            BringUpError::StageAcquire { stage, .. } => Some(*stage),
            BringUpError::InvalidStageTable { .. } => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlushError {
    #[error(
        "flush timed out after {waited:?} with {outstanding} item(s) outstanding ({iterations} iteration(s))"
    )]
    Timeout {
        waited: Duration,
        outstanding: usize,
        iterations: u64,
    },
    #[error("device has already been released")]
    Released,
}
