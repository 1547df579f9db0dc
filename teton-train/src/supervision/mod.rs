//! Training-time supervision settings for semantic and depth losses.
//!
//! Loss functions themselves live with the training framework; this module
//! owns their configuration, schedules, scaling and metrics.

mod depth;

pub use depth::{
    DepthLossType, DepthSupervisionConfig, SigmaSchedule, depth_mse, ranking_warmup,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisionError {
    #[error("Forcing pseudodepth loss, but depth loss type ({0:?}) must be one of {1:?}")]
    IncompatiblePseudoDepthLoss(DepthLossType, &'static [DepthLossType]),

    #[error("{what} has {actual} values, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Weights of the semantic head.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticSupervisionConfig {
    pub semantic_loss_weight: f64,
    /// Let semantic gradients flow into the density field
    pub pass_semantic_gradients: bool,
}

impl Default for SemanticSupervisionConfig {
    fn default() -> Self {
        Self {
            semantic_loss_weight: 1.0,
            pass_semantic_gradients: false,
        }
    }
}

/// Combined semantic and depth supervision settings of the model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticDepthModelConfig {
    pub semantics: SemanticSupervisionConfig,
    pub depth: DepthSupervisionConfig,
}
