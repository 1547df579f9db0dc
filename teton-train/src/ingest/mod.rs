//! Data ingestion module
//!
//! Interfaces to the collaborators that feed point extraction and
//! supervision:
//! - Ray batch sources with ground truth
//! - Render models and their named output channels

pub mod batch;
pub mod render;

pub use batch::{Batch, BatchSource, GroundTruth, SourceError};
pub use render::{
    ACCUMULATION_CHANNEL, Channel, ChannelKind, ChannelSpec, RenderModel, RenderOutputs,
};
