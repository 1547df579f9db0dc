//! Render model interface and its named output channels

use crate::ingest::batch::SourceError;
use glam::{DVec3, DVec4};
use std::collections::BTreeMap;
use teton_data::RayBundle;

/// Name of the per-ray opacity channel every model is expected to render.
pub const ACCUMULATION_CHANNEL: &str = "accumulation";

/// Kind of data a channel carries per ray
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// RGB in `[0, 1]`
    Color,
    /// One value per ray (depth, opacity, ...)
    Scalar,
    /// Three values per ray (normals, ...)
    Vector,
}

/// A channel a model declares it can render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub kind: ChannelKind,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Per-ray data of one rendered channel
#[derive(Debug, Clone, PartialEq)]
pub enum Channel {
    Color(Vec<DVec3>),
    Scalar(Vec<f64>),
    Vector(Vec<DVec3>),
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Color(_) => ChannelKind::Color,
            Self::Scalar(_) => ChannelKind::Scalar,
            Self::Vector(_) => ChannelKind::Vector,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Color(v) | Self::Vector(v) => v.len(),
            Self::Scalar(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Three-component data of color and vector channels
    pub fn as_vectors(&self) -> Option<&[DVec3]> {
        match self {
            Self::Color(v) | Self::Vector(v) => Some(v),
            Self::Scalar(_) => None,
        }
    }

    pub fn as_scalars(&self) -> Option<&[f64]> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

/// Rendered channels of one ray batch, by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutputs {
    channels: BTreeMap<String, Channel>,
}

impl RenderOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, name: impl Into<String>, channel: Channel) -> Self {
        self.insert(name, channel);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, channel: Channel) {
        self.channels.insert(name.into(), channel);
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}

/// A trained model that renders named channels for a ray bundle
pub trait RenderModel {
    /// Channels this model renders, declared up front
    fn channels(&self) -> Vec<ChannelSpec>;

    /// Render every declared channel for `rays`
    fn render(&mut self, rays: &RayBundle) -> Result<RenderOutputs, SourceError>;

    /// Color of `channel` with the accumulated opacity as alpha
    fn rgba(&self, outputs: &RenderOutputs, channel: &str) -> Result<Vec<DVec4>, SourceError> {
        let colors = outputs
            .get(channel)
            .and_then(Channel::as_vectors)
            .ok_or_else(|| SourceError::Render(format!("no color channel '{}'", channel)))?;
        let alpha = outputs
            .get(ACCUMULATION_CHANNEL)
            .and_then(Channel::as_scalars)
            .ok_or_else(|| {
                SourceError::Render(format!("no scalar channel '{}'", ACCUMULATION_CHANNEL))
            })?;
        if colors.len() != alpha.len() {
            return Err(SourceError::InvalidData(format!(
                "'{}' has {} values but '{}' has {}",
                channel,
                colors.len(),
                ACCUMULATION_CHANNEL,
                alpha.len()
            )));
        }
        Ok(colors
            .iter()
            .zip(alpha)
            .map(|(c, &a)| c.extend(a))
            .collect())
    }
}
