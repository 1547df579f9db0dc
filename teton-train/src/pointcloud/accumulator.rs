//! Streaming accumulation of rendered points until a target count.

use crate::ingest::{BatchSource, Channel, ChannelKind, ChannelSpec, RenderModel, RenderOutputs};
use crate::pointcloud::error::PointCloudError;
use glam::DVec3;
use indicatif::ProgressBar;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use teton_data::{BoundingRegion, RayBundle};
use tracing::{debug, info, instrument};

/// Rays whose accumulated opacity is at or below this are dropped.
pub const ALPHA_THRESHOLD: f64 = 0.5;

/// Channels read from the render model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSelection {
    pub rgb: String,
    pub depth: String,
    pub normal: Option<String>,
}

impl Default for OutputSelection {
    fn default() -> Self {
        Self {
            rgb: "rgb".into(),
            depth: "depth".into(),
            normal: None,
        }
    }
}

impl OutputSelection {
    /// Check the requested channels against the model's declared set.
    pub fn validate(&self, declared: &[ChannelSpec]) -> Result<(), PointCloudError> {
        let mut requested = vec![(&self.rgb, ChannelKind::Color), (&self.depth, ChannelKind::Scalar)];
        if let Some(normal) = &self.normal {
            requested.push((normal, ChannelKind::Vector));
        }

        for (name, expected) in requested {
            let spec = declared.iter().find(|s| &s.name == name).ok_or_else(|| {
                PointCloudError::MissingChannel {
                    name: name.clone(),
                    available: declared.iter().map(|s| s.name.clone()).collect(),
                }
            })?;
            if spec.kind != expected {
                return Err(PointCloudError::ChannelKindMismatch {
                    name: name.clone(),
                    expected,
                    actual: spec.kind,
                });
            }
        }
        Ok(())
    }
}

/// Limits that end an accumulation run before the target is met.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccumulationBudget {
    pub max_iterations: usize,
    pub time_budget: Option<Duration>,
}

impl Default for AccumulationBudget {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            time_budget: None,
        }
    }
}

impl AccumulationBudget {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_time_budget(mut self, time_budget: Duration) -> Self {
        self.time_budget = Some(time_budget);
        self
    }
}

/// Why an accumulation run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    TargetReached,
    IterationBudgetExhausted,
    TimeBudgetExhausted,
    SourceExhausted,
}

/// Everything one accumulation run needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationSettings {
    pub target_points: usize,
    pub outputs: OutputSelection,
    pub region: Option<BoundingRegion>,
    pub budget: AccumulationBudget,
}

/// Accumulated, index-aligned per-point data.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulation {
    pub points: Vec<DVec3>,
    pub colors: Vec<DVec3>,
    pub view_directions: Vec<DVec3>,
    /// Present when a normal channel was requested
    pub normals: Option<Vec<DVec3>>,
    pub iterations: usize,
    pub empty_iterations: usize,
    pub termination: Termination,
}

impl Accumulation {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Render batches from `source` through `model` until `target_points`
/// points survive filtering or a budget runs out.
///
/// The last batch is kept whole, so the result may exceed the target.
/// `progress` advances by the number of points added.
#[instrument(skip_all, fields(target = settings.target_points))]
pub fn accumulate<S, M>(
    source: &mut S,
    model: &mut M,
    settings: &AccumulationSettings,
    progress: &ProgressBar,
) -> Result<Accumulation, PointCloudError>
where
    S: BatchSource + ?Sized,
    M: RenderModel + ?Sized,
{
    settings.outputs.validate(&model.channels())?;
    progress.set_length(settings.target_points as u64);

    let started = Instant::now();
    let mut acc = Accumulation {
        points: Vec::new(),
        colors: Vec::new(),
        view_directions: Vec::new(),
        normals: settings.outputs.normal.as_ref().map(|_| Vec::new()),
        iterations: 0,
        empty_iterations: 0,
        termination: Termination::TargetReached,
    };

    acc.termination = loop {
        if acc.points.len() >= settings.target_points {
            break Termination::TargetReached;
        }
        if acc.iterations >= settings.budget.max_iterations {
            break Termination::IterationBudgetExhausted;
        }
        if let Some(limit) = settings.budget.time_budget {
            if started.elapsed() >= limit {
                break Termination::TimeBudgetExhausted;
            }
        }

        let Some(batch) = source.next_batch(acc.iterations)? else {
            break Termination::SourceExhausted;
        };
        acc.iterations += 1;

        let outputs = model.render(&batch.rays)?;
        let added = absorb_batch(&mut acc, &*model, &batch.rays, &outputs, settings)?;
        if added == 0 {
            acc.empty_iterations += 1;
            debug!("Iteration {} added no points", acc.iterations);
        }
        progress.inc(added as u64);
    };

    progress.finish();
    info!(
        "Accumulated {} points in {} iterations ({} empty), {:?}",
        acc.points.len(),
        acc.iterations,
        acc.empty_iterations,
        acc.termination
    );
    Ok(acc)
}

fn channel<'a>(
    outputs: &'a RenderOutputs,
    name: &str,
    expected_len: usize,
) -> Result<&'a Channel, PointCloudError> {
    let channel = outputs.get(name).ok_or_else(|| PointCloudError::MissingChannel {
        name: name.to_string(),
        available: outputs.names().map(String::from).collect(),
    })?;
    if channel.len() != expected_len {
        return Err(PointCloudError::OutputLengthMismatch {
            name: name.to_string(),
            expected: expected_len,
            actual: channel.len(),
        });
    }
    Ok(channel)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
    let mid = (sorted.len() - 1) / 2;
    let (_, m, _) = sorted.select_nth_unstable(mid);
    Some(m.0)
}

// Filter one rendered batch into `acc`; returns the number of points added.
fn absorb_batch<M: RenderModel + ?Sized>(
    acc: &mut Accumulation,
    model: &M,
    rays: &RayBundle,
    outputs: &RenderOutputs,
    settings: &AccumulationSettings,
) -> Result<usize, PointCloudError> {
    let n = rays.len();
    let selection = &settings.outputs;

    channel(outputs, &selection.rgb, n)?;
    let rgba = model.rgba(outputs, &selection.rgb)?;
    if rgba.len() != n {
        return Err(PointCloudError::OutputLengthMismatch {
            name: selection.rgb.clone(),
            expected: n,
            actual: rgba.len(),
        });
    }

    let depth_channel = channel(outputs, &selection.depth, n)?;
    let depth = depth_channel
        .as_scalars()
        .ok_or_else(|| PointCloudError::ChannelKindMismatch {
            name: selection.depth.clone(),
            expected: ChannelKind::Scalar,
            actual: depth_channel.kind(),
        })?;
    if let Some(m) = median(depth) {
        debug!("Median depth value used for scaling pointcloud {}", m);
    }

    let normals = match &selection.normal {
        Some(name) => {
            let normal_channel = channel(outputs, name, n)?;
            let raw = normal_channel
                .as_vectors()
                .ok_or_else(|| PointCloudError::ChannelKindMismatch {
                    name: name.clone(),
                    expected: ChannelKind::Vector,
                    actual: normal_channel.kind(),
                })?;
            if let Some(bad) = raw
                .iter()
                .flat_map(|v| v.to_array())
                .find(|c| !(0.0..=1.0).contains(c))
            {
                return Err(PointCloudError::NormalOutOfRange {
                    channel: name.clone(),
                    value: bad,
                });
            }
            Some(raw.iter().map(|v| *v * 2.0 - 1.0).collect::<Vec<DVec3>>())
        }
        None => None,
    };

    let before = acc.points.len();
    for i in 0..n {
        let alpha = rgba[i].w;
        if alpha.is_nan() || alpha <= ALPHA_THRESHOLD {
            continue;
        }
        let point = rays.point_at(i, depth[i]);
        if !point.is_finite() {
            continue;
        }
        if let Some(region) = &settings.region {
            if !region.contains(point) {
                continue;
            }
        }
        acc.points.push(point);
        acc.colors.push(rgba[i].truncate());
        acc.view_directions.push(rays.directions()[i]);
        if let (Some(out), Some(normals)) = (acc.normals.as_mut(), normals.as_ref()) {
            out.push(normals[i]);
        }
    }
    Ok(acc.points.len() - before)
}
