use glam::DVec3;
use indicatif::ProgressBar;
use std::time::Duration;
use teton_data::{Aabb, BoundingRegion, RayBundle};
use teton_train::ingest::{
    ACCUMULATION_CHANNEL, Batch, BatchSource, Channel, ChannelKind, ChannelSpec, RenderModel,
    RenderOutputs, SourceError,
};
use teton_train::pointcloud::{
    AccumulationBudget, AccumulationSettings, OutputSelection, PointCloudError, Termination,
    accumulate,
};
use teton_train::{PointCloudConfig, generate_point_cloud};

/// Hands out copies of one ray bundle, optionally a limited number of times.
struct RepeatingSource {
    rays: RayBundle,
    remaining: Option<usize>,
    requested: usize,
}

impl RepeatingSource {
    fn new(rays: RayBundle) -> Self {
        Self {
            rays,
            remaining: None,
            requested: 0,
        }
    }

    fn limited(rays: RayBundle, count: usize) -> Self {
        Self {
            remaining: Some(count),
            ..Self::new(rays)
        }
    }
}

impl BatchSource for RepeatingSource {
    fn next_batch(&mut self, _step: usize) -> Result<Option<Batch>, SourceError> {
        self.requested += 1;
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        Ok(Some(Batch::new(self.rays.clone())))
    }
}

/// Renders fixed per-ray depth, opacity and (optionally) colors and normals.
struct FixedModel {
    depth: Vec<f64>,
    alpha: Vec<f64>,
    colors: Option<Vec<DVec3>>,
    normals: Option<Vec<DVec3>>,
}

impl FixedModel {
    fn new(depth: Vec<f64>, alpha: Vec<f64>) -> Self {
        Self {
            depth,
            alpha,
            colors: None,
            normals: None,
        }
    }
}

impl RenderModel for FixedModel {
    fn channels(&self) -> Vec<ChannelSpec> {
        let mut specs = vec![
            ChannelSpec::new("rgb", ChannelKind::Color),
            ChannelSpec::new("depth", ChannelKind::Scalar),
            ChannelSpec::new(ACCUMULATION_CHANNEL, ChannelKind::Scalar),
        ];
        if self.normals.is_some() {
            specs.push(ChannelSpec::new("normals", ChannelKind::Vector));
        }
        specs
    }

    fn render(&mut self, rays: &RayBundle) -> Result<RenderOutputs, SourceError> {
        let colors = self
            .colors
            .clone()
            .unwrap_or_else(|| vec![DVec3::new(0.2, 0.4, 0.6); rays.len()]);
        let mut outputs = RenderOutputs::new()
            .with_channel("rgb", Channel::Color(colors))
            .with_channel("depth", Channel::Scalar(self.depth.clone()))
            .with_channel(ACCUMULATION_CHANNEL, Channel::Scalar(self.alpha.clone()));
        if let Some(normals) = &self.normals {
            outputs.insert("normals", Channel::Vector(normals.clone()));
        }
        Ok(outputs)
    }
}

fn rays_along_x(count: usize) -> RayBundle {
    RayBundle::new(vec![DVec3::ZERO; count], vec![DVec3::X; count]).unwrap()
}

fn settings(target_points: usize) -> AccumulationSettings {
    AccumulationSettings {
        target_points,
        outputs: OutputSelection::default(),
        region: None,
        budget: AccumulationBudget::default(),
    }
}

#[test]
fn test_target_reached_in_exact_iterations() {
    let mut source = RepeatingSource::new(rays_along_x(200));
    let mut model = FixedModel::new(vec![0.5; 200], vec![1.0; 200]);

    let acc = accumulate(&mut source, &mut model, &settings(1000), &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.iterations, 5);
    assert_eq!(source.requested, 5);
    assert!(acc.len() >= 1000);
    assert_eq!(acc.termination, Termination::TargetReached);
    assert_eq!(acc.colors.len(), acc.points.len());
    assert_eq!(acc.view_directions.len(), acc.points.len());
    assert!(acc.normals.is_none());
}

#[test]
fn test_last_batch_not_truncated() {
    let mut source = RepeatingSource::new(rays_along_x(300));
    let mut model = FixedModel::new(vec![1.0; 300], vec![1.0; 300]);
    let acc = accumulate(&mut source, &mut model, &settings(1000), &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.iterations, 4);
    assert_eq!(acc.len(), 1200);
}

#[test]
fn test_aabb_keeps_inside_points_only() {
    let mut source = RepeatingSource::limited(rays_along_x(2), 1);
    let mut model = FixedModel::new(vec![0.0, 2.0], vec![1.0, 1.0]);
    let aabb = Aabb::new(DVec3::splat(-1.0), DVec3::ONE).unwrap();
    let settings = AccumulationSettings {
        region: Some(BoundingRegion::Aabb(aabb)),
        ..settings(10)
    };

    let acc = accumulate(&mut source, &mut model, &settings, &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.points, vec![DVec3::ZERO]);
    assert_eq!(acc.termination, Termination::SourceExhausted);
}

#[test]
fn test_opacity_filter_is_strict() {
    let mut source = RepeatingSource::limited(rays_along_x(4), 1);
    let mut model = FixedModel::new(vec![1.0, 2.0, 3.0, 4.0], vec![0.3, 0.6, 0.9, 0.5]);
    let acc = accumulate(&mut source, &mut model, &settings(100), &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.points, vec![DVec3::new(2.0, 0.0, 0.0), DVec3::new(3.0, 0.0, 0.0)]);
}

#[test]
fn test_conflicting_normals_fail_before_first_batch() {
    let mut source = RepeatingSource::new(rays_along_x(4));
    let mut model = FixedModel::new(vec![1.0; 4], vec![1.0; 4]);
    model.normals = Some(vec![DVec3::splat(0.5); 4]);
    let config = PointCloudConfig::default()
        .with_estimated_normals()
        .with_normal_output("normals");

    let result = generate_point_cloud(&mut source, &mut model, &config, &ProgressBar::hidden());
    assert!(matches!(result, Err(PointCloudError::ConflictingNormalSources(_))));
    assert_eq!(source.requested, 0);
}

#[test]
fn test_missing_channel_fails_before_first_batch() {
    let mut source = RepeatingSource::new(rays_along_x(4));
    let mut model = FixedModel::new(vec![1.0; 4], vec![1.0; 4]);
    let settings = AccumulationSettings {
        outputs: OutputSelection {
            depth: "expected_depth".into(),
            ..OutputSelection::default()
        },
        ..settings(10)
    };
    let err = accumulate(&mut source, &mut model, &settings, &ProgressBar::hidden()).unwrap_err();
    assert!(err.to_string().contains("expected_depth"));
    assert!(err.to_string().contains("accumulation"));
    assert_eq!(source.requested, 0);
}

#[test]
fn test_source_exhaustion_and_empty_iterations() {
    let mut source = RepeatingSource::limited(rays_along_x(3), 4);
    let mut model = FixedModel::new(vec![1.0; 3], vec![0.1; 3]);
    let acc = accumulate(&mut source, &mut model, &settings(10), &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.termination, Termination::SourceExhausted);
    assert_eq!(acc.iterations, 4);
    assert_eq!(acc.empty_iterations, 4);
    assert!(acc.is_empty());
}

#[test]
fn test_iteration_budget_exhausted() {
    let mut source = RepeatingSource::new(rays_along_x(3));
    let mut model = FixedModel::new(vec![1.0; 3], vec![1.0; 3]);
    let settings = AccumulationSettings {
        budget: AccumulationBudget::default().with_max_iterations(2),
        ..settings(1_000)
    };
    let acc = accumulate(&mut source, &mut model, &settings, &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.termination, Termination::IterationBudgetExhausted);
    assert_eq!(acc.len(), 6);
}

#[test]
fn test_time_budget_exhausted() {
    let mut source = RepeatingSource::new(rays_along_x(3));
    let mut model = FixedModel::new(vec![1.0; 3], vec![1.0; 3]);
    let settings = AccumulationSettings {
        budget: AccumulationBudget::default().with_time_budget(Duration::ZERO),
        ..settings(1_000)
    };
    let acc = accumulate(&mut source, &mut model, &settings, &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.termination, Termination::TimeBudgetExhausted);
    assert_eq!(acc.iterations, 0);
}

#[test]
fn test_rendered_normals_remapped_and_aligned() {
    let mut source = RepeatingSource::limited(rays_along_x(3), 1);
    let mut model = FixedModel::new(vec![1.0; 3], vec![1.0, 0.2, 1.0]);
    model.normals = Some(vec![DVec3::new(0.5, 0.5, 1.0), DVec3::ZERO, DVec3::new(1.0, 0.5, 0.5)]);
    let settings = AccumulationSettings {
        outputs: OutputSelection {
            normal: Some("normals".into()),
            ..OutputSelection::default()
        },
        ..settings(10)
    };
    let acc = accumulate(&mut source, &mut model, &settings, &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.normals, Some(vec![DVec3::Z, DVec3::X]));
    assert_eq!(acc.len(), 2);
}

#[test]
fn test_rendered_normals_out_of_range_rejected() {
    let mut source = RepeatingSource::limited(rays_along_x(1), 1);
    let mut model = FixedModel::new(vec![1.0], vec![1.0]);
    model.normals = Some(vec![DVec3::new(0.0, 0.0, -1.0)]);
    let settings = AccumulationSettings {
        outputs: OutputSelection {
            normal: Some("normals".into()),
            ..OutputSelection::default()
        },
        ..settings(10)
    };
    let result = accumulate(&mut source, &mut model, &settings, &ProgressBar::hidden());
    assert!(matches!(result, Err(PointCloudError::NormalOutOfRange { .. })));
}

#[test]
fn test_render_length_mismatch_rejected() {
    let mut source = RepeatingSource::limited(rays_along_x(3), 1);
    let mut model = FixedModel::new(vec![1.0; 2], vec![1.0; 3]);
    let result = accumulate(&mut source, &mut model, &settings(10), &ProgressBar::hidden());
    assert!(matches!(result, Err(PointCloudError::OutputLengthMismatch { .. })));
}

#[test]
fn test_nan_alpha_dropped() {
    let mut source = RepeatingSource::limited(rays_along_x(2), 1);
    let mut model = FixedModel::new(vec![1.0, 2.0], vec![f64::NAN, 0.9]);
    let acc = accumulate(&mut source, &mut model, &settings(10), &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.points, vec![DVec3::new(2.0, 0.0, 0.0)]);
}

#[test]
fn test_non_finite_depth_dropped() {
    let mut source = RepeatingSource::limited(rays_along_x(3), 1);
    let mut model = FixedModel::new(vec![f64::NAN, 1.0, f64::INFINITY], vec![1.0; 3]);
    let acc = accumulate(&mut source, &mut model, &settings(10), &ProgressBar::hidden()).unwrap();
    assert_eq!(acc.points, vec![DVec3::X]);
    assert_eq!(acc.colors.len(), 1);
    assert_eq!(acc.view_directions.len(), 1);
}

// Ray `k` of a 10x10 wall at x = 1 seen from the origin, plus one far ray.
const WALL_RAYS: usize = 101;

fn wall_index(point: DVec3) -> usize {
    (point.y * 100.0).round() as usize * 10 + (point.z * 100.0).round() as usize
}

fn wall_color(k: usize) -> DVec3 {
    DVec3::new(k as f64 / WALL_RAYS as f64, 0.25, 0.75)
}

// Rendered normal in [0, 1], facing away from the camera after remapping.
fn wall_raw_normal(k: usize) -> DVec3 {
    DVec3::new(1.0, 0.5 + 0.5 * k as f64 / WALL_RAYS as f64, 0.5)
}

fn wall_oriented_normal(k: usize) -> DVec3 {
    -(wall_raw_normal(k) * 2.0 - DVec3::ONE)
}

#[test]
fn test_generate_removes_outliers_and_reorients() {
    let mut directions: Vec<DVec3> = (0..10)
        .flat_map(|i| (0..10).map(move |j| DVec3::new(1.0, i as f64 * 0.01, j as f64 * 0.01)))
        .collect();
    directions.push(DVec3::new(1.0, 0.5, 0.5));
    assert_eq!(directions.len(), WALL_RAYS);
    let rays = RayBundle::new(
        vec![DVec3::ZERO; WALL_RAYS],
        directions.iter().map(|d| d.normalize()).collect(),
    )
    .unwrap();

    let far = WALL_RAYS - 1;
    let mut depth: Vec<f64> = directions.iter().map(|d| d.length()).collect();
    depth[far] = 1000.0;
    let mut source = RepeatingSource::limited(rays, 1);
    let mut model = FixedModel::new(depth, vec![1.0; WALL_RAYS]);
    model.colors = Some((0..WALL_RAYS).map(wall_color).collect());
    model.normals = Some((0..WALL_RAYS).map(wall_raw_normal).collect());

    let config = PointCloudConfig::default()
        .with_num_points(WALL_RAYS)
        .with_std_ratio(2.0)
        .with_normal_output("normals")
        .with_reoriented_normals();
    let generated = generate_point_cloud(&mut source, &mut model, &config, &ProgressBar::hidden()).unwrap();

    assert_eq!(generated.termination, Termination::TargetReached);
    assert_eq!(generated.removed_outliers, 1);
    let cloud = &generated.cloud;
    assert_eq!(cloud.len(), WALL_RAYS - 1);
    assert_eq!(generated.view_directions.len(), cloud.len());

    let normals = cloud.normals().unwrap();
    assert!(!cloud.colors().contains(&wall_color(far)));
    assert!(!normals.contains(&wall_oriented_normal(far)));

    // every surviving point still carries its own color, normal and view direction
    for (i, &point) in cloud.points().iter().enumerate() {
        assert!((point.x - 1.0).abs() < 1e-9);
        let k = wall_index(point);
        assert_eq!(cloud.colors()[i], wall_color(k));
        assert!((normals[i] - wall_oriented_normal(k)).length() < 1e-12);
        assert!(generated.view_directions[i].cross(point).length() < 1e-9);
    }
}
