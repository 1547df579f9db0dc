//! Depth supervision: configuration, sigma schedule and loss scaling.

use crate::supervision::SupervisionError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Depth loss family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepthLossType {
    #[default]
    DsNerf,
    Urf,
    SparsenerfRanking,
}

impl DepthLossType {
    /// Loss types usable with monocular pseudo-depth.
    pub const PSEUDODEPTH_COMPATIBLE: &'static [DepthLossType] = &[DepthLossType::SparsenerfRanking];

    /// Whether the loss is parameterized by a depth sigma.
    pub fn uses_sigma(self) -> bool {
        matches!(self, Self::DsNerf | Self::Urf)
    }

    /// Name under which the scaled loss is reported.
    pub fn loss_name(self) -> &'static str {
        if self.uses_sigma() {
            "depth_loss"
        } else {
            "depth_ranking"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthSupervisionConfig {
    pub depth_loss_mult: f64,
    /// Ground truth measures distance along the ray rather than z-depth.
    pub is_euclidean_depth: bool,
    /// Final (or constant) depth sigma
    pub depth_sigma: f64,
    pub should_decay_sigma: bool,
    pub starting_depth_sigma: f64,
    pub sigma_decay_rate: f64,
    pub depth_loss_type: DepthLossType,
    /// Set when depth was generated by a monocular estimator.
    pub force_pseudodepth_loss: bool,
}

impl Default for DepthSupervisionConfig {
    fn default() -> Self {
        Self {
            depth_loss_mult: 1e-3,
            is_euclidean_depth: false,
            depth_sigma: 0.01,
            should_decay_sigma: false,
            starting_depth_sigma: 0.2,
            sigma_decay_rate: 0.99985,
            depth_loss_type: DepthLossType::DsNerf,
            force_pseudodepth_loss: false,
        }
    }
}

impl DepthSupervisionConfig {
    pub fn with_loss_type(mut self, depth_loss_type: DepthLossType) -> Self {
        self.depth_loss_type = depth_loss_type;
        self
    }

    pub fn with_sigma_decay(mut self, starting_depth_sigma: f64) -> Self {
        self.should_decay_sigma = true;
        self.starting_depth_sigma = starting_depth_sigma;
        self
    }

    pub fn with_pseudodepth_loss(mut self, forced: bool) -> Self {
        self.force_pseudodepth_loss = forced;
        self
    }

    pub fn validate(&self) -> Result<(), SupervisionError> {
        if self.force_pseudodepth_loss
            && !DepthLossType::PSEUDODEPTH_COMPATIBLE.contains(&self.depth_loss_type)
        {
            return Err(SupervisionError::IncompatiblePseudoDepthLoss(
                self.depth_loss_type,
                DepthLossType::PSEUDODEPTH_COMPATIBLE,
            ));
        }
        Ok(())
    }

    /// Weighted loss for a raw loss value at training `step`.
    ///
    /// Ranking losses are additionally ramped in by [`ranking_warmup`].
    pub fn scaled_loss(&self, raw: f64, step: usize) -> f64 {
        match self.depth_loss_type {
            DepthLossType::DsNerf | DepthLossType::Urf => self.depth_loss_mult * raw,
            DepthLossType::SparsenerfRanking => self.depth_loss_mult * raw * ranking_warmup(step),
        }
    }

    /// Ground-truth depth as distance along each ray.
    ///
    /// Z-depth is multiplied by `directions_norm`; euclidean depth passes through.
    pub fn ground_truth_depth(
        &self,
        depth: &[f64],
        directions_norm: &[f64],
    ) -> Result<Vec<f64>, SupervisionError> {
        if self.is_euclidean_depth {
            return Ok(depth.to_vec());
        }
        if depth.len() != directions_norm.len() {
            return Err(SupervisionError::LengthMismatch {
                what: "directions_norm",
                expected: depth.len(),
                actual: directions_norm.len(),
            });
        }
        Ok(depth.iter().zip(directions_norm).map(|(d, n)| d * n).collect())
    }
}

/// Depth sigma over training steps.
///
/// Constant at `depth_sigma`, or, with decay, starting at
/// `starting_depth_sigma` and shrinking by `sigma_decay_rate` per call
/// down to `depth_sigma`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmaSchedule {
    current: f64,
    floor: f64,
    decay_rate: f64,
    decays: bool,
}

impl SigmaSchedule {
    pub fn new(config: &DepthSupervisionConfig) -> Self {
        let current = if config.should_decay_sigma {
            config.starting_depth_sigma
        } else {
            config.depth_sigma
        };
        Self {
            current,
            floor: config.depth_sigma,
            decay_rate: config.sigma_decay_rate,
            decays: config.should_decay_sigma,
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// Sigma for the next loss evaluation.
    pub fn next_sigma(&mut self) -> f64 {
        if self.decays {
            self.current = (self.decay_rate * self.current).max(self.floor);
        }
        self.current
    }
}

/// Ranking loss ramp: linear from 0 at step 0 to 0.2 at step 2000, flat after.
pub fn ranking_warmup(step: usize) -> f64 {
    const RAMP_STEPS: f64 = 2000.0;
    const MAX_WEIGHT: f64 = 0.2;
    (step as f64 / RAMP_STEPS).min(1.0) * MAX_WEIGHT
}

/// Mean squared error over rays with positive ground truth.
///
/// `None` when no ray has ground truth.
pub fn depth_mse(predicted: &[f64], ground_truth: &[f64]) -> Result<Option<f64>, SupervisionError> {
    if predicted.len() != ground_truth.len() {
        return Err(SupervisionError::LengthMismatch {
            what: "ground truth depth",
            expected: predicted.len(),
            actual: ground_truth.len(),
        });
    }
    let (sum, count) = predicted
        .iter()
        .zip(ground_truth)
        .filter(|&(_, &gt)| gt > 0.0)
        .fold((0.0, 0usize), |(sum, count), (p, gt)| (sum + (p - gt) * (p - gt), count + 1));
    if count == 0 {
        debug!("No valid ground truth depth for depth_mse");
        return Ok(None);
    }
    Ok(Some(sum / count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DepthSupervisionConfig::default();
        assert_eq!(config.depth_loss_mult, 1e-3);
        assert_eq!(config.depth_loss_type, DepthLossType::DsNerf);
        assert!(!config.force_pseudodepth_loss);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sigma_decays_to_floor() {
        let config = DepthSupervisionConfig {
            sigma_decay_rate: 0.5,
            ..DepthSupervisionConfig::default()
        }
        .with_sigma_decay(0.2);
        let mut schedule = SigmaSchedule::new(&config);
        assert_eq!(schedule.current(), 0.2);
        assert_eq!(schedule.next_sigma(), 0.1);
        assert_eq!(schedule.next_sigma(), 0.05);
        for _ in 0..10 {
            schedule.next_sigma();
        }
        assert_eq!(schedule.current(), 0.01);
    }

    #[test]
    fn test_constant_sigma() {
        let mut schedule = SigmaSchedule::new(&DepthSupervisionConfig::default());
        assert_eq!(schedule.next_sigma(), 0.01);
        assert_eq!(schedule.next_sigma(), 0.01);
    }

    #[test]
    fn test_ranking_warmup_interpolates() {
        assert_eq!(ranking_warmup(0), 0.0);
        assert!((ranking_warmup(1000) - 0.1).abs() < 1e-12);
        assert!((ranking_warmup(2000) - 0.2).abs() < 1e-12);
        assert!((ranking_warmup(50_000) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_scaled_loss() {
        let ds = DepthSupervisionConfig::default();
        assert!((ds.scaled_loss(2.0, 0) - 2e-3).abs() < 1e-15);
        let ranking = ds.with_loss_type(DepthLossType::SparsenerfRanking);
        assert_eq!(ranking.scaled_loss(2.0, 0), 0.0);
        assert!((ranking.scaled_loss(2.0, 1000) - 2e-4).abs() < 1e-15);
        assert_eq!(ranking.depth_loss_type.loss_name(), "depth_ranking");
    }

    #[test]
    fn test_pseudodepth_requires_ranking_loss() {
        let forced = DepthSupervisionConfig::default().with_pseudodepth_loss(true);
        assert!(forced.validate().is_err());
        assert!(forced.with_loss_type(DepthLossType::SparsenerfRanking).validate().is_ok());
    }

    #[test]
    fn test_ground_truth_depth_conversion() {
        let config = DepthSupervisionConfig::default();
        assert_eq!(config.ground_truth_depth(&[2.0, 3.0], &[1.0, 1.5]).unwrap(), vec![2.0, 4.5]);
        assert!(config.ground_truth_depth(&[2.0], &[]).is_err());
        let euclidean = DepthSupervisionConfig {
            is_euclidean_depth: true,
            ..config
        };
        assert_eq!(euclidean.ground_truth_depth(&[2.0], &[]).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_depth_mse_ignores_missing_ground_truth() {
        assert_eq!(depth_mse(&[1.0, 5.0, 2.0], &[2.0, 0.0, 2.0]).unwrap(), Some(0.5));
        assert_eq!(depth_mse(&[1.0], &[0.0]).unwrap(), None);
        assert!(depth_mse(&[1.0], &[]).is_err());
    }

    #[test]
    fn test_loss_type_serde_names() {
        let json = serde_json::to_string(&DepthLossType::SparsenerfRanking).unwrap();
        assert_eq!(json, "\"SPARSENERF_RANKING\"");
        let parsed: DepthLossType = serde_json::from_str("\"DS_NERF\"").unwrap();
        assert_eq!(parsed, DepthLossType::DsNerf);
    }
}
