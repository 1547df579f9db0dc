//! Summary statistics of a depth cache.

use crate::errors::AppError;
use ordered_float::OrderedFloat;
use std::path::Path;
use teton_data::DepthStack;

#[derive(Debug, Clone, PartialEq)]
pub struct DepthSummary {
    pub count: usize,
    pub width: u32,
    pub height: u32,
    /// Statistics over positive values only
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub median: Option<f32>,
    pub invalid: usize,
}

pub fn summarize(stack: &DepthStack) -> DepthSummary {
    let mut valid: Vec<OrderedFloat<f32>> = stack
        .values()
        .iter()
        .copied()
        .filter(|v| *v > 0.0)
        .map(OrderedFloat)
        .collect();
    let invalid = stack.values().len() - valid.len();
    valid.sort_unstable();

    let (width, height) = stack.dimensions();
    DepthSummary {
        count: stack.len(),
        width,
        height,
        min: valid.first().map(|v| v.0),
        max: valid.last().map(|v| v.0),
        median: valid.get(valid.len().saturating_sub(1) / 2).map(|v| v.0),
        invalid,
    }
}

pub fn run(path: &Path) -> Result<DepthSummary, AppError> {
    let summary = summarize(&DepthStack::load(path)?);
    println!("{}", path.display());
    println!("  maps:    {} x {}x{}", summary.count, summary.width, summary.height);
    match (summary.min, summary.median, summary.max) {
        (Some(min), Some(median), Some(max)) => {
            println!("  depth:   min {min:.4}  median {median:.4}  max {max:.4}");
        }
        _ => println!("  depth:   no positive values"),
    }
    println!("  invalid: {}", summary.invalid);
    Ok(summary)
}
