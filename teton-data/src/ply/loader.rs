//! PLY point cloud loading

use crate::error::DataError;
use crate::types::PointCloud;
use glam::DVec3;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

// serde_ply needs flexible rows, so vertices come back as property maps
#[derive(Deserialize, Debug)]
struct PlyFile {
    #[serde(rename = "vertex")]
    vertex: Vec<HashMap<String, JsonValue>>,
}

const DEFAULT_COLOR: DVec3 = DVec3::new(0.8, 0.8, 0.8);

/// Load a point cloud from a PLY file (ASCII or binary).
///
/// Requires `x, y, z`. Colors come from `red/green/blue` or `r/g/b`
/// (bytes are scaled to `[0, 1]`, floats are taken as-is); normals from
/// `nx, ny, nz` when every vertex has them.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_point_cloud_ply(path: &Path) -> Result<PointCloud, DataError> {
    debug!("Loading PLY point cloud");
    read_point_cloud_ply(BufReader::new(File::open(path)?))
}

/// Parse a PLY point cloud from any buffered reader.
pub fn read_point_cloud_ply<R: BufRead>(reader: R) -> Result<PointCloud, DataError> {
    let ply_data: PlyFile = serde_ply::from_reader(reader).map_err(|e| {
        warn!("Failed to parse PLY file: {}", e);
        DataError::Ply(e.to_string())
    })?;

    info!("PLY file parsed: {} vertices", ply_data.vertex.len());

    fn get_f64(prop: Option<&JsonValue>) -> Option<f64> {
        prop.and_then(JsonValue::as_f64)
    }

    fn get_channel(prop: Option<&JsonValue>) -> Option<f64> {
        match prop? {
            JsonValue::Number(n) if n.is_u64() || n.is_i64() => n.as_f64().map(|v| v / 255.0),
            JsonValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    fn get_color(vertex: &HashMap<String, JsonValue>, keys: [&str; 3]) -> Option<DVec3> {
        Some(DVec3::new(
            get_channel(vertex.get(keys[0]))?,
            get_channel(vertex.get(keys[1]))?,
            get_channel(vertex.get(keys[2]))?,
        ))
    }

    let count = ply_data.vertex.len();
    let mut points = Vec::with_capacity(count);
    let mut colors = Vec::with_capacity(count);
    let mut normals = Vec::with_capacity(count);

    for (i, vertex) in ply_data.vertex.iter().enumerate() {
        let coord = |key: &str| {
            get_f64(vertex.get(key))
                .ok_or_else(|| DataError::Ply(format!("Missing '{}' at vertex {}", key, i)))
        };
        points.push(DVec3::new(coord("x")?, coord("y")?, coord("z")?));

        let color = get_color(vertex, ["red", "green", "blue"])
            .or_else(|| get_color(vertex, ["r", "g", "b"]))
            .unwrap_or(DEFAULT_COLOR);
        colors.push(color);

        if let (Some(nx), Some(ny), Some(nz)) = (
            get_f64(vertex.get("nx")),
            get_f64(vertex.get("ny")),
            get_f64(vertex.get("nz")),
        ) {
            normals.push(DVec3::new(nx, ny, nz));
        }
    }

    let cloud = PointCloud::new(points, colors)?;
    if !normals.is_empty() && normals.len() == count {
        debug!("Loaded {} points with normals", count);
        return cloud.with_normals(normals);
    }
    if !normals.is_empty() {
        warn!(
            "Only {} of {} vertices carry normals, ignoring them",
            normals.len(),
            count
        );
    }
    debug!("Loaded {} points", count);
    Ok(cloud)
}
