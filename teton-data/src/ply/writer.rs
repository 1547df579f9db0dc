//! PLY point cloud export

use crate::error::DataError;
use crate::types::PointCloud;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Encoding of the vertex payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlyFormat {
    Ascii,
    #[default]
    BinaryLittleEndian,
}

impl PlyFormat {
    fn header_name(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::BinaryLittleEndian => "binary_little_endian",
        }
    }
}

fn color_byte(channel: f64) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Write `cloud` to `path`.
#[tracing::instrument(skip_all, fields(path = %path.display(), points = cloud.len()))]
pub fn save_point_cloud_ply(
    cloud: &PointCloud,
    path: &Path,
    format: PlyFormat,
) -> Result<(), DataError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_point_cloud_ply(cloud, &mut writer, format)?;
    writer.flush()?;
    info!("Wrote {} points", cloud.len());
    Ok(())
}

/// Serialize `cloud` as PLY: `double x y z`, `uchar red green blue` and,
/// when present, `double nx ny nz`.
pub fn write_point_cloud_ply<W: Write>(
    cloud: &PointCloud,
    writer: &mut W,
    format: PlyFormat,
) -> Result<(), DataError> {
    let normals = cloud.normals();

    writeln!(writer, "ply")?;
    writeln!(writer, "format {} 1.0", format.header_name())?;
    writeln!(writer, "element vertex {}", cloud.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(writer, "property double {axis}")?;
    }
    for channel in ["red", "green", "blue"] {
        writeln!(writer, "property uchar {channel}")?;
    }
    if normals.is_some() {
        for axis in ["nx", "ny", "nz"] {
            writeln!(writer, "property double {axis}")?;
        }
    }
    writeln!(writer, "end_header")?;

    for (i, (point, color)) in cloud.points().iter().zip(cloud.colors()).enumerate() {
        let rgb = [color_byte(color.x), color_byte(color.y), color_byte(color.z)];
        let normal = normals.map(|n| n[i]);
        match format {
            PlyFormat::Ascii => {
                write!(
                    writer,
                    "{} {} {} {} {} {}",
                    point.x, point.y, point.z, rgb[0], rgb[1], rgb[2]
                )?;
                if let Some(n) = normal {
                    write!(writer, " {} {} {}", n.x, n.y, n.z)?;
                }
                writeln!(writer)?;
            }
            PlyFormat::BinaryLittleEndian => {
                for v in point.to_array() {
                    writer.write_all(&v.to_le_bytes())?;
                }
                writer.write_all(&rgb)?;
                if let Some(n) = normal {
                    for v in n.to_array() {
                        writer.write_all(&v.to_le_bytes())?;
                    }
                }
            }
        }
    }
    Ok(())
}
