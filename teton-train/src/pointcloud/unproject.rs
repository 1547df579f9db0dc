//! Depth map to world-space points.

use crate::pointcloud::error::PointCloudError;
use crate::pointcloud::projector::{PixelGrid, prepare_frame};
use glam::{DMat3, DMat4, DVec3};
use image::RgbImage;
use teton_data::raster::is_selected;
use teton_data::{Camera, DepthMap, Mask, PointCloud};
use tracing::{debug, instrument};

/// Full inverse of an intrinsic matrix. Fails on a singular `K`.
pub fn invert_intrinsics(k: DMat3) -> Result<DMat3, PointCloudError> {
    let determinant = k.determinant();
    if !determinant.is_finite() || determinant.abs() < f64::EPSILON {
        return Err(PointCloudError::SingularIntrinsics { determinant });
    }
    Ok(k.inverse())
}

/// Maps grid pixels with a depth to world-space points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unprojection {
    k_inv: DMat3,
    rotation: DMat3,
    translation: DVec3,
    downsample: u32,
}

impl Unprojection {
    pub fn new(k: DMat3, world_from_camera: DMat4, downsample: u32) -> Result<Self, PointCloudError> {
        if downsample == 0 {
            return Err(PointCloudError::InvalidParameter {
                name: "downsample",
                reason: "must be at least 1".into(),
            });
        }
        Ok(Self {
            k_inv: invert_intrinsics(k)?,
            rotation: DMat3::from_mat4(world_from_camera),
            translation: world_from_camera.w_axis.truncate(),
            downsample,
        })
    }

    /// World point of grid pixel `(x, y)` at z-depth `depth`.
    pub fn point(&self, x: u32, y: u32, depth: f64) -> DVec3 {
        let f = self.downsample as f64;
        let pixel = DVec3::new((x as f64 + 0.5) * f, (y as f64 + 0.5) * f, 1.0);
        self.rotation * (self.k_inv * pixel) * depth + self.translation
    }

    /// Points and colors of every mask-selected pixel, in row-major order.
    ///
    /// Depth, RGB and mask must share one resolution. Depth is used as is,
    /// zero or negative values included.
    pub fn unproject(
        &self,
        depth: &DepthMap,
        rgb: &RgbImage,
        mask: &Mask,
    ) -> Result<(Vec<DVec3>, Vec<DVec3>), PointCloudError> {
        let dims = depth.dimensions();
        if rgb.dimensions() != dims {
            return Err(PointCloudError::DimensionMismatch {
                what: "rgb image",
                expected: dims,
                actual: rgb.dimensions(),
            });
        }
        if mask.dimensions() != dims {
            return Err(PointCloudError::DimensionMismatch {
                what: "mask",
                expected: dims,
                actual: mask.dimensions(),
            });
        }

        let mut points = Vec::new();
        let mut colors = Vec::new();
        for (x, y, d) in depth.enumerate_pixels() {
            if !is_selected(mask, x, y) {
                continue;
            }
            points.push(self.point(x, y, d[0] as f64));
            let c = rgb.get_pixel(x, y);
            colors.push(DVec3::new(c[0] as f64, c[1] as f64, c[2] as f64) / 255.0);
        }
        Ok((points, colors))
    }
}

/// Unproject mask-selected pixels with intrinsics `k` and pose `world_from_camera`.
pub fn unproject(
    k: DMat3,
    world_from_camera: DMat4,
    depth: &DepthMap,
    rgb: &RgbImage,
    mask: &Mask,
    downsample: u32,
) -> Result<(Vec<DVec3>, Vec<DVec3>), PointCloudError> {
    Unprojection::new(k, world_from_camera, downsample)?.unproject(depth, rgb, mask)
}

/// Points of one dataset frame: prepares the frame at `downsample` and
/// unprojects the selected pixels.
#[instrument(skip_all, fields(downsample = downsample))]
pub fn unproject_frame(
    camera: &Camera,
    rgb: &RgbImage,
    depth: &DepthMap,
    mask: Option<&Mask>,
    downsample: u32,
) -> Result<PointCloud, PointCloudError> {
    let expected = (camera.width, camera.height);
    if rgb.dimensions() != expected {
        return Err(PointCloudError::DimensionMismatch {
            what: "rgb image",
            expected,
            actual: rgb.dimensions(),
        });
    }
    let grid = PixelGrid::new(camera.width, camera.height, downsample)?;
    let frame = prepare_frame(rgb, depth, mask, downsample)?;
    debug_assert_eq!(grid.dimensions(), frame.rgb.dimensions());

    let (points, colors) = unproject(
        camera.intrinsic_matrix(),
        camera.camera_to_world,
        &frame.depth,
        &frame.rgb,
        &frame.mask,
        downsample,
    )?;
    debug!("Unprojected {} points on a {}x{} grid", points.len(), grid.width(), grid.height());
    Ok(PointCloud::new(points, colors)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DQuat;
    use image::{ImageBuffer, Luma, Rgb};
    use teton_data::Intrinsics;
    use teton_data::raster::{full_mask, selected_count, strided_mask};

    fn pose() -> DMat4 {
        DMat4::from_rotation_translation(
            DQuat::from_euler(glam::EulerRot::XYZ, 0.3, -0.2, 0.7),
            DVec3::new(1.0, -2.0, 0.5),
        )
    }

    fn k() -> DMat3 {
        Intrinsics::new(120.0, 110.0, 16.0, 12.0).matrix()
    }

    #[test]
    fn test_point_count_matches_mask() {
        let depth: DepthMap = ImageBuffer::from_pixel(32, 24, Luma([2.0]));
        let rgb = RgbImage::from_pixel(32, 24, Rgb([255, 0, 51]));
        let mask = strided_mask(32, 24, 5).unwrap();

        let (points, colors) = unproject(k(), pose(), &depth, &rgb, &mask, 1).unwrap();
        assert_eq!(points.len(), selected_count(&mask));
        assert_eq!(colors.len(), points.len());
        assert_eq!(colors[0], DVec3::new(1.0, 0.0, 0.2));
    }

    #[test]
    fn test_round_trip_through_projection() {
        let depth: DepthMap = ImageBuffer::from_fn(32, 24, |x, y| Luma([1.0 + 0.1 * x as f32 + 0.05 * y as f32]));
        let rgb = RgbImage::new(32, 24);
        let mask = full_mask(32, 24);
        let downsample = 2;
        let (points, _) = unproject(k(), pose(), &depth, &rgb, &mask, downsample).unwrap();

        let camera_from_world = pose().inverse();
        for (i, point) in points.iter().enumerate() {
            let (x, y) = ((i % 32) as u32, (i / 32) as u32);
            let local = camera_from_world.transform_point3(*point);
            let pixel = k() * local;
            let u = pixel.x / pixel.z;
            let v = pixel.y / pixel.z;
            assert!((u - (x as f64 + 0.5) * 2.0).abs() < 1e-6);
            assert!((v - (y as f64 + 0.5) * 2.0).abs() < 1e-6);
            assert!((local.z - depth.get_pixel(x, y)[0] as f64).abs() < 1e-6);
        }
    }

    #[test]
    fn test_non_positive_depth_passes_through() {
        let depth: DepthMap = ImageBuffer::from_raw(2, 1, vec![0.0, -1.0]).unwrap();
        let rgb = RgbImage::new(2, 1);
        let (points, _) = unproject(k(), DMat4::IDENTITY, &depth, &rgb, &full_mask(2, 1), 1).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], DVec3::ZERO);
        assert!(points[1].z < 0.0);
    }

    #[test]
    fn test_singular_intrinsics_rejected() {
        let singular = Intrinsics::new(0.0, 100.0, 1.0, 1.0).matrix();
        let result = Unprojection::new(singular, DMat4::IDENTITY, 1);
        assert!(matches!(result, Err(PointCloudError::SingularIntrinsics { .. })));
    }

    #[test]
    fn test_mismatched_sizes_rejected() {
        let depth: DepthMap = ImageBuffer::new(4, 4);
        let rgb = RgbImage::new(4, 3);
        let result = unproject(k(), DMat4::IDENTITY, &depth, &rgb, &full_mask(4, 4), 1);
        assert!(matches!(result, Err(PointCloudError::DimensionMismatch { what: "rgb image", .. })));
    }

    #[test]
    fn test_unproject_frame_default_selection() {
        let camera = Camera::new(Intrinsics::new(50.0, 50.0, 20.0, 20.0), DMat4::IDENTITY, 40, 40);
        let rgb = RgbImage::from_pixel(40, 40, Rgb([0, 255, 0]));
        let depth: DepthMap = ImageBuffer::from_pixel(40, 40, Luma([3.0]));
        let cloud = unproject_frame(&camera, &rgb, &depth, None, 2).unwrap();
        assert_eq!(cloud.len(), 16);
        assert!(cloud.points().iter().all(|p| (p.z - 3.0).abs() < 1e-9));
        assert!(unproject_frame(&camera, &RgbImage::new(8, 8), &depth, None, 1).is_err());
    }
}
