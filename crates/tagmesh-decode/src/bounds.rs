//! Compression bounds and vertex dequantization.

use glam::{Mat4, Vec2, Vec3, Vec4};
use tagmesh_records::CompressionInfoRecord;

use crate::WORLD_UNITS_PER_TAG_UNIT;
use crate::error::{DecodeError, DecodeResult};

/// Affine boxes that map normalized positions and texcoords into world space.
///
/// The two corners of each box are kept as given. Reversed corners are legal
/// and simply mirror the mapping; zero-extent axes map every value to the
/// corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionBounds {
    /// `(x0, y0, z0)` in world units.
    pub position_0: Vec3,
    /// `(x1, y1, z1)` in world units.
    pub position_1: Vec3,
    /// `(u0, v0)`.
    pub uv_0: Vec2,
    /// `(u1, v1)`.
    pub uv_1: Vec2,
}

impl CompressionBounds {
    /// Build bounds from already scaled corners.
    pub fn new(position_0: Vec3, position_1: Vec3, uv_0: Vec2, uv_1: Vec2) -> DecodeResult<Self> {
        let finite = position_0.is_finite()
            && position_1.is_finite()
            && uv_0.is_finite()
            && uv_1.is_finite();
        if !finite {
            return Err(DecodeError::NonFiniteCompressionBounds);
        }
        Ok(Self {
            position_0,
            position_1,
            uv_0,
            uv_1,
        })
    }

    /// Build bounds from a `compression info` element.
    ///
    /// The position fields interleave the axes: `position bounds 0` holds
    /// `(x0, x1, y0)` and `position bounds 1` holds `(y1, z0, z1)`.
    pub fn from_record(record: &CompressionInfoRecord) -> DecodeResult<Self> {
        let [x0, x1, y0] = record.position_bounds_0;
        let [y1, z0, z1] = record.position_bounds_1;
        let [u0, u1] = record.texcoord_bounds_0;
        let [v0, v1] = record.texcoord_bounds_1;
        Self::new(
            Vec3::new(x0, y0, z0) * WORLD_UNITS_PER_TAG_UNIT,
            Vec3::new(x1, y1, z1) * WORLD_UNITS_PER_TAG_UNIT,
            Vec2::new(u0, v0),
            Vec2::new(u1, v1),
        )
    }

    /// Bounds for `mesh`, taken from the first `compression info` element.
    pub fn for_mesh(records: &[CompressionInfoRecord], mesh: usize) -> DecodeResult<Self> {
        let record = records
            .first()
            .ok_or(DecodeError::MissingCompressionInfo { mesh })?;
        Self::from_record(record)
    }

    /// Map a normalized position into the position box.
    #[must_use]
    pub fn dequantize(&self, normalized: Vec3) -> Vec3 {
        self.position_0 + normalized * self.extent()
    }

    /// Inverse of [`Self::dequantize`]. Zero-extent axes map to `0`.
    #[must_use]
    pub fn normalize(&self, position: Vec3) -> Vec3 {
        let extent = self.extent();
        let offset = position - self.position_0;
        Vec3::select(extent.cmpeq(Vec3::ZERO), Vec3::ZERO, offset / extent)
    }

    /// Map a normalized texcoord into the UV box.
    ///
    /// V is flipped after interpolation (`1 - v`) to match the Y-down UV
    /// convention of the host scene.
    #[must_use]
    pub fn dequantize_uv(&self, normalized: Vec2) -> Vec2 {
        let uv = self.uv_0 + normalized * (self.uv_1 - self.uv_0);
        Vec2::new(uv.x, 1.0 - uv.y)
    }

    /// Signed size of the position box.
    #[must_use]
    pub fn extent(&self) -> Vec3 {
        self.position_1 - self.position_0
    }

    /// The position mapping as an affine matrix.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        let extent = self.extent();
        Mat4::from_cols(
            Vec4::new(extent.x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, extent.y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, extent.z, 0.0),
            self.position_0.extend(1.0),
        )
    }

    /// Display size for markers, proportional to the largest box extent.
    #[must_use]
    pub fn marker_size_factor(&self) -> f32 {
        self.extent().max_element() * 0.025
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record() -> CompressionInfoRecord {
        CompressionInfoRecord {
            position_bounds_0: [-1.0, 1.0, -2.0],
            position_bounds_1: [2.0, 0.0, 0.5],
            texcoord_bounds_0: [0.0, 2.0],
            texcoord_bounds_1: [0.0, 4.0],
        }
    }

    #[test]
    fn record_axes_are_interleaved_and_scaled() {
        let bounds = CompressionBounds::from_record(&record()).unwrap();
        assert_eq!(bounds.position_0, Vec3::new(-100.0, -200.0, 0.0));
        assert_eq!(bounds.position_1, Vec3::new(100.0, 200.0, 50.0));
        assert_eq!(bounds.uv_0, Vec2::new(0.0, 0.0));
        assert_eq!(bounds.uv_1, Vec2::new(2.0, 4.0));
    }

    #[test]
    fn dequantize_interpolates_each_axis() {
        let bounds = CompressionBounds::from_record(&record()).unwrap();
        assert_eq!(bounds.dequantize(Vec3::ZERO), bounds.position_0);
        assert_eq!(bounds.dequantize(Vec3::ONE), bounds.position_1);
        assert_eq!(
            bounds.dequantize(Vec3::splat(0.5)),
            Vec3::new(0.0, 0.0, 25.0)
        );
    }

    #[test]
    fn uv_is_flipped_after_interpolation() {
        let bounds = CompressionBounds::from_record(&record()).unwrap();
        assert_eq!(bounds.dequantize_uv(Vec2::new(0.5, 0.25)), Vec2::new(1.0, 0.0));
        assert_eq!(bounds.dequantize_uv(Vec2::ZERO), Vec2::new(0.0, 1.0));
    }

    #[test]
    fn zero_extent_maps_to_origin() {
        let corner = Vec3::new(5.0, 5.0, 5.0);
        let bounds = CompressionBounds::new(corner, corner, Vec2::ZERO, Vec2::ONE).unwrap();
        assert_eq!(bounds.dequantize(Vec3::new(0.3, 0.9, 0.1)), corner);
        assert_eq!(bounds.normalize(corner), Vec3::ZERO);
    }

    #[test]
    fn reversed_bounds_are_preserved() {
        let bounds = CompressionBounds::new(Vec3::ONE, Vec3::ZERO, Vec2::ZERO, Vec2::ONE).unwrap();
        assert_eq!(bounds.dequantize(Vec3::splat(0.25)), Vec3::splat(0.75));
    }

    #[test]
    fn matrix_matches_dequantize() {
        let bounds = CompressionBounds::from_record(&record()).unwrap();
        let p = Vec3::new(0.2, 0.7, 0.4);
        let via_matrix = bounds.matrix().transform_point3(p);
        assert!(via_matrix.abs_diff_eq(bounds.dequantize(p), 1e-4));
    }

    #[test]
    fn non_finite_bounds_are_rejected() {
        let result = CompressionBounds::new(Vec3::NAN, Vec3::ONE, Vec2::ZERO, Vec2::ONE);
        assert_eq!(result, Err(DecodeError::NonFiniteCompressionBounds));
    }

    #[test]
    fn missing_compression_info_is_fatal() {
        assert_eq!(
            CompressionBounds::for_mesh(&[], 4),
            Err(DecodeError::MissingCompressionInfo { mesh: 4 })
        );
    }

    proptest! {
        #[test]
        fn repeated_dequantization_is_stable(
            corner_0 in prop::array::uniform3(-1000.0f32..1000.0),
            corner_1 in prop::array::uniform3(-1000.0f32..1000.0),
            t in prop::array::uniform3(0.0f32..=1.0),
        ) {
            let bounds = CompressionBounds::new(
                Vec3::from(corner_0),
                Vec3::from(corner_1),
                Vec2::ZERO,
                Vec2::ONE,
            ).unwrap();
            let once = bounds.dequantize(Vec3::from(t));
            let again = bounds.dequantize(bounds.normalize(once));
            prop_assert!(again.abs_diff_eq(once, 1e-2));
            prop_assert_eq!(bounds.dequantize(Vec3::from(t)), once);
        }
    }
}
