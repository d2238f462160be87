//! Indexed triangle mesh with per-vertex colors.

use glam::Vec3;

use crate::{MaskError, Result};

/// Color assigned to vertices of meshes that carry no colors of their own.
pub const DEFAULT_VERTEX_COLOR: Vec3 = Vec3::splat(0.5);

/// An indexed triangle mesh.
///
/// Positions, triangles and colors are stored as parallel arrays. The
/// topology (positions and triangles) is fixed at construction; only the
/// vertex colors may change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    colors: Vec<Vec3>,
}

impl TriangleMesh {
    /// Creates a mesh, checking that every triangle index is in range and
    /// that there is exactly one color per vertex.
    pub fn new(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>, colors: Vec<Vec3>) -> Result<Self> {
        if colors.len() != positions.len() {
            return Err(MaskError::SizeMismatch {
                expected: positions.len(),
                actual: colors.len(),
            });
        }

        let vertex_count = positions.len();
        for (face, triangle) in triangles.iter().enumerate() {
            if let Some(&vertex) = triangle.iter().find(|&&v| v as usize >= vertex_count) {
                return Err(MaskError::InvalidTriangle {
                    face,
                    vertex,
                    vertex_count,
                });
            }
        }

        Ok(Self {
            positions,
            triangles,
            colors,
        })
    }

    /// Creates a mesh where every vertex has [`DEFAULT_VERTEX_COLOR`].
    pub fn uncolored(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Result<Self> {
        let colors = vec![DEFAULT_VERTEX_COLOR; positions.len()];
        Self::new(positions, triangles, colors)
    }

    /// Axis-aligned unit cube with 8 vertices and 12 outward-facing triangles.
    pub fn unit_cube() -> Self {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        let colors = vec![DEFAULT_VERTEX_COLOR; positions.len()];
        Self {
            positions,
            triangles,
            colors,
        }
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    pub fn face_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn colors(&self) -> &[Vec3] {
        &self.colors
    }

    /// Mutable access to the vertex colors. The slice length is fixed.
    pub fn colors_mut(&mut self) -> &mut [Vec3] {
        &mut self.colors
    }

    /// Sets every vertex to the same color.
    pub fn fill_color(&mut self, color: Vec3) {
        self.colors.fill(color);
    }

    /// Returns the axis-aligned bounding box as (min, max), or `None` for a
    /// mesh without vertices.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_index() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let err = TriangleMesh::uncolored(positions, vec![[0, 1, 2], [0, 2, 3]]).unwrap_err();
        match err {
            MaskError::InvalidTriangle {
                face,
                vertex,
                vertex_count,
            } => {
                assert_eq!(face, 1);
                assert_eq!(vertex, 3);
                assert_eq!(vertex_count, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_color_mismatch() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let err = TriangleMesh::new(positions, vec![[0, 1, 2]], vec![Vec3::ONE]).unwrap_err();
        assert!(matches!(
            err,
            MaskError::SizeMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_unit_cube() {
        let cube = TriangleMesh::unit_cube();
        assert_eq!(cube.vertex_count(), 8);
        assert_eq!(cube.face_count(), 12);
        assert_eq!(cube.bounds(), Some((Vec3::ZERO, Vec3::ONE)));
        assert!(TriangleMesh::new(
            cube.positions().to_vec(),
            cube.triangles().to_vec(),
            cube.colors().to_vec()
        )
        .is_ok());
    }

    #[test]
    fn test_fill_color() {
        let mut cube = TriangleMesh::unit_cube();
        cube.fill_color(Vec3::X);
        assert!(cube.colors().iter().all(|&c| c == Vec3::X));
        cube.colors_mut()[3] = Vec3::ZERO;
        assert_eq!(cube.colors()[3], Vec3::ZERO);
    }
}
