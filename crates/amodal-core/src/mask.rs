//! Recoloring of a mesh according to a selected face region.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{FaceSet, Result, TriangleMesh};

/// Colors used for the binary masked/unmasked vertex coloring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskColors {
    /// Color of every vertex outside the mask.
    pub unmasked: Vec3,
    /// Sentinel color of vertices touching a masked face.
    pub masked: Vec3,
}

impl Default for MaskColors {
    fn default() -> Self {
        Self {
            unmasked: Vec3::splat(0.5),
            masked: Vec3::ZERO,
        }
    }
}

/// Overwrites the mesh colors with the mask coloring.
///
/// Every vertex first receives `colors.unmasked`; the vertices of the selected
/// faces are then set to `colors.masked`. The original colors are discarded.
/// Returns the number of masked vertices. Fails without touching the mesh
/// when `faces` does not range over the faces of `mesh`.
pub fn apply_mask(mesh: &mut TriangleMesh, faces: &FaceSet, colors: MaskColors) -> Result<usize> {
    let masked = faces.vertex_indices(mesh)?;
    mesh.fill_color(colors.unmasked);
    let vertex_colors = mesh.colors_mut();
    for &v in &masked {
        vertex_colors[v as usize] = colors.masked;
    }

    Ok(masked.len())
}
