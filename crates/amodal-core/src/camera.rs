//! Camera parameters (intrinsics and extrinsics) resolved from manifest frames.
//!
//! Manifest poses are camera-to-world transforms in the OpenGL convention
//! (camera looks down -Z, +Y up). The renderer expects the computer-vision
//! convention (camera looks down +Z, +Y down in the image), so poses are
//! right-multiplied by [`BASIS_CORRECTION`] before being inverted.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::{MaskError, Result};

/// Flips the camera Y and Z axes.
pub const BASIS_CORRECTION: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, -1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, -1.0, 0.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
);

/// A pose is singular when the absolute determinant of its 3x3 block is
/// below this fraction of the cubed length of its longest axis.
pub const SINGULAR_EPSILON: f32 = 1e-8;

/// One view of a scene as stored in the camera manifest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    /// Horizontal field of view in radians.
    pub camera_angle_x: f32,
    /// Camera-to-world transform, stored row-major in the manifest.
    #[serde(with = "row_major")]
    pub transform_matrix: Mat4,
}

/// Per-scene camera manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraManifest {
    pub frames: Vec<CameraFrame>,
}

impl CameraManifest {
    /// Parses a manifest from JSON. Unknown fields are ignored.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Pinhole camera intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
}

impl PinholeIntrinsics {
    /// Intrinsics for a horizontal field of view with square pixels and the
    /// principal point at the image center.
    ///
    /// `fov_x` must be finite and inside `(0, pi)`.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_fov(fov_x: f32, width: u32, height: u32) -> Result<Self> {
        if !fov_x.is_finite() || fov_x <= 0.0 || fov_x >= std::f32::consts::PI {
            return Err(MaskError::InvalidFieldOfView(fov_x));
        }
        let focal = 0.5 * width as f32 / (0.5 * fov_x).tan();
        Ok(Self {
            fx: focal,
            fy: focal,
            cx: width as f32 / 2.0,
            cy: height as f32 / 2.0,
            width,
            height,
        })
    }

    /// The 3x3 intrinsic matrix `K`.
    pub fn matrix(&self) -> Mat3 {
        Mat3::from_cols(
            Vec3::new(self.fx, 0.0, 0.0),
            Vec3::new(0.0, self.fy, 0.0),
            Vec3::new(self.cx, self.cy, 1.0),
        )
    }

    /// Projects a camera-space point to pixel coordinates. Points at or
    /// behind the camera plane yield `None`.
    pub fn project(&self, p: Vec3) -> Option<Vec2> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Vec2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }

    /// Clip-space projection for camera-space points.
    ///
    /// Pixel `(u, v)` maps to NDC `x = 2u/W - 1`, `y = 1 - 2v/H`; depth is
    /// mapped from `[near, far]` to `[0, 1]`.
    #[allow(clippy::cast_precision_loss)]
    pub fn projection_matrix(&self, near: f32, far: f32) -> Mat4 {
        let w = self.width as f32;
        let h = self.height as f32;
        let depth_scale = far / (far - near);
        Mat4::from_cols(
            Vec4::new(2.0 * self.fx / w, 0.0, 0.0, 0.0),
            Vec4::new(0.0, -2.0 * self.fy / h, 0.0, 0.0),
            Vec4::new(2.0 * self.cx / w - 1.0, 1.0 - 2.0 * self.cy / h, depth_scale, 1.0),
            Vec4::new(0.0, 0.0, -near * depth_scale, 0.0),
        )
    }
}

/// Intrinsics and world-to-camera transform for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCamera {
    pub intrinsics: PinholeIntrinsics,
    pub world_to_camera: Mat4,
}

impl ResolvedCamera {
    /// Camera position in world space.
    pub fn position(&self) -> Vec3 {
        self.world_to_camera.inverse().w_axis.truncate()
    }
}

/// Applies the basis correction to a manifest camera-to-world transform.
pub fn basis_correct(camera_to_world: Mat4) -> Mat4 {
    camera_to_world * BASIS_CORRECTION
}

/// Computes `inverse(basis_correct(camera_to_world))`.
///
/// Uniformly scaled poses are accepted at any scale; the singularity test is
/// relative to the length of the pose axes.
pub fn world_to_camera(camera_to_world: Mat4) -> Result<Mat4> {
    let block = Mat3::from_mat4(camera_to_world);
    let determinant = block.determinant();
    let axis = block
        .x_axis
        .length()
        .max(block.y_axis.length())
        .max(block.z_axis.length());
    let singular = !camera_to_world.is_finite()
        || !determinant.is_finite()
        || axis == 0.0
        || determinant.abs() < SINGULAR_EPSILON * axis.powi(3)
        || camera_to_world.determinant() == 0.0;
    if singular {
        return Err(MaskError::SingularTransform { determinant });
    }

    let inverse = basis_correct(camera_to_world).inverse();
    if !inverse.is_finite() {
        return Err(MaskError::SingularTransform { determinant });
    }
    Ok(inverse)
}

/// Resolves a manifest frame for a `width x height` image.
pub fn resolve_camera(frame: &CameraFrame, width: u32, height: u32) -> Result<ResolvedCamera> {
    Ok(ResolvedCamera {
        intrinsics: PinholeIntrinsics::from_fov(frame.camera_angle_x, width, height)?,
        world_to_camera: world_to_camera(frame.transform_matrix)?,
    })
}

/// Serde adapter for matrices written as nested row arrays.
mod row_major {
    use glam::Mat4;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(m: &Mat4, serializer: S) -> Result<S::Ok, S::Error> {
        m.transpose().to_cols_array_2d().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mat4, D::Error> {
        let rows = <[[f32; 4]; 4]>::deserialize(deserializer)?;
        Ok(Mat4::from_cols_array_2d(&rows).transpose())
    }
}
