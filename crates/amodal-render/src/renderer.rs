//! The offscreen renderer contract and the scoped geometry guard.

use std::ops::{Deref, DerefMut};

use amodal_core::{PinholeIntrinsics, TriangleMesh};
use glam::{Mat4, Vec3, Vec4};
use image::RgbaImage;

use crate::{RenderError, RenderResult};

/// Default near clipping plane distance.
pub const DEFAULT_NEAR: f32 = 0.01;
/// Default far clipping plane distance.
pub const DEFAULT_FAR: f32 = 100.0;

/// Unlit material. Fragments take the interpolated vertex color multiplied
/// by `base_color`; no lighting is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Color multiplied with the vertex colors (RGBA).
    pub base_color: Vec4,
    /// When false, triangles facing away from the camera are culled.
    pub double_sided: bool,
}

impl Material {
    /// Plain vertex colors, both sides visible.
    pub fn unlit() -> Self {
        Self {
            base_color: Vec4::ONE,
            double_sided: true,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::unlit()
    }
}

/// Camera state shared by the renderer backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSetup {
    pub intrinsics: PinholeIntrinsics,
    pub world_to_camera: Mat4,
    pub near: f32,
    pub far: f32,
}

impl CameraSetup {
    /// Combined world-to-clip transform.
    pub fn view_projection(&self) -> Mat4 {
        self.intrinsics.projection_matrix(self.near, self.far) * self.world_to_camera
    }
}

/// A renderer that draws named geometry into an off-screen RGBA image.
///
/// Implementations hold mutable scene state (geometry and camera) and are
/// not meant to be shared between threads without external locking.
pub trait OffscreenRenderer {
    /// Render target size as (width, height).
    fn resolution(&self) -> (u32, u32);

    /// Adds a mesh under `name`. Fails if the name is taken.
    fn add_geometry(&mut self, name: &str, mesh: &TriangleMesh, material: &Material)
        -> RenderResult<()>;

    /// Removes the geometry called `name`, returning whether it existed.
    fn remove_geometry(&mut self, name: &str) -> bool;

    fn has_geometry(&self, name: &str) -> bool;

    /// Number of geometries in the scene.
    fn geometry_count(&self) -> usize;

    /// Sets the active camera. The intrinsics must match the resolution.
    fn setup_camera(
        &mut self,
        intrinsics: &PinholeIntrinsics,
        world_to_camera: Mat4,
    ) -> RenderResult<()>;

    /// Sets the near and far clipping distances used by later camera setups.
    fn set_clip_planes(&mut self, near: f32, far: f32);

    /// Sets the clear color.
    fn set_background(&mut self, color: Vec3);

    /// Renders the scene synchronously.
    fn render_to_image(&mut self) -> RenderResult<RgbaImage>;
}

/// Checks that intrinsics were computed for a `width x height` target.
pub(crate) fn check_camera_size(
    intrinsics: &PinholeIntrinsics,
    width: u32,
    height: u32,
) -> RenderResult<()> {
    if intrinsics.width == width && intrinsics.height == height {
        Ok(())
    } else {
        Err(RenderError::CameraSizeMismatch {
            camera_width: intrinsics.width,
            camera_height: intrinsics.height,
            width,
            height,
        })
    }
}

/// Converts a linear color in `[0, 1]` to 8-bit RGBA.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn to_rgba8(color: Vec4) -> [u8; 4] {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
}

/// Geometry added to a renderer for the lifetime of the guard.
///
/// The geometry is removed when the guard is dropped, including when the
/// render loop exits early with an error. The guard dereferences to the
/// renderer so frames can be rendered through it.
pub struct GeometryScope<'r, R: OffscreenRenderer + ?Sized> {
    renderer: &'r mut R,
    name: String,
}

impl<'r, R: OffscreenRenderer + ?Sized> GeometryScope<'r, R> {
    /// Adds `mesh` to `renderer` under `name`.
    pub fn add(
        renderer: &'r mut R,
        name: &str,
        mesh: &TriangleMesh,
        material: &Material,
    ) -> RenderResult<Self> {
        renderer.add_geometry(name, mesh, material)?;
        Ok(Self {
            renderer,
            name: name.to_string(),
        })
    }

    /// Name of the guarded geometry.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<R: OffscreenRenderer + ?Sized> Deref for GeometryScope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.renderer
    }
}

impl<R: OffscreenRenderer + ?Sized> DerefMut for GeometryScope<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.renderer
    }
}

impl<R: OffscreenRenderer + ?Sized> Drop for GeometryScope<'_, R> {
    fn drop(&mut self) {
        if !self.renderer.remove_geometry(&self.name) {
            log::warn!("geometry '{}' was already removed", self.name);
        }
    }
}
