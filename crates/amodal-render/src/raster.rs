//! CPU rasterizer implementing [`OffscreenRenderer`].
//!
//! Triangles are clipped against the near and far planes in clip space,
//! rasterized at pixel centers with a depth buffer, and shaded with
//! perspective-correct vertex color interpolation. Output is deterministic
//! and needs no graphics adapter.

use amodal_core::{PinholeIntrinsics, TriangleMesh};
use glam::{Mat4, Vec2, Vec3, Vec4};
use image::RgbaImage;

use crate::renderer::{check_camera_size, to_rgba8, CameraSetup, DEFAULT_FAR, DEFAULT_NEAR};
use crate::screenshot::image_from_rgba;
use crate::{Material, OffscreenRenderer, RenderError, RenderResult};

struct RasterGeometry {
    name: String,
    positions: Vec<Vec3>,
    colors: Vec<Vec4>,
    triangles: Vec<[u32; 3]>,
    double_sided: bool,
}

#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    pos: Vec4,
    color: Vec4,
}

impl ClipVertex {
    fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            pos: self.pos.lerp(other.pos, t),
            color: self.color.lerp(other.color, t),
        }
    }
}

/// Vertex after the perspective divide, in pixel coordinates.
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    xy: Vec2,
    depth: f32,
    inv_w: f32,
    color: Vec4,
}

/// Software renderer producing RGBA8 images.
pub struct SoftwareRenderer {
    width: u32,
    height: u32,
    geometries: Vec<RasterGeometry>,
    camera: Option<CameraSetup>,
    near: f32,
    far: f32,
    background: Vec3,
}

impl SoftwareRenderer {
    /// Creates a renderer with a `width x height` target and white background.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            geometries: Vec::new(),
            camera: None,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            background: Vec3::ONE,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn to_screen(&self, v: ClipVertex) -> ScreenVertex {
        let inv_w = 1.0 / v.pos.w;
        let ndc = v.pos.truncate() * inv_w;
        ScreenVertex {
            xy: Vec2::new(
                (ndc.x + 1.0) * 0.5 * self.width as f32,
                (1.0 - ndc.y) * 0.5 * self.height as f32,
            ),
            depth: ndc.z,
            inv_w,
            color: v.color,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn rasterize(
        &self,
        tri: [ScreenVertex; 3],
        double_sided: bool,
        color: &mut [[u8; 4]],
        depth: &mut [f32],
    ) {
        let [a, b, c] = tri;
        let area = edge(a.xy, b.xy, c.xy);
        if area == 0.0 || !area.is_finite() {
            return;
        }
        // Pixel rows grow downward, so counter-clockwise triangles in NDC
        // have negative area here.
        if !double_sided && area > 0.0 {
            return;
        }

        let min = a.xy.min(b.xy).min(c.xy);
        let max = a.xy.max(b.xy).max(c.xy);
        let width = self.width as f32;
        let height = self.height as f32;
        if max.x < 0.0 || max.y < 0.0 || min.x >= width || min.y >= height {
            return;
        }
        let x0 = min.x.max(0.0).floor() as usize;
        let y0 = min.y.max(0.0).floor() as usize;
        let x1 = max.x.min(width).ceil() as usize;
        let y1 = max.y.min(height).ceil() as usize;
        let stride = self.width as usize;

        for py in y0..y1 {
            for px in x0..x1 {
                let p = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
                let l0 = edge(b.xy, c.xy, p) / area;
                let l1 = edge(c.xy, a.xy, p) / area;
                let l2 = edge(a.xy, b.xy, p) / area;
                if l0 < 0.0 || l1 < 0.0 || l2 < 0.0 {
                    continue;
                }

                let z = l0 * a.depth + l1 * b.depth + l2 * c.depth;
                let idx = py * stride + px;
                if !(0.0..=1.0).contains(&z) || z >= depth[idx] {
                    continue;
                }

                let q0 = l0 * a.inv_w;
                let q1 = l1 * b.inv_w;
                let q2 = l2 * c.inv_w;
                let shaded = (a.color * q0 + b.color * q1 + c.color * q2) / (q0 + q1 + q2);

                depth[idx] = z;
                color[idx] = to_rgba8(shaded);
            }
        }
    }
}

impl OffscreenRenderer for SoftwareRenderer {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn add_geometry(
        &mut self,
        name: &str,
        mesh: &TriangleMesh,
        material: &Material,
    ) -> RenderResult<()> {
        if self.has_geometry(name) {
            return Err(RenderError::GeometryExists(name.to_string()));
        }
        self.geometries.push(RasterGeometry {
            name: name.to_string(),
            positions: mesh.positions().to_vec(),
            colors: mesh
                .colors()
                .iter()
                .map(|c| c.extend(1.0) * material.base_color)
                .collect(),
            triangles: mesh.triangles().to_vec(),
            double_sided: material.double_sided,
        });
        log::debug!(
            "added geometry '{name}' ({} triangles)",
            mesh.face_count()
        );
        Ok(())
    }

    fn remove_geometry(&mut self, name: &str) -> bool {
        let before = self.geometries.len();
        self.geometries.retain(|g| g.name != name);
        self.geometries.len() != before
    }

    fn has_geometry(&self, name: &str) -> bool {
        self.geometries.iter().any(|g| g.name == name)
    }

    fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    fn setup_camera(
        &mut self,
        intrinsics: &PinholeIntrinsics,
        world_to_camera: Mat4,
    ) -> RenderResult<()> {
        check_camera_size(intrinsics, self.width, self.height)?;
        self.camera = Some(CameraSetup {
            intrinsics: *intrinsics,
            world_to_camera,
            near: self.near,
            far: self.far,
        });
        Ok(())
    }

    fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        if let Some(camera) = &mut self.camera {
            camera.near = near;
            camera.far = far;
        }
    }

    fn set_background(&mut self, color: Vec3) {
        self.background = color;
    }

    fn render_to_image(&mut self) -> RenderResult<RgbaImage> {
        let camera = self.camera.ok_or(RenderError::CameraNotSet)?;
        let view_proj = camera.view_projection();

        let pixel_count = self.width as usize * self.height as usize;
        let mut color = vec![to_rgba8(self.background.extend(1.0)); pixel_count];
        let mut depth = vec![f32::INFINITY; pixel_count];

        for geometry in &self.geometries {
            let clip: Vec<Vec4> = geometry
                .positions
                .iter()
                .map(|p| view_proj * p.extend(1.0))
                .collect();

            for tri in &geometry.triangles {
                let vertices = tri.map(|i| ClipVertex {
                    pos: clip[i as usize],
                    color: geometry.colors[i as usize],
                });
                let polygon = clip_polygon(&vertices);
                if polygon.len() < 3 {
                    continue;
                }
                let first = self.to_screen(polygon[0]);
                for pair in polygon[1..].windows(2) {
                    let tri = [first, self.to_screen(pair[0]), self.to_screen(pair[1])];
                    self.rasterize(tri, geometry.double_sided, &mut color, &mut depth);
                }
            }
        }

        let data = color.into_iter().flatten().collect();
        Ok(image_from_rgba(data, self.width, self.height)?)
    }
}

/// Signed area term of `p` relative to the directed edge `a -> b`.
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Clips a triangle against the near (`z >= 0`) and far (`z <= w`) planes.
fn clip_polygon(triangle: &[ClipVertex; 3]) -> Vec<ClipVertex> {
    let near = clip_against(triangle, |p| p.z);
    clip_against(&near, |p| p.w - p.z)
}

/// One Sutherland-Hodgman step keeping the side where `distance >= 0`.
fn clip_against(polygon: &[ClipVertex], distance: impl Fn(Vec4) -> f32) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for (i, &a) in polygon.iter().enumerate() {
        let b = polygon[(i + 1) % polygon.len()];
        let da = distance(a.pos);
        let db = distance(b.pos);
        if da >= 0.0 {
            out.push(a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            out.push(a.lerp(b, da / (da - db)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use amodal_core::{resolve_camera, CameraFrame};
    use image::Rgba;

    const SIZE: u32 = 32;

    /// Camera on +Z looking at the origin, 90 degree field of view.
    fn frontal_camera(distance: f32) -> (PinholeIntrinsics, Mat4) {
        let frame = CameraFrame {
            camera_angle_x: std::f32::consts::FRAC_PI_2,
            transform_matrix: Mat4::from_translation(Vec3::new(0.0, 0.0, distance)),
        };
        let camera = resolve_camera(&frame, SIZE, SIZE).unwrap();
        (camera.intrinsics, camera.world_to_camera)
    }

    /// Square in the plane `z`, counter-clockwise seen from +Z.
    fn quad(half: f32, z: f32, color: Vec3) -> TriangleMesh {
        TriangleMesh::new(
            vec![
                Vec3::new(-half, -half, z),
                Vec3::new(half, -half, z),
                Vec3::new(half, half, z),
                Vec3::new(-half, half, z),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
            vec![color; 4],
        )
        .unwrap()
    }

    fn renderer_with_camera() -> SoftwareRenderer {
        let mut renderer = SoftwareRenderer::new(SIZE, SIZE).unwrap();
        let (k, w2c) = frontal_camera(3.0);
        renderer.setup_camera(&k, w2c).unwrap();
        renderer
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(SoftwareRenderer::new(0, 4).is_err());
    }

    #[test]
    fn test_render_requires_camera() {
        let mut renderer = SoftwareRenderer::new(4, 4).unwrap();
        assert!(matches!(
            renderer.render_to_image(),
            Err(RenderError::CameraNotSet)
        ));
    }

    #[test]
    fn test_camera_size_mismatch() {
        let mut renderer = SoftwareRenderer::new(16, 16).unwrap();
        let (k, w2c) = frontal_camera(3.0);
        assert!(matches!(
            renderer.setup_camera(&k, w2c),
            Err(RenderError::CameraSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_scene_is_background() {
        let mut renderer = renderer_with_camera();
        renderer.set_background(Vec3::new(0.0, 0.0, 1.0));
        let img = renderer.render_to_image().unwrap();
        assert_eq!(img.dimensions(), (SIZE, SIZE));
        assert!(img.pixels().all(|p| *p == Rgba([0, 0, 255, 255])));
    }

    #[test]
    fn test_quad_covers_center_only() {
        let mut renderer = renderer_with_camera();
        renderer
            .add_geometry("quad", &quad(1.0, 0.0, Vec3::splat(0.5)), &Material::unlit())
            .unwrap();
        let img = renderer.render_to_image().unwrap();
        assert_eq!(*img.get_pixel(16, 16), Rgba([128, 128, 128, 255]));
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(31, 31), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_depth_test_independent_of_order() {
        for reversed in [false, true] {
            let mut renderer = renderer_with_camera();
            let near = quad(0.5, 1.0, Vec3::ZERO);
            let far = quad(1.0, 0.0, Vec3::X);
            let (first, second) = if reversed { (&far, &near) } else { (&near, &far) };
            renderer.add_geometry("a", first, &Material::unlit()).unwrap();
            renderer.add_geometry("b", second, &Material::unlit()).unwrap();
            let img = renderer.render_to_image().unwrap();
            assert_eq!(*img.get_pixel(16, 16), Rgba([0, 0, 0, 255]));
            // Outside the near quad but inside the far one.
            assert_eq!(*img.get_pixel(16, 20), Rgba([255, 0, 0, 255]));
        }
    }

    #[test]
    fn test_back_face_culling() {
        let mut renderer = renderer_with_camera();
        let flipped = TriangleMesh::new(
            quad(1.0, 0.0, Vec3::ZERO).positions().to_vec(),
            vec![[0, 2, 1], [0, 3, 2]],
            vec![Vec3::ZERO; 4],
        )
        .unwrap();
        let culled = Material {
            double_sided: false,
            ..Material::unlit()
        };
        renderer.add_geometry("back", &flipped, &culled).unwrap();
        renderer.add_geometry("front", &quad(0.5, 0.0, Vec3::Y), &culled).unwrap();
        let img = renderer.render_to_image().unwrap();
        assert_eq!(*img.get_pixel(16, 16), Rgba([0, 255, 0, 255]));
        assert_eq!(*img.get_pixel(16, 19), Rgba([255, 255, 255, 255]));

        renderer.remove_geometry("back");
        renderer.add_geometry("back", &flipped, &Material::unlit()).unwrap();
        let img = renderer.render_to_image().unwrap();
        assert_eq!(*img.get_pixel(16, 19), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_base_color_tint() {
        let mut renderer = renderer_with_camera();
        let material = Material {
            base_color: Vec4::new(1.0, 0.0, 1.0, 1.0),
            ..Material::unlit()
        };
        renderer
            .add_geometry("quad", &quad(1.0, 0.0, Vec3::ONE), &material)
            .unwrap();
        let img = renderer.render_to_image().unwrap();
        assert_eq!(*img.get_pixel(16, 16), Rgba([255, 0, 255, 255]));
    }

    #[test]
    fn test_triangle_through_camera_plane_is_clipped() {
        let mut renderer = renderer_with_camera();
        // Floor triangle reaching behind the camera.
        let mesh = TriangleMesh::new(
            vec![
                Vec3::new(-1.0, -0.5, -2.0),
                Vec3::new(1.0, -0.5, -2.0),
                Vec3::new(0.0, -0.5, 10.0),
            ],
            vec![[0, 1, 2]],
            vec![Vec3::ZERO; 3],
        )
        .unwrap();
        renderer.add_geometry("floor", &mesh, &Material::unlit()).unwrap();
        let img = renderer.render_to_image().unwrap();
        let covered = img.pixels().filter(|p| p.0[0] == 0).count();
        assert!(covered > 0);
        assert!(covered < (SIZE * SIZE) as usize);
        // The floor is below the horizon.
        assert_eq!(*img.get_pixel(16, 2), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut renderer = renderer_with_camera();
        let mut cube = TriangleMesh::unit_cube();
        cube.colors_mut()[0] = Vec3::ZERO;
        renderer.add_geometry("cube", &cube, &Material::unlit()).unwrap();
        let a = renderer.render_to_image().unwrap();
        let b = renderer.render_to_image().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_clip_polygon_keeps_inside_triangle() {
        let v = |x: f32, z: f32, w: f32| ClipVertex {
            pos: Vec4::new(x, 0.0, z, w),
            color: Vec4::ONE,
        };
        let inside = [v(0.0, 0.5, 1.0), v(1.0, 0.5, 1.0), v(0.0, 0.6, 1.0)];
        assert_eq!(clip_polygon(&inside).len(), 3);

        let straddling = [v(0.0, -0.5, 1.0), v(1.0, 0.5, 1.0), v(0.0, 0.5, 1.0)];
        let clipped = clip_polygon(&straddling);
        assert_eq!(clipped.len(), 4);
        assert!(clipped.iter().all(|c| c.pos.z >= -1e-6));

        let behind = [v(0.0, -0.5, 1.0), v(1.0, -0.5, 1.0), v(0.0, -0.6, 1.0)];
        assert!(clip_polygon(&behind).is_empty());
    }

    proptest::proptest! {
        #[test]
        fn prop_clipped_vertices_inside_depth_range(
            coords in proptest::collection::vec(-5.0f32..5.0, 9),
        ) {
            let tri: [ClipVertex; 3] = std::array::from_fn(|i| ClipVertex {
                pos: Vec4::new(coords[3 * i], coords[3 * i + 1], coords[3 * i + 2], 1.0),
                color: Vec4::ONE,
            });
            let clipped = clip_polygon(&tri);
            proptest::prop_assert!(clipped.is_empty() || clipped.len() >= 3);
            proptest::prop_assert!(clipped.len() <= 5);
            for c in &clipped {
                proptest::prop_assert!(c.pos.z >= -1e-4);
                proptest::prop_assert!(c.pos.w - c.pos.z >= -1e-4);
            }
        }
    }
}
