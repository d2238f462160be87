//! Compares the wgpu engine against the CPU rasterizer.
//!
//! Skipped when no GPU adapter is available (CI without GPU, containers).

use amodal_core::{resolve_camera, CameraFrame, TriangleMesh};
use amodal_render::{HeadlessEngine, Material, OffscreenRenderer, SoftwareRenderer};
use glam::{Mat4, Vec3};
use image::RgbaImage;

const SIZE: u32 = 64;

fn render_with<R: OffscreenRenderer>(renderer: &mut R, mesh: &TriangleMesh) -> RgbaImage {
    let frame = CameraFrame {
        camera_angle_x: 0.9,
        transform_matrix: Mat4::look_at_rh(
            Vec3::new(2.5, 2.0, 3.0),
            Vec3::splat(0.5),
            Vec3::Y,
        )
        .inverse(),
    };
    let camera = resolve_camera(&frame, SIZE, SIZE).unwrap();
    renderer
        .setup_camera(&camera.intrinsics, camera.world_to_camera)
        .unwrap();
    renderer.add_geometry("mesh", mesh, &Material::unlit()).unwrap();
    let img = renderer.render_to_image().unwrap();
    assert!(renderer.remove_geometry("mesh"));
    img
}

#[test]
fn test_gpu_matches_cpu() {
    let Ok(mut engine) = HeadlessEngine::new(SIZE, SIZE) else {
        eprintln!("Skipping parity test: no GPU adapter available");
        return;
    };
    let mut software = SoftwareRenderer::new(SIZE, SIZE).unwrap();

    let mut mesh = TriangleMesh::unit_cube();
    for &v in &[4usize, 5, 6] {
        mesh.colors_mut()[v] = Vec3::ZERO;
    }

    let gpu = render_with(&mut engine, &mesh);
    let cpu = render_with(&mut software, &mesh);

    let differing = gpu
        .pixels()
        .zip(cpu.pixels())
        .filter(|(a, b)| a.0.iter().zip(b.0.iter()).any(|(x, y)| x.abs_diff(*y) > 2))
        .count();
    // Edge pixels may differ by rasterization rules.
    assert!(
        differing * 50 < (SIZE * SIZE) as usize,
        "{differing} pixels differ"
    );
}
