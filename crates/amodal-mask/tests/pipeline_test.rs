//! End-to-end tests of the batch pipeline on a small on-disk dataset,
//! rendered with the CPU backend.

use std::path::Path;

use amodal_core::{MaskRatioRange, Options, RenderBackend, TriangleMesh};
use amodal_mask::{
    discover_scenes, load_ply, run, run_batch, save_ply, FrameError, PipelineError,
    SceneSummary,
};
use amodal_render::{OffscreenRenderer, SoftwareRenderer};
use glam::{Mat4, Vec3};
use image::Rgba;

const SIZE: u32 = 32;

fn frame_json(transform: Mat4) -> serde_json::Value {
    let rows: Vec<[f32; 4]> = (0..4).map(|i| transform.row(i).to_array()).collect();
    serde_json::json!({
        "camera_angle_x": 0.8,
        "transform_matrix": rows,
        "file_path": "./train/r_0",
    })
}

fn orbit_cameras() -> Vec<Mat4> {
    [
        Vec3::new(0.5, 0.5, 4.0),
        Vec3::new(3.5, 2.0, 2.5),
        Vec3::new(-2.5, -1.5, -2.0),
    ]
    .iter()
    .map(|&eye| Mat4::look_at_rh(eye, Vec3::splat(0.5), Vec3::Y).inverse())
    .collect()
}

fn write_scene(root: &Path, name: &str, cameras: &[Mat4]) {
    let dir = root.join("renders").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    save_ply(&TriangleMesh::unit_cube(), dir.join("mesh.ply")).unwrap();
    let frames: Vec<_> = cameras.iter().map(|&m| frame_json(m)).collect();
    let manifest = serde_json::json!({ "camera_angle_x": 0.8, "frames": frames });
    std::fs::write(dir.join("transforms.json"), manifest.to_string()).unwrap();
}

fn options_for(root: &Path) -> Options {
    Options {
        data_root: root.to_path_buf(),
        resolution: SIZE,
        backend: RenderBackend::Cpu,
        ..Options::default()
    }
}

fn read_summary(root: &Path, scene: &str) -> SceneSummary {
    let text = std::fs::read_to_string(root.join("renders_mask").join(scene).join("mask.json"))
        .unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_batch_writes_all_frames() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), "cube", &orbit_cameras());

    let report = run(&options_for(dir.path())).unwrap();
    assert!(report.is_success());
    assert_eq!(report.completed.len(), 1);

    let out = dir.path().join("renders_mask").join("cube");
    for name in ["000.png", "001.png", "002.png"] {
        let img = image::open(out.join(name)).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (SIZE, SIZE));
    }
    assert!(!out.join("003.png").exists());

    let summary = read_summary(dir.path(), "cube");
    assert_eq!(summary, report.completed[0]);
    assert_eq!(summary.face_count, 12);
    assert_eq!(summary.frames, 3);
    assert!(summary.complete);
    assert_eq!(summary.selected_faces, summary.target_faces);
    assert_eq!(summary.faces.len(), summary.selected_faces);
    assert!((0.2..=0.5).contains(&summary.mask_ratio));
}

#[test]
fn test_batch_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), "cube", &orbit_cameras());

    let first = options_for(dir.path());
    let second = Options {
        output_dir: "renders_mask_again".to_string(),
        ..first.clone()
    };
    run(&first).unwrap();
    run(&second).unwrap();

    for name in ["000.png", "001.png", "002.png", "mask.json"] {
        let a = std::fs::read(dir.path().join("renders_mask/cube").join(name)).unwrap();
        let b = std::fs::read(dir.path().join("renders_mask_again/cube").join(name)).unwrap();
        assert_eq!(a, b, "{name} differs between runs");
    }
}

#[test]
fn test_scene_mask_independent_of_batch_order() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), "a", &orbit_cameras());
    write_scene(dir.path(), "b", &orbit_cameras());

    run(&options_for(dir.path())).unwrap();
    let together = read_summary(dir.path(), "b");

    let alone = Options {
        scenes: vec!["b".to_string()],
        output_dir: "alone".to_string(),
        ..options_for(dir.path())
    };
    let report = run(&alone).unwrap();
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].faces, together.faces);
}

#[test]
fn test_mask_colors_in_render() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), "cube", &orbit_cameras()[..1]);

    let all = Options {
        mask_ratio: MaskRatioRange::fixed(1.0).unwrap(),
        ..options_for(dir.path())
    };
    run(&all).unwrap();
    let img = image::open(dir.path().join("renders_mask/cube/000.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(*img.get_pixel(16, 16), Rgba([0, 0, 0, 255]));
    assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));

    let none = Options {
        mask_ratio: MaskRatioRange::fixed(0.0).unwrap(),
        ..options_for(dir.path())
    };
    run(&none).unwrap();
    let img = image::open(dir.path().join("renders_mask/cube/000.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(*img.get_pixel(16, 16), Rgba([128, 128, 128, 255]));
}

#[test]
fn test_failing_scenes_do_not_stop_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut cameras = orbit_cameras();
    cameras[1] = Mat4::ZERO;
    write_scene(dir.path(), "a_singular", &cameras);
    write_scene(dir.path(), "b_good", &orbit_cameras());
    std::fs::create_dir_all(dir.path().join("renders/c_no_mesh")).unwrap();

    let options = options_for(dir.path());
    let scenes = discover_scenes(&options).unwrap();
    let mut renderer = SoftwareRenderer::new(SIZE, SIZE).unwrap();
    let report = run_batch(&mut renderer, &scenes, &options);

    assert_eq!(renderer.geometry_count(), 0);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].scene, "b_good");
    assert_eq!(report.failed.len(), 2);

    let singular = &report.failed[0];
    assert_eq!(singular.scene, "a_singular");
    assert!(matches!(
        &singular.error,
        PipelineError::Frame { frame: 1, source: FrameError::Camera(_), .. }
    ));
    let out = dir.path().join("renders_mask/a_singular");
    assert!(out.join("000.png").exists());
    assert!(!out.join("001.png").exists());

    assert!(matches!(report.failed[1].error, PipelineError::Io { .. }));
}

#[test]
fn test_fail_fast_stops_batch() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("renders/a_no_mesh")).unwrap();
    write_scene(dir.path(), "b_good", &orbit_cameras());

    let options = Options {
        fail_fast: true,
        ..options_for(dir.path())
    };
    let report = run(&options).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(report.completed.is_empty());
    assert!(!dir.path().join("renders_mask/b_good").exists());
}

#[test]
fn test_export_masked_mesh() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), "cube", &orbit_cameras());

    let options = Options {
        export_masked_mesh: true,
        write_summary: false,
        ..options_for(dir.path())
    };
    let report = run(&options).unwrap();
    let summary = &report.completed[0];

    let out = dir.path().join("renders_mask/cube");
    assert!(!out.join("mask.json").exists());
    let mesh = load_ply(out.join("mesh_masked.ply")).unwrap();
    let black = mesh.colors().iter().filter(|&&c| c == Vec3::ZERO).count();
    assert_eq!(black, summary.masked_vertices);
    assert_eq!(mesh.triangles(), TriangleMesh::unit_cube().triangles());
}

#[test]
fn test_cameras_follow_renderer_size() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path(), "cube", &orbit_cameras());

    let options = options_for(dir.path());
    let scenes = discover_scenes(&options).unwrap();
    let mut renderer = SoftwareRenderer::new(SIZE * 2, SIZE).unwrap();
    let report = run_batch(&mut renderer, &scenes, &options);

    // Cameras are resolved at the renderer size, which is not square here.
    assert!(report.is_success());
    let img = image::open(dir.path().join("renders_mask/cube/000.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(img.dimensions(), (SIZE * 2, SIZE));
}
