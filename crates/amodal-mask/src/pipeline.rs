//! Scene processing and the batch driver.
//!
//! A scene goes through: mesh load, face adjacency, random region growth,
//! recoloring, and one render per camera of its manifest. Scenes are
//! independent; a failing scene is recorded and the batch moves on.

use amodal_core::{
    apply_mask, mask_face_count, resolve_camera, CameraManifest, FaceAdjacency, MaskRegion,
    Options, RegionSelector, RenderBackend, TriangleMesh,
};
use amodal_render::{
    save_image, GeometryScope, HeadlessEngine, Material, OffscreenRenderer, RenderError,
    SoftwareRenderer,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::dataset::{load_manifest, Scene};
use crate::error::{FrameError, PipelineError, Result};
use crate::io;

/// Name under which the scene mesh is added to the renderer.
pub const GEOMETRY_NAME: &str = "mesh";

/// Per-scene seed derived from the batch seed and the scene name.
///
/// Every scene gets its own generator, so the mask of a scene does not
/// depend on which other scenes are processed or in what order.
pub fn scene_seed(seed: u64, scene: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    scene.bytes().fold(FNV_OFFSET ^ seed, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

pub fn scene_rng(seed: u64, scene: &str) -> StdRng {
    StdRng::seed_from_u64(scene_seed(seed, scene))
}

/// What was masked and rendered for one scene. Written as `mask.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub scene: String,
    pub seed: u64,
    pub mask_ratio: f64,
    pub face_count: usize,
    pub target_faces: usize,
    pub selected_faces: usize,
    pub masked_vertices: usize,
    pub walks: usize,
    pub complete: bool,
    pub frames: usize,
    /// Selected face indices, ascending.
    pub faces: Vec<u32>,
}

/// Mesh recolored with a random contiguous region.
#[derive(Debug, Clone)]
pub struct MaskedMesh {
    pub mesh: TriangleMesh,
    pub region: MaskRegion,
    pub ratio: f64,
    pub masked_vertices: usize,
}

/// Selects a random region of `mesh` and recolors it in place.
pub fn mask_mesh(
    scene: &str,
    mut mesh: TriangleMesh,
    options: &Options,
    rng: &mut StdRng,
) -> Result<MaskedMesh> {
    let adjacency = FaceAdjacency::build(mesh.triangles());
    let ratio = options.mask_ratio.sample(rng);
    let target = mask_face_count(mesh.face_count(), ratio);

    let mut selector = RegionSelector::new(&adjacency);
    if let Some(limit) = options.max_walks {
        selector = selector.with_max_walks(limit);
    }
    let region = selector.grow(rng, target);
    if !region.is_complete() {
        log::warn!(
            "scene '{scene}': partial mask with {}/{} faces",
            region.faces.len(),
            region.target
        );
    }

    let masked_vertices =
        apply_mask(&mut mesh, &region.faces, options.colors).map_err(|source| {
            PipelineError::Mesh {
                scene: scene.to_string(),
                source,
            }
        })?;

    Ok(MaskedMesh {
        mesh,
        region,
        ratio,
        masked_vertices,
    })
}

/// Renders `mesh` from every camera of `manifest` into the scene's output
/// directory. Returns the number of images written.
///
/// The mesh is added once and removed when rendering ends, whether or not a
/// frame failed.
pub fn render_scene<R: OffscreenRenderer + ?Sized>(
    renderer: &mut R,
    scene: &Scene,
    mesh: &TriangleMesh,
    manifest: &CameraManifest,
    options: &Options,
) -> Result<usize> {
    let (width, height) = renderer.resolution();
    let mut scope = GeometryScope::add(renderer, GEOMETRY_NAME, mesh, &Material::unlit())?;

    for (index, frame) in manifest.frames.iter().enumerate() {
        let frame_error = |source: FrameError| PipelineError::Frame {
            scene: scene.name.clone(),
            frame: index,
            source,
        };

        let camera = resolve_camera(frame, width, height).map_err(|e| frame_error(e.into()))?;
        scope
            .setup_camera(&camera.intrinsics, camera.world_to_camera)
            .map_err(|e| frame_error(e.into()))?;
        let image = scope.render_to_image().map_err(|e| frame_error(e.into()))?;

        let path = scene.frame_path(index, options.image_format);
        save_image(&path, &image).map_err(|e| frame_error(e.into()))?;
        log::debug!("wrote {}", path.display());
    }

    Ok(manifest.frames.len())
}

/// Runs the whole pipeline for one scene.
pub fn process_scene<R: OffscreenRenderer + ?Sized>(
    renderer: &mut R,
    scene: &Scene,
    options: &Options,
) -> Result<SceneSummary> {
    let mesh = io::load_ply(&scene.mesh_path)?;
    let manifest = load_manifest(&scene.camera_path)?;
    if manifest.frames.is_empty() {
        log::warn!("scene '{}' has no camera frames", scene.name);
    }

    let seed = scene_seed(options.seed, &scene.name);
    let mut rng = StdRng::seed_from_u64(seed);
    let face_count = mesh.face_count();
    let masked = mask_mesh(&scene.name, mesh, options, &mut rng)?;

    std::fs::create_dir_all(&scene.output_dir)
        .map_err(|e| PipelineError::io(&scene.output_dir, e))?;
    let frames = render_scene(renderer, scene, &masked.mesh, &manifest, options)?;

    let summary = SceneSummary {
        scene: scene.name.clone(),
        seed,
        mask_ratio: masked.ratio,
        face_count,
        target_faces: masked.region.target,
        selected_faces: masked.region.faces.len(),
        masked_vertices: masked.masked_vertices,
        walks: masked.region.walks(),
        complete: masked.region.is_complete(),
        frames,
        faces: masked.region.faces.sorted(),
    };

    if options.write_summary {
        let path = scene.summary_path();
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&path, json).map_err(|e| PipelineError::io(&path, e))?;
    }
    if options.export_masked_mesh {
        io::save_ply(&masked.mesh, scene.masked_mesh_path())?;
    }

    log::info!(
        "scene '{}': masked {}/{} faces (ratio {:.3}), {} frames",
        scene.name,
        summary.selected_faces,
        face_count,
        summary.mask_ratio,
        frames
    );
    Ok(summary)
}

/// A scene that could not be processed.
#[derive(Debug)]
pub struct SceneFailure {
    pub scene: String,
    pub error: PipelineError,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<SceneSummary>,
    pub failed: Vec<SceneFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Processes `scenes` in order with a shared renderer.
pub fn run_batch<R: OffscreenRenderer + ?Sized>(
    renderer: &mut R,
    scenes: &[Scene],
    options: &Options,
) -> BatchReport {
    renderer.set_background(options.background_color);
    renderer.set_clip_planes(options.near_plane, options.far_plane);

    let mut report = BatchReport::default();
    for (i, scene) in scenes.iter().enumerate() {
        log::info!("[{}/{}] processing scene '{}'", i + 1, scenes.len(), scene.name);
        match process_scene(renderer, scene, options) {
            Ok(summary) => report.completed.push(summary),
            Err(error) => {
                log::error!("scene '{}' failed: {error}", scene.name);
                report.failed.push(SceneFailure {
                    scene: scene.name.clone(),
                    error,
                });
                if options.fail_fast {
                    log::warn!("fail-fast set, stopping after scene '{}'", scene.name);
                    break;
                }
            }
        }
    }

    log::info!(
        "batch finished: {} succeeded, {} failed",
        report.completed.len(),
        report.failed.len()
    );
    report
}

/// Creates the renderer selected by `options.backend`.
///
/// The GPU backend falls back to the CPU rasterizer when no adapter or
/// device is available.
pub fn make_renderer(options: &Options) -> Result<Box<dyn OffscreenRenderer>> {
    let size = options.resolution;
    match options.backend {
        RenderBackend::Cpu => Ok(Box::new(SoftwareRenderer::new(size, size)?)),
        RenderBackend::Gpu => match HeadlessEngine::new(size, size) {
            Ok(engine) => Ok(Box::new(engine)),
            Err(err @ (RenderError::AdapterCreationFailed | RenderError::DeviceCreationFailed(_))) => {
                log::warn!("GPU renderer unavailable ({err}), using the CPU rasterizer");
                Ok(Box::new(SoftwareRenderer::new(size, size)?))
            }
            Err(err) => Err(err.into()),
        },
    }
}

/// Validates `options`, discovers the scenes and runs the batch.
pub fn run(options: &Options) -> Result<BatchReport> {
    options
        .validate()
        .map_err(|e| PipelineError::Config(e.to_string()))?;
    let scenes = crate::dataset::discover_scenes(options)?;
    let mut renderer = make_renderer(options)?;
    Ok(run_batch(renderer.as_mut(), &scenes, options))
}
