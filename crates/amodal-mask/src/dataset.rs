//! Scene discovery and camera manifests.

use std::path::{Path, PathBuf};

use amodal_core::{CameraManifest, ImageFormat, Options};

use crate::error::{PipelineError, Result};

/// Name of the per-scene summary file.
pub const SUMMARY_FILE: &str = "mask.json";
/// Name of the exported masked mesh.
pub const MASKED_MESH_FILE: &str = "mesh_masked.ply";

/// Input and output locations of one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub name: String,
    pub mesh_path: PathBuf,
    pub camera_path: PathBuf,
    pub output_dir: PathBuf,
}

impl Scene {
    pub fn new(name: &str, options: &Options) -> Self {
        let input = options.scene_root().join(name);
        Self {
            name: name.to_string(),
            mesh_path: input.join(&options.mesh_file),
            camera_path: input.join(&options.camera_file),
            output_dir: options.output_root().join(name),
        }
    }

    /// Path of the image for frame `index`, e.g. `007.png`.
    pub fn frame_path(&self, index: usize, format: ImageFormat) -> PathBuf {
        self.output_dir
            .join(format!("{index:03}.{}", format.extension()))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_FILE)
    }

    pub fn masked_mesh_path(&self) -> PathBuf {
        self.output_dir.join(MASKED_MESH_FILE)
    }
}

/// Lists the scenes to process, sorted by name.
///
/// Scenes are the sub-directories of the scene root. When `options.scenes`
/// is non-empty only those names are kept; requested names that do not exist
/// are reported and skipped.
pub fn discover_scenes(options: &Options) -> Result<Vec<Scene>> {
    let root = options.scene_root();
    let entries = std::fs::read_dir(&root).map_err(|e| PipelineError::io(&root, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(&root, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => log::warn!("skipping scene with non UTF-8 name {name:?}"),
        }
    }
    names.sort();

    if !options.scenes.is_empty() {
        for wanted in &options.scenes {
            if !names.contains(wanted) {
                log::warn!("scene '{wanted}' not found under {}", root.display());
            }
        }
        names.retain(|name| options.scenes.contains(name));
    }

    log::info!("found {} scenes under {}", names.len(), root.display());
    Ok(names.iter().map(|name| Scene::new(name, options)).collect())
}

/// Reads a camera manifest (`transforms.json`).
pub fn load_manifest(path: &Path) -> Result<CameraManifest> {
    let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    CameraManifest::from_json_str(&text).map_err(|source| PipelineError::Manifest {
        path: path.to_path_buf(),
        source,
    })
}
