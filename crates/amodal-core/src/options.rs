//! Configuration options for a mask rendering run.

use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{MaskColors, MaskError, MaskRatioRange, Result};

/// Options for a batch run. Fixed at process start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Dataset root directory.
    pub data_root: PathBuf,

    /// Directory under the root holding one sub-directory per scene.
    pub scene_dir: String,

    /// Directory under the root receiving the rendered masks.
    pub output_dir: String,

    /// Mesh file name inside each scene directory.
    pub mesh_file: String,

    /// Camera manifest file name inside each scene directory.
    pub camera_file: String,

    /// Scenes to process. Empty means every scene found.
    pub scenes: Vec<String>,

    /// Interval the per-scene mask ratio is drawn from.
    pub mask_ratio: MaskRatioRange,

    /// Width and height of the rendered images.
    pub resolution: u32,

    /// Seed of the random generators.
    pub seed: u64,

    /// Upper bound on region growth walks per scene. Unbounded when unset.
    pub max_walks: Option<usize>,

    /// Unmasked and masked vertex colors.
    pub colors: MaskColors,

    /// Background color.
    pub background_color: Vec3,

    /// Near clipping plane distance.
    pub near_plane: f32,

    /// Far clipping plane distance.
    pub far_plane: f32,

    /// Output image format.
    pub image_format: ImageFormat,

    /// Rendering backend.
    pub backend: RenderBackend,

    /// Whether to write a `mask.json` summary per scene.
    pub write_summary: bool,

    /// Whether to write the recolored mesh as `mesh_masked.ply` per scene.
    pub export_masked_mesh: bool,

    /// Whether to stop the batch at the first failing scene.
    pub fail_fast: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./test"),
            scene_dir: "renders".to_string(),
            output_dir: "renders_mask".to_string(),
            mesh_file: "mesh.ply".to_string(),
            camera_file: "transforms.json".to_string(),
            scenes: Vec::new(),
            mask_ratio: MaskRatioRange::default(),
            resolution: 512,
            seed: 42,
            max_walks: None,
            colors: MaskColors::default(),
            background_color: Vec3::ONE,
            near_plane: 0.01,
            far_plane: 100.0,
            image_format: ImageFormat::Png,
            backend: RenderBackend::Gpu,
            write_summary: true,
            export_masked_mesh: false,
            fail_fast: false,
        }
    }
}

impl Options {
    /// Loads options from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&text)?;
        Ok(options)
    }

    /// Serializes the options as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        self.mask_ratio.validate()?;
        if self.resolution == 0 {
            return Err(MaskError::InvalidResolution(self.resolution));
        }
        if !(self.near_plane > 0.0 && self.far_plane > self.near_plane) {
            return Err(MaskError::InvalidClipPlanes {
                near: self.near_plane,
                far: self.far_plane,
            });
        }
        Ok(())
    }

    /// Directory containing the scene directories.
    pub fn scene_root(&self) -> PathBuf {
        self.data_root.join(&self.scene_dir)
    }

    /// Directory receiving the per-scene outputs.
    pub fn output_root(&self) -> PathBuf {
        self.data_root.join(&self.output_dir)
    }
}

/// Encoded image format of the rendered masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless PNG (default).
    #[default]
    Png,
    /// JPEG. Compression blurs the mask boundary.
    Jpeg,
}

impl ImageFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// Renderer implementation used for the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackend {
    /// Headless GPU renderer, falling back to the CPU one without an adapter.
    #[default]
    Gpu,
    /// CPU rasterizer.
    Cpu,
}
