//! Core algorithms for amodal-mask.
//!
//! This crate provides the scene-independent pieces of the mask rendering
//! pipeline:
//! - [`TriangleMesh`], an indexed mesh with per-vertex colors
//! - [`FaceAdjacency`], the edge-sharing face graph
//! - [`RegionSelector`], randomized contiguous region growth
//! - [`apply_mask`], binary masked/unmasked recoloring
//! - Camera resolution from field of view and camera-to-world poses
//! - Batch configuration [`Options`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Options structs legitimately have many boolean flags
#![allow(clippy::struct_excessive_bools)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod adjacency;
pub mod camera;
pub mod error;
pub mod mask;
pub mod mesh;
pub mod options;
pub mod region;

pub use adjacency::{FaceAdjacency, Neighbors};
pub use camera::{
    basis_correct, resolve_camera, world_to_camera, CameraFrame, CameraManifest,
    PinholeIntrinsics, ResolvedCamera, BASIS_CORRECTION,
};
pub use error::{MaskError, Result};
pub use mask::{apply_mask, MaskColors};
pub use mesh::{TriangleMesh, DEFAULT_VERTEX_COLOR};
pub use options::{ImageFormat, Options, RenderBackend};
pub use region::{mask_face_count, FaceSet, MaskRatioRange, MaskRegion, RegionSelector};

// Re-export glam types for convenience
pub use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
