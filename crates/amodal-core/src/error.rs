//! Error types for amodal-core.

use thiserror::Error;

/// The main error type for mesh, selection and camera operations.
#[derive(Error, Debug)]
pub enum MaskError {
    /// A triangle references a vertex that does not exist.
    #[error("triangle {face} references vertex {vertex}, but the mesh has {vertex_count} vertices")]
    InvalidTriangle {
        face: usize,
        vertex: u32,
        vertex_count: usize,
    },

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The mask ratio interval is empty or outside [0, 1].
    #[error("invalid mask ratio interval [{min}, {max}]: expected 0 <= min <= max <= 1")]
    InvalidMaskRatio { min: f64, max: f64 },

    /// The horizontal field of view is not a positive finite angle.
    #[error("invalid field of view: {0} rad")]
    InvalidFieldOfView(f32),

    /// The output resolution is zero.
    #[error("invalid resolution: {0}")]
    InvalidResolution(u32),

    /// The clipping planes do not satisfy `0 < near < far`.
    #[error("invalid clip planes: near = {near}, far = {far}")]
    InvalidClipPlanes { near: f32, far: f32 },

    /// The camera-to-world transform cannot be inverted.
    #[error("singular camera-to-world transform (det = {determinant})")]
    SingularTransform { determinant: f32 },

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for amodal-core operations.
pub type Result<T> = std::result::Result<T, MaskError>;
