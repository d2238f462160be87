//! Error types for the batch pipeline.

use std::path::PathBuf;

use amodal_core::MaskError;
use amodal_render::{RenderError, ScreenshotError};
use thiserror::Error;

/// Errors raised while processing a scene or a batch.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Reading or writing a file failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mesh file is not a readable triangle mesh.
    #[error("invalid PLY file {}: {message}", path.display())]
    Ply { path: PathBuf, message: String },

    /// The camera manifest could not be parsed.
    #[error("invalid camera manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: MaskError,
    },

    /// Masking the scene mesh failed.
    #[error("scene '{scene}': {source}")]
    Mesh {
        scene: String,
        #[source]
        source: MaskError,
    },

    /// A single frame of a scene failed.
    #[error("scene '{scene}', frame {frame}: {source}")]
    Frame {
        scene: String,
        frame: usize,
        #[source]
        source: FrameError,
    },

    /// Renderer setup failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Encoding or saving an image failed.
    #[error(transparent)]
    Image(#[from] ScreenshotError),

    /// Writing the scene summary failed.
    #[error("failed to serialize summary: {0}")]
    Summary(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// What went wrong while rendering one frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    Camera(#[from] MaskError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Image(#[from] ScreenshotError),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A specialized Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
