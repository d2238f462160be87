//! Rendering error types.

use thiserror::Error;

use crate::screenshot::ScreenshotError;

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// A geometry with the given name is already in the scene.
    #[error("geometry '{0}' already exists")]
    GeometryExists(String),

    /// The mesh has more indices than a single draw call can address.
    #[error("geometry '{0}' is too large to upload")]
    GeometryTooLarge(String),

    /// Render target dimensions are zero or exceed device limits.
    #[error("invalid render target size {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Camera intrinsics were computed for a different image size.
    #[error("camera is {camera_width}x{camera_height} but the target is {width}x{height}")]
    CameraSizeMismatch {
        camera_width: u32,
        camera_height: u32,
        width: u32,
        height: u32,
    },

    /// `render_to_image` was called before `setup_camera`.
    #[error("camera not set up")]
    CameraNotSet,

    /// Reading the render target back failed.
    #[error("GPU buffer mapping failed")]
    BufferMapFailed,

    /// Image conversion or encoding failed.
    #[error(transparent)]
    Screenshot(#[from] ScreenshotError),
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
