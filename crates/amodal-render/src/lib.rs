//! Offscreen rendering backends for amodal-mask.
//!
//! This crate provides:
//! - The [`OffscreenRenderer`] contract and the [`GeometryScope`] guard
//! - [`HeadlessEngine`], a wgpu renderer that needs no window
//! - [`SoftwareRenderer`], a deterministic CPU rasterizer
//! - Image saving helpers

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
// Casts between pixel counts and float coordinates are bounded by texture limits
#![allow(clippy::cast_possible_truncation)]

pub mod engine;
pub mod error;
pub mod raster;
pub mod renderer;
pub mod screenshot;

pub use engine::HeadlessEngine;
pub use error::{RenderError, RenderResult};
pub use raster::SoftwareRenderer;
pub use renderer::{CameraSetup, GeometryScope, Material, OffscreenRenderer, DEFAULT_FAR, DEFAULT_NEAR};
pub use screenshot::{image_from_rgba, save_image, save_to_buffer, ScreenshotError};
