//! Amodal mask generation for multi-view mesh datasets.
//!
//! For every scene of a dataset a random contiguous region of the mesh
//! surface is painted black, everything else a uniform gray, and the mesh is
//! rendered from each camera of the scene's `transforms.json`. The images
//! mark which pixels a completion model has to fill in.
//!
//! # Example
//!
//! ```no_run
//! use amodal_core::Options;
//!
//! let options = Options::from_json_file("mask.json").unwrap();
//! let report = amodal_mask::run(&options).unwrap();
//! println!("{} scenes done", report.completed.len());
//! ```

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod dataset;
pub mod error;
pub mod io;
pub mod pipeline;

pub use dataset::{discover_scenes, load_manifest, Scene};
pub use error::{FrameError, PipelineError, Result};
pub use io::{load_ply, save_ply};
pub use pipeline::{
    make_renderer, mask_mesh, process_scene, render_scene, run, run_batch, scene_rng,
    scene_seed, BatchReport, MaskedMesh, SceneFailure, SceneSummary, GEOMETRY_NAME,
};
