use std::path::PathBuf;
use std::process::ExitCode;

use amodal_core::{ImageFormat, MaskRatioRange, Options, RenderBackend};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "amodal-mask",
    version,
    about = "Render random contiguous surface masks for every camera of a mesh dataset"
)]
struct Cli {
    /// JSON options file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dataset root directory.
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Scene directory name under the root.
    #[arg(long)]
    scene_dir: Option<String>,

    /// Output directory name under the root.
    #[arg(long)]
    output_dir: Option<String>,

    /// Only process these scenes (comma separated).
    #[arg(long, value_delimiter = ',')]
    scenes: Vec<String>,

    /// Random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Output image width and height.
    #[arg(long)]
    resolution: Option<u32>,

    /// Lower bound of the mask ratio.
    #[arg(long)]
    ratio_min: Option<f64>,

    /// Upper bound of the mask ratio.
    #[arg(long)]
    ratio_max: Option<f64>,

    /// Maximum region growth walks per scene.
    #[arg(long)]
    max_walks: Option<usize>,

    #[arg(long, value_enum)]
    backend: Option<Backend>,

    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Do not write `mask.json` summaries.
    #[arg(long)]
    no_summary: bool,

    /// Also write the recolored mesh of each scene.
    #[arg(long)]
    export_mesh: bool,

    /// Stop at the first failing scene.
    #[arg(long)]
    fail_fast: bool,

    /// Print the effective options as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Gpu,
    Cpu,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Png,
    Jpeg,
}

impl Cli {
    fn into_options(self) -> Result<Options> {
        let mut options = match &self.config {
            Some(path) => Options::from_json_file(path)
                .with_context(|| format!("failed to read options from {}", path.display()))?,
            None => Options::default(),
        };

        if let Some(root) = self.data_root {
            options.data_root = root;
        }
        if let Some(dir) = self.scene_dir {
            options.scene_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            options.output_dir = dir;
        }
        if !self.scenes.is_empty() {
            options.scenes = self.scenes;
        }
        if let Some(seed) = self.seed {
            options.seed = seed;
        }
        if let Some(resolution) = self.resolution {
            options.resolution = resolution;
        }
        if self.ratio_min.is_some() || self.ratio_max.is_some() {
            options.mask_ratio = MaskRatioRange {
                min: self.ratio_min.unwrap_or(options.mask_ratio.min),
                max: self.ratio_max.unwrap_or(options.mask_ratio.max),
            };
        }
        if let Some(max_walks) = self.max_walks {
            options.max_walks = Some(max_walks);
        }
        if let Some(backend) = self.backend {
            options.backend = match backend {
                Backend::Gpu => RenderBackend::Gpu,
                Backend::Cpu => RenderBackend::Cpu,
            };
        }
        if let Some(format) = self.format {
            options.image_format = match format {
                Format::Png => ImageFormat::Png,
                Format::Jpeg => ImageFormat::Jpeg,
            };
        }
        if self.no_summary {
            options.write_summary = false;
        }
        if self.export_mesh {
            options.export_masked_mesh = true;
        }
        if self.fail_fast {
            options.fail_fast = true;
        }

        options.validate().context("invalid options")?;
        Ok(options)
    }
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let print_config = cli.print_config;
    let options = cli.into_options()?;

    if print_config {
        println!("{}", options.to_json_string()?);
        return Ok(ExitCode::SUCCESS);
    }

    let report = amodal_mask::run(&options)?;
    for failure in &report.failed {
        eprintln!("{}: {}", failure.scene, failure.error);
    }
    println!(
        "{} scenes rendered, {} failed",
        report.completed.len(),
        report.failed.len()
    );

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("amodal-mask").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_flags() {
        let options = parse(&[]).into_options().unwrap();
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("options.json");
        std::fs::write(
            &config,
            r#"{ "seed": 7, "resolution": 64, "mask_ratio": { "min": 0.1, "max": 0.3 } }"#,
        )
        .unwrap();
        let config = config.to_string_lossy().into_owned();

        let options = parse(&[
            "--config",
            &config,
            "--ratio-min",
            "0.25",
            "--max-walks",
            "5",
            "--backend",
            "cpu",
            "--scenes",
            "chair,lamp",
            "--no-summary",
        ])
        .into_options()
        .unwrap();

        assert_eq!(options.seed, 7);
        assert_eq!(options.resolution, 64);
        assert_eq!(options.mask_ratio, MaskRatioRange { min: 0.25, max: 0.3 });
        assert_eq!(options.max_walks, Some(5));
        assert_eq!(options.backend, RenderBackend::Cpu);
        assert_eq!(options.scenes, vec!["chair", "lamp"]);
        assert!(!options.write_summary);
        assert_eq!(options.image_format, ImageFormat::Png);
    }

    #[test]
    fn test_invalid_overlay_rejected() {
        let cli = parse(&["--ratio-min", "0.9", "--ratio-max", "0.4"]);
        assert!(cli.into_options().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let cli = parse(&["--config", "/nonexistent/options.json"]);
        assert!(cli.into_options().is_err());
    }
}
