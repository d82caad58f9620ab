//! Command-line options.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lux_core::{DebugView, Denoiser, Settings};

/// On/off switch for `--denoise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Toggle {
    #[value(alias = "true")]
    On,
    #[value(alias = "false")]
    Off,
}

fn parse_view(name: &str) -> Result<DebugView, String> {
    DebugView::from_name(name).ok_or_else(|| {
        format!("unknown view `{name}` (denoised, accumulated, sample, albedo, normal, depth, rough-metal)")
    })
}

/// Render a demo scene headlessly and write the result as a PNG.
#[derive(Parser, Debug)]
#[command(name = "lux_viewer", about = "Headless frame runner for the Lux path tracer", version)]
pub struct Args {
    /// Output width in pixels.
    #[arg(long, default_value = "640", value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    /// Output height in pixels.
    #[arg(long, default_value = "360", value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    /// Frames to accumulate.
    #[arg(long, default_value = "16")]
    pub frames: u32,

    /// Samples per pixel per frame, 1-8.
    #[arg(long)]
    pub spp: Option<u32>,

    /// Internal render scale, 0.05-1.0.
    #[arg(long)]
    pub scale: Option<f32>,

    /// Exposure in stops.
    #[arg(long, allow_negative_numbers = true)]
    pub exposure: Option<f32>,

    /// Edge-aware denoiser.
    #[arg(long, value_enum)]
    pub denoise: Option<Toggle>,

    /// Debug view to display.
    #[arg(long, value_parser = parse_view)]
    pub view: Option<DebugView>,

    /// Use the CPU reference pipeline.
    #[arg(long)]
    pub cpu: bool,

    /// Load settings from a JSON file; other flags override it.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Floor texture instead of the built-in checker.
    #[arg(long)]
    pub texture: Option<PathBuf>,

    /// Output path.
    #[arg(long, default_value = "lux.png")]
    pub out: PathBuf,
}

impl Args {
    /// Settings from the `--settings` file (or defaults) with the explicit
    /// flags applied on top. Rendering is always enabled.
    pub fn resolve_settings(&self) -> Result<Settings> {
        let mut settings = match &self.settings {
            Some(path) => {
                let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Settings::default(),
        };

        settings.enabled = true;
        if let Some(spp) = self.spp {
            settings.spp_per_frame = spp;
        }
        if let Some(scale) = self.scale {
            settings.render_scale = scale;
        }
        if let Some(ev) = self.exposure {
            settings.exposure_ev = ev;
        }
        if let Some(toggle) = self.denoise {
            settings.denoiser = match toggle {
                Toggle::On => Denoiser::EdgeAwareBlur,
                Toggle::Off => Denoiser::None,
            };
        }
        if let Some(view) = self.view {
            settings.view = view;
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("lux_viewer").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();

        assert_eq!((args.width, args.height, args.frames), (640, 360, 16));
        assert!(args.resolve_settings().unwrap().enabled);
        assert!(!args.cpu);
        assert_eq!(args.out, PathBuf::from("lux.png"));
    }

    #[test]
    fn test_flags() {
        let args = parse(&[
            "--width", "32", "--height", "24", "--spp", "4", "--scale", "0.5", "--exposure", "-1.5", "--denoise",
            "off", "--view", "normal", "--cpu", "--out", "x.png",
        ])
        .unwrap();
        let settings = args.resolve_settings().unwrap();

        assert_eq!((args.width, args.height), (32, 24));
        assert_eq!(settings.spp_per_frame, 4);
        assert_eq!(settings.render_scale, 0.5);
        assert_eq!(settings.exposure_ev, -1.5);
        assert_eq!(settings.denoiser, Denoiser::None);
        assert_eq!(settings.view, DebugView::Normal);
        assert!(args.cpu);
        assert_eq!(args.out, PathBuf::from("x.png"));
    }

    #[test]
    fn test_errors() {
        assert!(parse(&["--width"]).is_err());
        assert!(parse(&["--width", "abc"]).is_err());
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--view", "sideways"]).is_err());
        assert!(parse(&["--denoise", "maybe"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
        assert_eq!(parse(&["--help"]).unwrap_err().kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_settings_file_then_overrides() {
        let path = std::env::temp_dir().join(format!("lux_viewer_settings_{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "spp_per_frame": 3, "exposure_ev": 1.5, "paused": true }"#).unwrap();

        let args = parse(&["--settings", path.to_str().unwrap(), "--spp", "2"]).unwrap();
        let settings = args.resolve_settings();
        std::fs::remove_file(&path).unwrap();
        let settings = settings.unwrap();

        assert_eq!(settings.spp_per_frame, 2);
        assert_eq!(settings.exposure_ev, 1.5);
        assert!(settings.paused);
        assert!(settings.enabled);
    }

    #[test]
    fn test_missing_settings_file() {
        let args = parse(&["--settings", "/nonexistent/lux_settings.json"]).unwrap();
        assert!(args.resolve_settings().is_err());
    }
}
