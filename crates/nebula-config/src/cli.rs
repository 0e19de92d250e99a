//! Command-line argument parsing for the scattering demo.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, LightShaftQuality, RenderMode};

/// Command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "nebula-demo", about = "Atmospheric scattering demo")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Raymarch sample count.
    #[arg(long)]
    pub sample_count: Option<u32>,

    /// Light shaft quality (high, medium).
    #[arg(long, value_parser = parse_quality)]
    pub quality: Option<LightShaftQuality>,

    /// Fog evaluation mode (reference, optimized).
    #[arg(long, value_parser = parse_render_mode)]
    pub render_mode: Option<RenderMode>,

    /// Enable or disable light shafts.
    #[arg(long)]
    pub light_shafts: Option<bool>,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 60)]
    pub frames: u32,

    /// Output image width.
    #[arg(long, default_value_t = 320)]
    pub width: u32,

    /// Output image height.
    #[arg(long, default_value_t = 180)]
    pub height: u32,

    /// Where to write the final frame as PNG.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

fn parse_quality(s: &str) -> Result<LightShaftQuality, String> {
    match s.to_ascii_lowercase().as_str() {
        "high" => Ok(LightShaftQuality::High),
        "medium" => Ok(LightShaftQuality::Medium),
        other => Err(format!("unknown light shaft quality '{other}'")),
    }
}

fn parse_render_mode(s: &str) -> Result<RenderMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "reference" => Ok(RenderMode::Reference),
        "optimized" => Ok(RenderMode::Optimized),
        other => Err(format!("unknown render mode '{other}'")),
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(count) = args.sample_count {
            self.scattering.sample_count = count;
        }
        if let Some(quality) = args.quality {
            self.light_shafts.quality = quality;
        }
        if let Some(mode) = args.render_mode {
            self.scattering.render_mode = mode;
        }
        if let Some(enabled) = args.light_shafts {
            self.light_shafts.enabled = enabled;
        }
    }
}
