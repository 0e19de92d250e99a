//! Configuration system for the atmospheric scattering pipeline.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, and clamping of
//! out-of-range values before they reach the scattering core.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, LightShaftConfig, LightShaftQuality, LightingConfig, LutConfig,
    REFLECTION_PROBE_RESOLUTIONS, ReflectionProbeConfig, RenderMode, ScatteringConfig, SunConfig,
    default_config_dir, snap_probe_resolution,
};
pub use error::ConfigError;
