//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Reflection probe resolutions the pipeline can allocate.
pub const REFLECTION_PROBE_RESOLUTIONS: [u32; 4] = [32, 64, 128, 256];

/// Top-level configuration for the atmospheric scattering pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Physical scattering coefficients and integration settings.
    pub scattering: ScatteringConfig,
    /// Sun disc rendering in the skybox.
    pub sun: SunConfig,
    /// Feedback of LUT colors into the scene's sun and ambient light.
    pub lighting: LightingConfig,
    /// Screen-space light shafts.
    pub light_shafts: LightShaftConfig,
    /// Skybox reflection probe.
    pub reflection_probe: ReflectionProbeConfig,
    /// Lookup table dimensions.
    pub lut: LutConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// How the fog pass obtains inscattering for a pixel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RenderMode {
    /// Integrate every pixel's view ray directly. Slow, used as ground truth.
    Reference,
    /// Sample the per-frame frustum volume.
    #[default]
    Optimized,
}

/// Light shaft buffer chain topology.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum LightShaftQuality {
    /// Full-resolution raymarch and blur.
    #[default]
    High,
    /// Half-resolution raymarch and blur, bilinear upscale.
    Medium,
}

/// Scattering configuration. Fields marked (*) require a LUT recompute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScatteringConfig {
    /// Reference or optimized fog evaluation.
    pub render_mode: RenderMode,
    /// Raymarch sample count, `[1, 64]`.
    pub sample_count: u32,
    /// Longest view ray integrated by the fog pass, in meters.
    pub max_ray_length: f32,
    /// (*) HDR color of the light entering the atmosphere.
    pub incoming_light: [f32; 3],
    /// (*) Rayleigh scattering multiplier, `[0, 10]`.
    pub rayleigh_scatter_coef: f32,
    /// (*) Rayleigh extinction multiplier, `[0, 10]`.
    pub rayleigh_extinction_coef: f32,
    /// (*) Mie scattering multiplier, `[0, 10]`.
    pub mie_scatter_coef: f32,
    /// (*) Mie extinction multiplier, `[0, 10]`.
    pub mie_extinction_coef: f32,
    /// Mie asymmetry factor, `[0, 0.999]`.
    pub mie_g: f32,
    /// Scene units to meters.
    pub distance_scale: f32,
    /// Apply height fog over opaque geometry.
    pub render_atmospheric_fog: bool,
}

/// Sun disc configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SunConfig {
    /// Draw the sun disc into the skybox.
    pub render_sun: bool,
    /// Sun disc intensity, `[0, 10]`.
    pub sun_intensity: f32,
}

/// Lighting feedback configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LightingConfig {
    /// Overwrite the sun light's color and intensity every frame.
    pub update_light_color: bool,
    /// Sun intensity multiplier, `[0.5, 3]`.
    pub light_color_intensity: f32,
    /// Overwrite the scene's ambient color and intensity every frame.
    pub update_ambient_color: bool,
    /// Ambient intensity multiplier, `[0.5, 3]`.
    pub ambient_color_intensity: f32,
}

/// Light shaft configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LightShaftConfig {
    /// Render light shafts.
    pub enabled: bool,
    /// Buffer chain topology.
    pub quality: LightShaftQuality,
}

/// Reflection probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReflectionProbeConfig {
    /// Keep a skybox reflection probe up to date.
    pub enabled: bool,
    /// Face resolution, one of [`REFLECTION_PROBE_RESOLUTIONS`].
    pub resolution: u32,
}

/// Lookup table dimensions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LutConfig {
    /// Particle density table width and height.
    pub particle_density_size: u32,
    /// Number of entries in each light color table.
    pub light_color_size: u32,
    /// Skybox volume: view zenith, sun zenith, height.
    pub skybox_size: [u32; 3],
    /// Frustum volume: frustum U, frustum V, distance slices.
    pub frustum_size: [u32; 3],
    /// Integration steps per optical depth sample.
    pub density_integration_steps: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for ScatteringConfig {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::Optimized,
            sample_count: 16,
            max_ray_length: 400_000.0,
            incoming_light: [4.0, 4.0, 4.0],
            rayleigh_scatter_coef: 1.0,
            rayleigh_extinction_coef: 1.0,
            mie_scatter_coef: 1.0,
            mie_extinction_coef: 1.0,
            mie_g: 0.76,
            distance_scale: 1.0,
            render_atmospheric_fog: true,
        }
    }
}

impl Default for SunConfig {
    fn default() -> Self {
        Self {
            render_sun: true,
            sun_intensity: 1.0,
        }
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            update_light_color: true,
            light_color_intensity: 1.0,
            update_ambient_color: true,
            ambient_color_intensity: 1.0,
        }
    }
}

impl Default for LightShaftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: LightShaftQuality::High,
        }
    }
}

impl Default for ReflectionProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            resolution: 128,
        }
    }
}

impl Default for LutConfig {
    fn default() -> Self {
        Self {
            particle_density_size: 1024,
            light_color_size: 128,
            skybox_size: [64, 32, 16],
            frustum_size: [32, 32, 64],
            density_integration_steps: 64,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Clamping ---

/// Snap a requested probe resolution to the closest supported one.
pub fn snap_probe_resolution(requested: u32) -> u32 {
    REFLECTION_PROBE_RESOLUTIONS
        .iter()
        .copied()
        .min_by_key(|r| r.abs_diff(requested))
        .unwrap_or(128)
}

fn clamp_unit(value: f32, min: f32, max: f32) -> f32 {
    // NaN collapses to the lower bound.
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

impl Config {
    /// Return a copy with every numeric field clamped into its valid range.
    pub fn sanitized(&self) -> Self {
        let mut c = self.clone();

        let s = &mut c.scattering;
        s.sample_count = s.sample_count.clamp(1, 64);
        s.max_ray_length = clamp_unit(s.max_ray_length, 1.0, f32::MAX);
        s.incoming_light = s.incoming_light.map(|v| clamp_unit(v, 0.0, 10.0));
        s.rayleigh_scatter_coef = clamp_unit(s.rayleigh_scatter_coef, 0.0, 10.0);
        s.rayleigh_extinction_coef = clamp_unit(s.rayleigh_extinction_coef, 0.0, 10.0);
        s.mie_scatter_coef = clamp_unit(s.mie_scatter_coef, 0.0, 10.0);
        s.mie_extinction_coef = clamp_unit(s.mie_extinction_coef, 0.0, 10.0);
        s.mie_g = clamp_unit(s.mie_g, 0.0, 0.999);
        s.distance_scale = clamp_unit(s.distance_scale, 1e-6, f32::MAX);

        c.sun.sun_intensity = clamp_unit(c.sun.sun_intensity, 0.0, 10.0);
        c.lighting.light_color_intensity = clamp_unit(c.lighting.light_color_intensity, 0.5, 3.0);
        c.lighting.ambient_color_intensity =
            clamp_unit(c.lighting.ambient_color_intensity, 0.5, 3.0);
        c.reflection_probe.resolution = snap_probe_resolution(c.reflection_probe.resolution);

        let lut = &mut c.lut;
        lut.particle_density_size = lut.particle_density_size.max(2);
        lut.light_color_size = lut.light_color_size.max(2);
        lut.skybox_size = lut.skybox_size.map(|v| v.max(2));
        lut.frustum_size = lut.frustum_size.map(|v| v.max(2));
        lut.density_integration_steps = lut.density_integration_steps.max(1);

        c
    }
}

// --- Load / Save / Reload ---

/// Default per-user directory holding `config.ron`.
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("nebula-atmosphere"))
        .ok_or(ConfigError::NoConfigDir)
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        if config_dir.exists() && !config_dir.is_dir() {
            return Err(ConfigError::NotADirectory(config_dir.to_path_buf()));
        }
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("sample_count: 16"));
        assert!(ron_str.contains("resolution: 128"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(scattering: (mie_g: 0.5), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.light_shafts, LightShaftConfig::default());
        assert!((config.scattering.mie_g - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.scattering.sample_count, 16);
    }

    #[test]
    fn test_enum_fields_parse() {
        let ron_str = "(scattering: (render_mode: Reference), light_shafts: (quality: Medium))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.scattering.render_mode, RenderMode::Reference);
        assert_eq!(config.light_shafts.quality, LightShaftQuality::Medium);
    }

    #[test]
    fn test_sanitized_clamps_out_of_range_values() {
        let mut config = Config::default();
        config.scattering.sample_count = 500;
        config.scattering.mie_g = 1.5;
        config.scattering.rayleigh_scatter_coef = -3.0;
        config.scattering.mie_scatter_coef = f32::NAN;
        config.lighting.light_color_intensity = 10.0;
        config.lighting.ambient_color_intensity = 0.0;
        config.reflection_probe.resolution = 100;
        config.lut.light_color_size = 0;

        let clamped = config.sanitized();
        assert_eq!(clamped.scattering.sample_count, 64);
        assert!((clamped.scattering.mie_g - 0.999).abs() < 1e-6);
        assert_eq!(clamped.scattering.rayleigh_scatter_coef, 0.0);
        assert_eq!(clamped.scattering.mie_scatter_coef, 0.0);
        assert_eq!(clamped.lighting.light_color_intensity, 3.0);
        assert_eq!(clamped.lighting.ambient_color_intensity, 0.5);
        assert_eq!(clamped.reflection_probe.resolution, 128);
        assert_eq!(clamped.lut.light_color_size, 2);
    }

    #[test]
    fn test_sanitized_keeps_valid_config() {
        let config = Config::default();
        assert_eq!(config.sanitized(), config);
    }

    #[test]
    fn test_snap_probe_resolution() {
        assert_eq!(snap_probe_resolution(0), 32);
        assert_eq!(snap_probe_resolution(64), 64);
        assert_eq!(snap_probe_resolution(200), 256);
        assert_eq!(snap_probe_resolution(4096), 256);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.scattering.sample_count = 32;
        config.light_shafts.quality = LightShaftQuality::Medium;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.scattering.mie_g = 0.5;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert!((result.unwrap().scattering.mie_g - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_rejects_file_as_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        let result = Config::load_or_create(&file);
        assert!(matches!(result, Err(ConfigError::NotADirectory(_))));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
