//! Physical atmosphere parameters and their GPU uniform layout.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use nebula_config::ScatteringConfig;

/// Sea-level Rayleigh scattering for air, per meter.
pub const RAYLEIGH_SCATTERING_SEA_LEVEL: Vec3 = Vec3::new(5.8e-6, 13.5e-6, 33.1e-6);

/// Sea-level Mie scattering for aerosols, per meter.
pub const MIE_SCATTERING_SEA_LEVEL: Vec3 = Vec3::new(2.0e-5, 2.0e-5, 2.0e-5);

/// Physical parameters of the atmosphere shell.
///
/// Immutable during a frame. A new value is produced from the configuration
/// whenever the caller reports a parameter change.
#[derive(Clone, Debug, PartialEq)]
pub struct AtmosphereParameters {
    /// Planet surface radius in meters.
    pub planet_radius: f32,
    /// Thickness of the atmosphere shell in meters.
    pub atmosphere_height: f32,
    /// Rayleigh density scale height in meters.
    pub rayleigh_scale_height: f32,
    /// Mie density scale height in meters.
    pub mie_scale_height: f32,
    /// Rayleigh scattering coefficients (RGB, per meter).
    pub rayleigh_scattering: Vec3,
    /// Rayleigh extinction coefficients (RGB, per meter).
    pub rayleigh_extinction: Vec3,
    /// Mie scattering coefficients (RGB, per meter).
    pub mie_scattering: Vec3,
    /// Mie extinction coefficients (RGB, per meter).
    pub mie_extinction: Vec3,
    /// Henyey-Greenstein asymmetry factor, `[0, 1)`.
    pub mie_g: f32,
    /// HDR color of the light entering the top of the atmosphere.
    pub incoming_light: Vec3,
    /// Raymarch sample count, `[1, 64]`.
    pub sample_count: u32,
    /// Longest view ray integrated by the fog pass, in meters.
    pub max_ray_length: f32,
    /// Scene units to meters.
    pub distance_scale: f32,
}

impl Default for AtmosphereParameters {
    fn default() -> Self {
        Self::from_config(&ScatteringConfig::default())
    }
}

impl AtmosphereParameters {
    /// Earth atmosphere scaled by the user multipliers in `config`.
    ///
    /// Out-of-range values are clamped rather than rejected.
    pub fn from_config(config: &ScatteringConfig) -> Self {
        let coef = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 10.0) };
        let incoming = config
            .incoming_light
            .map(|c| if c.is_nan() { 0.0 } else { c.max(0.0) });

        Self {
            planet_radius: 6_371_000.0,
            atmosphere_height: 80_000.0,
            rayleigh_scale_height: 7994.0,
            mie_scale_height: 1200.0,
            rayleigh_scattering: RAYLEIGH_SCATTERING_SEA_LEVEL * coef(config.rayleigh_scatter_coef),
            rayleigh_extinction: RAYLEIGH_SCATTERING_SEA_LEVEL
                * coef(config.rayleigh_extinction_coef),
            mie_scattering: MIE_SCATTERING_SEA_LEVEL * coef(config.mie_scatter_coef),
            mie_extinction: MIE_SCATTERING_SEA_LEVEL * coef(config.mie_extinction_coef),
            mie_g: if config.mie_g.is_nan() { 0.0 } else { config.mie_g.clamp(0.0, 0.999) },
            incoming_light: Vec3::from(incoming),
            sample_count: config.sample_count.clamp(1, 64),
            max_ray_length: config.max_ray_length.max(1.0),
            distance_scale: config.distance_scale.max(1e-6),
        }
    }

    /// Radius of the top of the atmosphere.
    pub fn top_radius(&self) -> f32 {
        self.planet_radius + self.atmosphere_height
    }

    /// Clamp a height into `[0, atmosphere_height]`.
    pub fn clamp_height(&self, height: f32) -> f32 {
        if height.is_nan() {
            0.0
        } else {
            height.clamp(0.0, self.atmosphere_height)
        }
    }

    /// Whether switching from `self` to `other` invalidates the slow LUTs.
    ///
    /// Sample count, ray length and distance scale only affect per-frame work.
    pub fn requires_lut_rebuild(&self, other: &Self) -> bool {
        self.planet_radius != other.planet_radius
            || self.atmosphere_height != other.atmosphere_height
            || self.rayleigh_scale_height != other.rayleigh_scale_height
            || self.mie_scale_height != other.mie_scale_height
            || self.rayleigh_scattering != other.rayleigh_scattering
            || self.rayleigh_extinction != other.rayleigh_extinction
            || self.mie_scattering != other.mie_scattering
            || self.mie_extinction != other.mie_extinction
            || self.mie_g != other.mie_g
            || self.incoming_light != other.incoming_light
    }
}

/// GPU-side scattering parameters refreshed once per frame.
///
/// Every field is a `vec4<f32>` so the struct needs no manual padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ScatteringUniform {
    /// x = planet radius, y = atmosphere height, z = Rayleigh scale height, w = Mie scale height.
    pub shell: [f32; 4],
    /// xyz = Rayleigh scattering, w = Mie g.
    pub rayleigh_scattering_g: [f32; 4],
    /// xyz = Rayleigh extinction, w = sample count.
    pub rayleigh_extinction_samples: [f32; 4],
    /// xyz = Mie scattering, w = max ray length.
    pub mie_scattering_ray_length: [f32; 4],
    /// xyz = Mie extinction, w = distance scale.
    pub mie_extinction_scale: [f32; 4],
    /// xyz = incoming light, w = unused.
    pub incoming_light: [f32; 4],
    /// xyz = normalized direction toward the sun, w = unused.
    pub sun_direction: [f32; 4],
    /// xyz = camera position, w = camera far plane.
    pub camera_position_far: [f32; 4],
    /// Far-plane frustum corners: top-left, top-right, bottom-left, bottom-right.
    pub frustum_corners: [[f32; 4]; 4],
}

impl ScatteringUniform {
    /// Pack parameters and per-frame camera/sun state.
    pub fn new(
        params: &AtmosphereParameters,
        sun_direction: Vec3,
        camera_position: Vec3,
        far: f32,
        corners: [Vec3; 4],
    ) -> Self {
        let pack = |v: Vec3, w: f32| Vec4::new(v.x, v.y, v.z, w).to_array();
        Self {
            shell: [
                params.planet_radius,
                params.atmosphere_height,
                params.rayleigh_scale_height,
                params.mie_scale_height,
            ],
            rayleigh_scattering_g: pack(params.rayleigh_scattering, params.mie_g),
            rayleigh_extinction_samples: pack(
                params.rayleigh_extinction,
                params.sample_count as f32,
            ),
            mie_scattering_ray_length: pack(params.mie_scattering, params.max_ray_length),
            mie_extinction_scale: pack(params.mie_extinction, params.distance_scale),
            incoming_light: pack(params.incoming_light, 0.0),
            sun_direction: pack(sun_direction.normalize_or_zero(), 0.0),
            camera_position_far: pack(camera_position, far),
            frustum_corners: corners.map(|c| pack(c, 1.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters_are_earth_like() {
        let params = AtmosphereParameters::default();
        assert_eq!(params.planet_radius, 6_371_000.0);
        assert_eq!(params.atmosphere_height, 80_000.0);
        assert!(params.rayleigh_scattering.z > params.rayleigh_scattering.x);
        assert_eq!(params.sample_count, 16);
    }

    #[test]
    fn test_from_config_clamps_coefficients() {
        let config = ScatteringConfig {
            rayleigh_scatter_coef: 50.0,
            mie_extinction_coef: -1.0,
            mie_g: 1.0,
            sample_count: 0,
            ..Default::default()
        };
        let params = AtmosphereParameters::from_config(&config);
        assert_eq!(params.rayleigh_scattering, RAYLEIGH_SCATTERING_SEA_LEVEL * 10.0);
        assert_eq!(params.mie_extinction, Vec3::ZERO);
        assert!(params.mie_g < 1.0);
        assert_eq!(params.sample_count, 1);
    }

    #[test]
    fn test_clamp_height() {
        let params = AtmosphereParameters::default();
        assert_eq!(params.clamp_height(-10.0), 0.0);
        assert_eq!(params.clamp_height(1.0e6), params.atmosphere_height);
        assert_eq!(params.clamp_height(f32::NAN), 0.0);
    }

    #[test]
    fn test_lut_rebuild_detection() {
        let base = AtmosphereParameters::default();

        let mut per_frame = base.clone();
        per_frame.sample_count = 32;
        per_frame.distance_scale = 10.0;
        assert!(!base.requires_lut_rebuild(&per_frame));

        let mut physical = base.clone();
        physical.mie_g = 0.5;
        assert!(base.requires_lut_rebuild(&physical));
    }

    #[test]
    fn test_uniform_alignment() {
        assert_eq!(std::mem::size_of::<ScatteringUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<ScatteringUniform>(), 8 * 16 + 64);
    }

    #[test]
    fn test_uniform_packs_sample_count() {
        let params = AtmosphereParameters::default();
        let uniform =
            ScatteringUniform::new(&params, Vec3::Y * 2.0, Vec3::ZERO, 100.0, [Vec3::ONE; 4]);
        assert_eq!(uniform.rayleigh_extinction_samples[3], 16.0);
        assert!((uniform.sun_direction[1] - 1.0).abs() < 1e-6);
        assert_eq!(uniform.camera_position_far[3], 100.0);
    }
}
