//! 1D light color tables indexed by sun zenith cosine.
//!
//! Both tables share one remap between the cosine `u` in `[-1, 1]` and the
//! table index: `index = (u + 0.1) / 1.1 * N`. Values are stored gamma
//! encoded, the form pushed to the host's lights.

use glam::Vec3;
use tracing::info;

use crate::density::ParticleDensityTable;
use crate::dispatch::dispatch_1d;
use crate::model::{
    ScatteringSample, ViewRay, distance_to_top, integrate_single_scattering, transmittance,
};
use crate::params::AtmosphereParameters;
use crate::random::RandomDirectionTable;

/// Added to the cosine before scaling into index space.
pub const REMAP_BIAS: f32 = 0.1;
/// Cosine range covered by the table, `[-0.1, 1.0]`.
pub const REMAP_SCALE: f32 = 1.1;
/// Display gamma used for stored colors.
pub const GAMMA: f32 = 2.2;

/// Raymarch steps per ambient sample direction.
const AMBIENT_RAY_SAMPLES: u32 = 32;

/// Continuous table index for a sun zenith cosine.
pub fn remap_index(cos_sun_zenith: f32, len: usize) -> f32 {
    (cos_sun_zenith + REMAP_BIAS) / REMAP_SCALE * len as f32
}

/// Sun zenith cosine that table entry `i` was built for. Inverse of [`remap_index`].
pub fn entry_cosine(i: usize, len: usize) -> f32 {
    i as f32 / len as f32 * REMAP_SCALE - REMAP_BIAS
}

pub fn gamma_encode(linear: Vec3) -> Vec3 {
    linear.max(Vec3::ZERO).powf(1.0 / GAMMA)
}

pub fn gamma_decode(encoded: Vec3) -> Vec3 {
    encoded.max(Vec3::ZERO).powf(GAMMA)
}

/// A 1D table of gamma-encoded colors.
#[derive(Clone, Debug, PartialEq)]
pub struct LightColorTable {
    colors: Vec<Vec3>,
}

impl LightColorTable {
    pub fn from_colors(colors: Vec<Vec3>) -> Self {
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Vec3] {
        &self.colors
    }

    /// Interpolated gamma-encoded color for a sun zenith cosine.
    ///
    /// Both neighbouring indices are clamped to `[0, N - 1]`, so any input,
    /// including NaN, reads inside the table.
    pub fn sample(&self, cos_sun_zenith: f32) -> Vec3 {
        let Some(last) = self.colors.len().checked_sub(1) else {
            return Vec3::ZERO;
        };
        let index = remap_index(cos_sun_zenith, self.colors.len());
        let index = if index.is_nan() { 0.0 } else { index };
        let floor = index.floor();
        let t = (index - floor).clamp(0.0, 1.0);
        let i0 = (floor.max(0.0) as usize).min(last);
        let i1 = ((floor + 1.0).max(0.0) as usize).min(last);
        self.colors[i0].lerp(self.colors[i1], t)
    }

    /// [`sample`](Self::sample) converted back to linear radiance.
    pub fn sample_linear(&self, cos_sun_zenith: f32) -> Vec3 {
        gamma_decode(self.sample(cos_sun_zenith))
    }
}

/// Sunlight reaching the ground after extinction through the atmosphere.
pub fn build_directional(
    params: &AtmosphereParameters,
    density: &ParticleDensityTable,
    len: usize,
    workers: usize,
) -> LightColorTable {
    let colors = dispatch_1d(len, workers, |i| {
        let cos = entry_cosine(i, len);
        let depth = density.sample(0.0, cos);
        gamma_encode(params.incoming_light * transmittance(params, depth))
    });
    LightColorTable::from_colors(colors)
}

/// Sky irradiance on an upward-facing surface, as a cosine-weighted
/// Monte-Carlo estimate over `directions` folded into the upper hemisphere.
pub fn build_ambient(
    params: &AtmosphereParameters,
    density: &ParticleDensityTable,
    directions: &RandomDirectionTable,
    len: usize,
    workers: usize,
) -> LightColorTable {
    let count = directions.len().max(1) as f32;
    let colors = dispatch_1d(len, workers, |i| {
        let cos_sun = entry_cosine(i, len).clamp(-1.0, 1.0);
        let sun = Vec3::new((1.0 - cos_sun * cos_sun).max(0.0).sqrt(), cos_sun, 0.0);

        let mut sum = Vec3::ZERO;
        for &dir in directions.directions() {
            let dir = if dir.y < 0.0 { -dir } else { dir };
            let ray = ViewRay::from_directions(0.0, Vec3::Y, dir, sun);
            let length = distance_to_top(params, 0.0, ray.cos_view_zenith);
            let sample: ScatteringSample =
                integrate_single_scattering(params, density, &ray, length, AMBIENT_RAY_SAMPLES);
            sum += sample.radiance(params, ray.cos_view_sun) * ray.cos_view_zenith;
        }
        gamma_encode(sum * (2.0 / count))
    });
    LightColorTable::from_colors(colors)
}

/// The directional/ambient pair, always built and published together.
#[derive(Clone, Debug, PartialEq)]
pub struct LightColorTables {
    pub ambient: LightColorTable,
    pub directional: LightColorTable,
}

impl LightColorTables {
    /// Build ambient first, then directional. Neither is visible until both exist.
    pub fn build(
        params: &AtmosphereParameters,
        density: &ParticleDensityTable,
        directions: &RandomDirectionTable,
        len: u32,
        workers: usize,
    ) -> Self {
        let len = len.max(2) as usize;
        let started = std::time::Instant::now();
        let ambient = build_ambient(params, density, directions, len, workers);
        let directional = build_directional(params, density, len, workers);
        info!(
            entries = len,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built light color tables"
        );
        Self {
            ambient,
            directional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn density(params: &AtmosphereParameters) -> ParticleDensityTable {
        ParticleDensityTable::build(params, 65, 32, 4)
    }

    #[test]
    fn test_remap_round_trips() {
        for i in [0, 1, 63, 127] {
            let cos = entry_cosine(i, 128);
            assert!((remap_index(cos, 128) - i as f32).abs() < 1e-3, "entry {i}");
        }
    }

    #[test]
    fn test_sample_at_entry_returns_entry() {
        let table = LightColorTable::from_colors((0..8).map(|i| Vec3::splat(i as f32)).collect());
        for i in 0..8 {
            let value = table.sample(entry_cosine(i, 8));
            assert!((value.x - i as f32).abs() < 1e-4, "entry {i}: {value:?}");
        }
    }

    #[test]
    fn test_sample_clamps_at_poles() {
        let table = LightColorTable::from_colors((0..8).map(|i| Vec3::splat(i as f32)).collect());
        assert_eq!(table.sample(-1.0), Vec3::ZERO);
        assert_eq!(table.sample(-0.1), Vec3::ZERO);
        assert_eq!(table.sample(1.0), Vec3::splat(7.0));
        assert_eq!(table.sample(5.0), Vec3::splat(7.0));
        assert_eq!(table.sample(f32::NAN), Vec3::ZERO);
    }

    #[test]
    fn test_sample_is_continuous() {
        let table = LightColorTable::from_colors(vec![
            Vec3::new(0.0, 1.0, 2.0),
            Vec3::new(4.0, 3.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(9.0, 0.0, 5.0),
        ]);
        let base = table.sample(0.3);
        for eps in [1e-2f32, 1e-3, 1e-4] {
            let delta = (table.sample(0.3 + eps) - base).abs().max_element();
            assert!(delta < eps * 50.0, "eps={eps}: delta {delta}");
        }
    }

    #[test]
    fn test_empty_table_samples_black() {
        assert_eq!(LightColorTable::from_colors(Vec::new()).sample(0.5), Vec3::ZERO);
    }

    #[test]
    fn test_directional_reddens_toward_horizon() {
        let params = AtmosphereParameters::default();
        let table = build_directional(&params, &density(&params), 128, 4);
        let ratio = |cos: f32| {
            let c = table.sample_linear(cos);
            c.z / c.x
        };
        let mut previous = f32::MAX;
        for cos in [1.0, 0.8, 0.6, 0.4, 0.2, 0.1, 0.05] {
            let r = ratio(cos);
            assert!(r <= previous + 1e-4, "blue/red ratio rose at cos={cos}: {r} > {previous}");
            previous = r;
        }
        assert!(ratio(0.05) < 0.7 * ratio(1.0));
    }

    #[test]
    fn test_zero_coefficients_pass_incoming_light() {
        let mut params = AtmosphereParameters::default();
        params.rayleigh_scattering = Vec3::ZERO;
        params.rayleigh_extinction = Vec3::ZERO;
        params.mie_scattering = Vec3::ZERO;
        params.mie_extinction = Vec3::ZERO;

        let density = density(&params);
        let directions = RandomDirectionTable::new();
        let tables = LightColorTables::build(&params, &density, &directions, 16, 2);
        let incoming = gamma_encode(params.incoming_light);
        for cos in [0.0, 0.5, 1.0] {
            let d = tables.directional.sample(cos);
            assert!((d - incoming).abs().max_element() < 1e-5, "cos={cos}: {d:?}");
            assert_eq!(tables.ambient.sample(cos), Vec3::ZERO);
        }
    }

    #[test]
    fn test_ambient_brighter_at_noon_than_night() {
        let params = AtmosphereParameters::default();
        let table = build_ambient(&params, &density(&params), &RandomDirectionTable::new(), 16, 4);
        let noon = table.sample_linear(1.0);
        let dusk = table.sample_linear(-0.1);
        assert!(noon.z > dusk.z, "noon {noon:?} dusk {dusk:?}");
        assert!(noon.z > noon.x, "daytime sky light should be blue: {noon:?}");
    }

    #[test]
    fn test_rebuild_is_identical() {
        let params = AtmosphereParameters::default();
        let density = density(&params);
        let directions = RandomDirectionTable::new();
        let a = LightColorTables::build(&params, &density, &directions, 16, 1);
        let b = LightColorTables::build(&params, &density, &directions, 16, 3);
        assert_eq!(a, b);
    }
}
