//! Skybox inscattering and extinction volumes, and sky evaluation from them.
//!
//! The volumes are indexed by (view zenith cosine, sun zenith cosine, height)
//! with the sun placed in the view's vertical plane. Rayleigh inscatter
//! without phase goes in RGB; the red channel of Mie inscatter goes in alpha
//! and the other Mie channels are reconstructed from the coefficient ratio.
//! The extinction volume holds view transmittance in RGB and 1 in alpha when
//! the ray escapes to space, 0 when it ends on the ground.

use glam::{Vec3, Vec4};
use nebula_config::SunConfig;
use tracing::info;

use crate::density::ParticleDensityTable;
use crate::dispatch::dispatch_3d;
use crate::model::{
    ViewRay, distance_to_ground, integrate_single_scattering, phase_mie, phase_rayleigh,
};
use crate::params::AtmosphereParameters;
use crate::volume::Volume3;

/// Cosine of the angular radius at which the sun disc fades out.
pub const SUN_DISC_OUTER_COS: f32 = 0.9997;
/// Cosine of the angular radius inside which the sun disc is at full strength.
pub const SUN_DISC_INNER_COS: f32 = 0.9999;
/// Disc radiance relative to the incoming light at intensity 1.
pub const SUN_DISC_BRIGHTNESS: f32 = 20.0;

/// Sun disc drawn on top of the sky.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SunDisc {
    pub enabled: bool,
    pub intensity: f32,
}

impl SunDisc {
    pub const NONE: Self = Self {
        enabled: false,
        intensity: 0.0,
    };

    pub fn from_config(config: &SunConfig) -> Self {
        Self {
            enabled: config.render_sun,
            intensity: config.sun_intensity.clamp(0.0, 10.0),
        }
    }
}

/// The inscatter/extinction volume pair for the skybox.
#[derive(Clone, Debug, PartialEq)]
pub struct SkyboxVolumes {
    pub inscatter: Volume3,
    pub extinction: Volume3,
}

fn axis_cosine(i: usize, n: usize) -> f32 {
    i as f32 / (n - 1).max(1) as f32 * 2.0 - 1.0
}

fn in_plane_cos_view_sun(cos_view: f32, cos_sun: f32) -> f32 {
    let sin_view = (1.0 - cos_view * cos_view).max(0.0).sqrt();
    let sin_sun = (1.0 - cos_sun * cos_sun).max(0.0).sqrt();
    (sin_view * sin_sun + cos_view * cos_sun).clamp(-1.0, 1.0)
}

impl SkyboxVolumes {
    /// Integrate every voxel against the density table.
    pub fn build(
        params: &AtmosphereParameters,
        density: &ParticleDensityTable,
        size: [u32; 3],
        workers: usize,
    ) -> Self {
        let started = std::time::Instant::now();
        let size = size.map(|s| s.max(2) as usize);
        let [nv, ns, nh] = size;

        let voxels = dispatch_3d(size, workers, |x, y, z| {
            let cos_view = axis_cosine(x, nv);
            let cos_sun = axis_cosine(y, ns);
            let height = z as f32 / (nh - 1) as f32 * params.atmosphere_height;
            let ray = ViewRay {
                height,
                cos_view_zenith: cos_view,
                cos_sun_zenith: cos_sun,
                cos_view_sun: in_plane_cos_view_sun(cos_view, cos_sun),
            };
            let escapes = distance_to_ground(params, height, cos_view).is_none();
            let length = ray.length_in_atmosphere(params);
            let s = integrate_single_scattering(params, density, &ray, length, params.sample_count);

            let inscatter = s.rayleigh.extend(s.mie.x);
            let extinction = s.transmittance.extend(if escapes { 1.0 } else { 0.0 });
            (inscatter, extinction)
        });

        let (inscatter, extinction): (Vec<Vec4>, Vec<Vec4>) = voxels.into_iter().unzip();
        info!(
            size = ?size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built skybox inscattering volume"
        );
        Self {
            inscatter: Volume3::from_cells(size, inscatter),
            extinction: Volume3::from_cells(size, extinction),
        }
    }

    fn lookup(&self, params: &AtmosphereParameters, ray: &ViewRay) -> (Vec4, Vec4) {
        let u = (ray.cos_view_zenith.clamp(-1.0, 1.0) + 1.0) * 0.5;
        let v = (ray.cos_sun_zenith.clamp(-1.0, 1.0) + 1.0) * 0.5;
        let w = params.clamp_height(ray.height) / params.atmosphere_height;
        (
            self.inscatter.sample_normalized(u, v, w),
            self.extinction.sample_normalized(u, v, w),
        )
    }

    /// Sky radiance along `ray`, without the sun disc.
    pub fn inscattered(&self, params: &AtmosphereParameters, ray: &ViewRay) -> Vec3 {
        let (inscatter, _) = self.lookup(params, ray);
        let rayleigh = inscatter.truncate();
        let mie = reconstruct_mie(params, inscatter);
        params.incoming_light
            * (rayleigh * phase_rayleigh(ray.cos_view_sun)
                + mie * phase_mie(ray.cos_view_sun, params.mie_g))
    }

    /// Transmittance along `ray` and whether it escapes to space.
    pub fn transmittance(&self, params: &AtmosphereParameters, ray: &ViewRay) -> (Vec3, bool) {
        let (_, extinction) = self.lookup(params, ray);
        (extinction.truncate(), extinction.w > 0.5)
    }

    /// Full sky color for a view ray, including the sun disc when enabled.
    pub fn sky_color(&self, params: &AtmosphereParameters, ray: &ViewRay, sun: SunDisc) -> Vec3 {
        let mut color = self.inscattered(params, ray);
        if sun.enabled && sun.intensity > 0.0 {
            let (transmittance, escapes) = self.transmittance(params, ray);
            if escapes {
                let edge = smoothstep(SUN_DISC_OUTER_COS, SUN_DISC_INNER_COS, ray.cos_view_sun);
                color += params.incoming_light
                    * transmittance
                    * (sun.intensity * SUN_DISC_BRIGHTNESS * edge);
            }
        }
        color
    }
}

/// Recover RGB Mie inscatter from the stored Rayleigh RGB and Mie red.
///
/// Assumes Rayleigh and Mie inscatter share the same spectral shaping apart
/// from their scattering coefficients.
pub fn reconstruct_mie(params: &AtmosphereParameters, inscatter: Vec4) -> Vec3 {
    let rayleigh = inscatter.truncate();
    let beta_r = params.rayleigh_scattering;
    let beta_m = params.mie_scattering;
    if rayleigh.x <= 0.0 || beta_r.cmple(Vec3::ZERO).any() || beta_m.x <= 0.0 {
        return Vec3::splat(inscatter.w.max(0.0));
    }
    rayleigh * (inscatter.w / rayleigh.x) * (beta_r.x / beta_m.x) * (beta_m / beta_r)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
