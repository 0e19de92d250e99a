//! Analytic single-scattering model: density falloff, ray/shell geometry,
//! optical depth integration and phase functions.
//!
//! Everything here is a pure function of [`AtmosphereParameters`]. Rays are
//! described in planet-local scalars (height, zenith cosines) rather than
//! world positions so that distances stay accurate in `f32` at planetary scale.

use glam::{Vec2, Vec3};
use std::f32::consts::PI;

use crate::params::AtmosphereParameters;

/// Optical depth reported for rays that end on the (opaque) planet surface.
pub const OPAQUE_OPTICAL_DEPTH: f32 = 1.0e9;

/// Anything that can answer "how much air is between this point and space
/// along this direction". Implemented analytically and by the density table.
pub trait OpticalDepthSource {
    /// Density-weighted path length `(rayleigh, mie)` in meters.
    fn optical_depth(&self, height: f32, cos_zenith: f32) -> Vec2;
}

/// Direct numerical integration of [`optical_depth`].
pub struct AnalyticOpticalDepth<'a> {
    pub params: &'a AtmosphereParameters,
    pub steps: u32,
}

impl OpticalDepthSource for AnalyticOpticalDepth<'_> {
    fn optical_depth(&self, height: f32, cos_zenith: f32) -> Vec2 {
        optical_depth(self.params, height, cos_zenith, self.steps)
    }
}

/// Relative particle densities `(rayleigh, mie)` at `height`.
pub fn density_at_height(params: &AtmosphereParameters, height: f32) -> Vec2 {
    let h = height.max(0.0);
    Vec2::new(
        (-h / params.rayleigh_scale_height).exp(),
        (-h / params.mie_scale_height).exp(),
    )
}

/// Rayleigh phase function.
pub fn phase_rayleigh(cos_angle: f32) -> f32 {
    let c = cos_angle.clamp(-1.0, 1.0);
    3.0 / (16.0 * PI) * (1.0 + c * c)
}

/// Henyey-Greenstein phase function with asymmetry `g`.
pub fn phase_mie(cos_angle: f32, g: f32) -> f32 {
    let c = cos_angle.clamp(-1.0, 1.0);
    let g = g.clamp(0.0, 0.999);
    let g2 = g * g;
    (1.0 - g2) / (4.0 * PI * (1.0 + g2 - 2.0 * g * c).powf(1.5))
}

/// Ray-sphere intersection returning `(t_near, t_far)`, or `None` on a miss.
pub fn ray_sphere_intersect(
    origin: Vec3,
    dir: Vec3,
    center: Vec3,
    radius: f32,
) -> Option<(f32, f32)> {
    let oc = origin - center;
    let b = oc.dot(dir);
    let c = oc.dot(oc) - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    Some((-b - sqrt_disc, -b + sqrt_disc))
}

/// Whether a ray starting at `height` with zenith cosine `cos_zenith` hits the ground.
pub fn ray_hits_ground(params: &AtmosphereParameters, height: f32, cos_zenith: f32) -> bool {
    if cos_zenith >= 0.0 {
        return false;
    }
    let h = params.clamp_height(height);
    let r = params.planet_radius + h;
    let b = r * cos_zenith;
    // r^2 - R^2 expanded to keep precision near the surface.
    let c = h * (2.0 * params.planet_radius + h);
    b * b - c >= 0.0
}

/// Distance from a point at `height` to the top of the atmosphere along `cos_zenith`.
pub fn distance_to_top(params: &AtmosphereParameters, height: f32, cos_zenith: f32) -> f32 {
    let h = params.clamp_height(height);
    let mu = cos_zenith.clamp(-1.0, 1.0);
    let r = params.planet_radius + h;
    let top = params.atmosphere_height;
    let b = r * mu;
    // r^2 - r_top^2, never positive inside the shell.
    let c = (h - top) * (2.0 * params.planet_radius + h + top);
    let sqrt_disc = (b * b - c).max(0.0).sqrt();
    if b > 0.0 {
        let denom = b + sqrt_disc;
        if denom > 0.0 { -c / denom } else { 0.0 }
    } else {
        -b + sqrt_disc
    }
}

/// Distance from a point at `height` to the planet surface, `None` if the ray misses it.
pub fn distance_to_ground(
    params: &AtmosphereParameters,
    height: f32,
    cos_zenith: f32,
) -> Option<f32> {
    if !ray_hits_ground(params, height, cos_zenith) {
        return None;
    }
    let h = params.clamp_height(height);
    let r = params.planet_radius + h;
    let b = r * cos_zenith;
    let c = h * (2.0 * params.planet_radius + h);
    let sqrt_disc = (b * b - c).max(0.0).sqrt();
    let denom = -b + sqrt_disc;
    Some(if denom > 0.0 { c / denom } else { 0.0 })
}

/// Planet-local description of a point on a ray.
#[derive(Clone, Copy, Debug)]
pub struct RaySample {
    /// Height above the surface.
    pub height: f32,
    /// Cosine between the local up vector and the direction toward the sun.
    pub cos_sun_zenith: f32,
}

/// A view ray expressed in planet-local scalars.
#[derive(Clone, Copy, Debug)]
pub struct ViewRay {
    /// Height of the ray origin above the surface.
    pub height: f32,
    /// Cosine between local up and the view direction.
    pub cos_view_zenith: f32,
    /// Cosine between local up and the sun direction.
    pub cos_sun_zenith: f32,
    /// Cosine between the view direction and the sun direction.
    pub cos_view_sun: f32,
}

impl ViewRay {
    /// Build from world-space directions at a given height. `up` must be unit length.
    pub fn from_directions(height: f32, up: Vec3, view_dir: Vec3, sun_dir: Vec3) -> Self {
        let view = view_dir.normalize_or_zero();
        let sun = sun_dir.normalize_or_zero();
        Self {
            height,
            cos_view_zenith: up.dot(view).clamp(-1.0, 1.0),
            cos_sun_zenith: up.dot(sun).clamp(-1.0, 1.0),
            cos_view_sun: view.dot(sun).clamp(-1.0, 1.0),
        }
    }

    /// Height and sun zenith at distance `t` along the ray.
    pub fn sample(&self, params: &AtmosphereParameters, t: f32) -> RaySample {
        let h0 = params.clamp_height(self.height);
        let r0 = params.planet_radius + h0;
        // r(t)^2 - R^2 = t^2 + 2 r0 mu t + h0 (2R + h0)
        let excess = t * t + 2.0 * r0 * self.cos_view_zenith * t
            + h0 * (2.0 * params.planet_radius + h0);
        let r_t = (params.planet_radius * params.planet_radius + excess).max(0.0).sqrt();
        let height = if r_t > 0.0 {
            excess / (r_t + params.planet_radius)
        } else {
            0.0
        };
        let cos_sun_zenith = if r_t > 0.0 {
            ((r0 * self.cos_sun_zenith + t * self.cos_view_sun) / r_t).clamp(-1.0, 1.0)
        } else {
            self.cos_sun_zenith
        };
        RaySample {
            height,
            cos_sun_zenith,
        }
    }

    /// Length of the ray inside the atmosphere, ending at the ground if it hits it.
    pub fn length_in_atmosphere(&self, params: &AtmosphereParameters) -> f32 {
        distance_to_ground(params, self.height, self.cos_view_zenith)
            .unwrap_or_else(|| distance_to_top(params, self.height, self.cos_view_zenith))
    }
}

/// Integrate particle density from a point at `height` toward space along `cos_zenith`.
///
/// Heights outside `[0, atmosphere_height]` are clamped. Rays that reach the
/// planet surface return [`OPAQUE_OPTICAL_DEPTH`] for both components.
pub fn optical_depth(
    params: &AtmosphereParameters,
    height: f32,
    cos_zenith: f32,
    steps: u32,
) -> Vec2 {
    let h = params.clamp_height(height);
    let mu = if cos_zenith.is_nan() {
        1.0
    } else {
        cos_zenith.clamp(-1.0, 1.0)
    };

    if ray_hits_ground(params, h, mu) {
        return Vec2::splat(OPAQUE_OPTICAL_DEPTH);
    }

    let length = distance_to_top(params, h, mu);
    let steps = steps.max(1);
    let ds = length / steps as f32;
    let ray = ViewRay {
        height: h,
        cos_view_zenith: mu,
        cos_sun_zenith: mu,
        cos_view_sun: 1.0,
    };

    let mut depth = Vec2::ZERO;
    for i in 0..steps {
        let t = (i as f32 + 0.5) * ds;
        depth += density_at_height(params, ray.sample(params, t).height) * ds;
    }
    depth
}

/// Transmittance for a `(rayleigh, mie)` optical depth pair.
pub fn transmittance(params: &AtmosphereParameters, depth: Vec2) -> Vec3 {
    let tau = params.rayleigh_extinction * depth.x + params.mie_extinction * depth.y;
    Vec3::new((-tau.x).exp(), (-tau.y).exp(), (-tau.z).exp())
}

/// Result of integrating single scattering along a view ray.
///
/// `rayleigh` and `mie` exclude the phase function and incoming light so
/// callers can apply them for any sun/view angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatteringSample {
    pub rayleigh: Vec3,
    pub mie: Vec3,
    /// Transmittance from the ray origin to the end of the ray.
    pub transmittance: Vec3,
}

impl ScatteringSample {
    /// No scattering, full transmittance.
    pub const EMPTY: Self = Self {
        rayleigh: Vec3::ZERO,
        mie: Vec3::ZERO,
        transmittance: Vec3::ONE,
    };

    /// Inscattered radiance toward the viewer.
    pub fn radiance(&self, params: &AtmosphereParameters, cos_view_sun: f32) -> Vec3 {
        params.incoming_light
            * (self.rayleigh * phase_rayleigh(cos_view_sun)
                + self.mie * phase_mie(cos_view_sun, params.mie_g))
    }
}

/// Integrate single scattering along `ray` for `length` meters with `samples` steps.
///
/// Sun transmittance at every sample comes from `sun_depth`.
pub fn integrate_single_scattering(
    params: &AtmosphereParameters,
    sun_depth: &dyn OpticalDepthSource,
    ray: &ViewRay,
    length: f32,
    samples: u32,
) -> ScatteringSample {
    integrate_segment(params, sun_depth, ray, 0.0, length, samples, Vec2::ZERO).0
}

/// Integrate the segment `[start, end]` of `ray`, continuing from an
/// accumulated view optical depth. Returns the segment's contribution
/// and the optical depth at `end`.
pub(crate) fn integrate_segment(
    params: &AtmosphereParameters,
    sun_depth: &dyn OpticalDepthSource,
    ray: &ViewRay,
    start: f32,
    end: f32,
    samples: u32,
    view_depth_at_start: Vec2,
) -> (ScatteringSample, Vec2) {
    let length = (end - start).max(0.0);
    if length <= 0.0 {
        let sample = ScatteringSample {
            transmittance: transmittance(params, view_depth_at_start),
            ..ScatteringSample::EMPTY
        };
        return (sample, view_depth_at_start);
    }

    let samples = samples.max(1);
    let ds = length / samples as f32;
    let mut view_depth = view_depth_at_start;
    let mut rayleigh = Vec3::ZERO;
    let mut mie = Vec3::ZERO;

    for i in 0..samples {
        let t = start + (i as f32 + 0.5) * ds;
        let point = ray.sample(params, t);
        let density = density_at_height(params, point.height) * ds;

        // Optical depth up to the sample point (midpoint rule).
        let depth_to_point = view_depth + density * 0.5;
        view_depth += density;

        let light_depth = sun_depth.optical_depth(point.height, point.cos_sun_zenith);
        let t_total = transmittance(params, depth_to_point + light_depth);

        rayleigh += density.x * t_total;
        mie += density.y * t_total;
    }

    let sample = ScatteringSample {
        rayleigh: rayleigh * params.rayleigh_scattering,
        mie: mie * params.mie_scattering,
        transmittance: transmittance(params, view_depth),
    };
    (sample, view_depth)
}
