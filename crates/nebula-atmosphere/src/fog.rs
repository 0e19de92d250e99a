//! Height fog evaluation and the composite over the opaque scene.

use glam::Vec3;
use nebula_config::RenderMode;

use crate::buffer::{Buffer2d, ColorBuffer, DepthBuffer};
use crate::density::ParticleDensityTable;
use crate::frustum::{FrustumCorners, FrustumVolumes, pixel_uv};
use crate::model::{ViewRay, integrate_single_scattering};
use crate::params::AtmosphereParameters;
use crate::program::FRUSTUM_LUT;
use crate::skybox::{SkyboxVolumes, SunDisc};
use crate::stage::{CommandList, DrawOp};

/// Everything a fog evaluator needs for one frame.
pub struct FogFrame<'a> {
    pub params: &'a AtmosphereParameters,
    /// Parameters the published skybox volumes were built with.
    pub sky_params: &'a AtmosphereParameters,
    pub density: &'a ParticleDensityTable,
    pub corners: &'a FrustumCorners,
    /// Camera height above the ground in meters.
    pub camera_height: f32,
    /// Unit vector toward the sun.
    pub sun_direction: Vec3,
    pub frustum_size: [u32; 3],
    pub workers: usize,
}

impl FogFrame<'_> {
    fn view_ray(&self, u: f32, v: f32) -> ViewRay {
        ViewRay::from_directions(
            self.camera_height,
            Vec3::Y,
            self.corners.direction(u, v),
            self.sun_direction,
        )
    }
}

/// How inscattering and extinction are obtained for a pixel.
pub trait FogEvaluator: Send + Sync {
    fn mode(&self) -> RenderMode;

    /// Per-frame work before any pixel is evaluated.
    fn prepare(&mut self, frame: &FogFrame<'_>, commands: &mut CommandList);

    /// `(inscatter, extinction)` from the camera to linear depth `depth` through `(u, v)`.
    fn evaluate(&self, frame: &FogFrame<'_>, u: f32, v: f32, depth: f32) -> (Vec3, Vec3);

    /// Drop per-frame resources at the end of the frame.
    fn release(&mut self) {}
}

/// Select the evaluator for a render mode.
pub fn create_evaluator(mode: RenderMode) -> Box<dyn FogEvaluator> {
    match mode {
        RenderMode::Reference => Box::new(ReferenceFog),
        RenderMode::Optimized => Box::new(OptimizedFog::default()),
    }
}

/// Integrates every pixel's view ray directly.
pub struct ReferenceFog;

impl FogEvaluator for ReferenceFog {
    fn mode(&self) -> RenderMode {
        RenderMode::Reference
    }

    fn prepare(&mut self, _frame: &FogFrame<'_>, _commands: &mut CommandList) {}

    fn evaluate(&self, frame: &FogFrame<'_>, u: f32, v: f32, depth: f32) -> (Vec3, Vec3) {
        let params = frame.params;
        let ray = frame.view_ray(u, v);
        let distance = frame.corners.far_distance(u, v) * depth.clamp(0.0, 1.0);
        let length = (distance * params.distance_scale).min(params.max_ray_length);
        let sample =
            integrate_single_scattering(params, frame.density, &ray, length, params.sample_count);
        (sample.radiance(params, ray.cos_view_sun), sample.transmittance)
    }
}

/// Samples the per-frame frustum volume.
#[derive(Default)]
pub struct OptimizedFog {
    volumes: Option<FrustumVolumes>,
}

impl OptimizedFog {
    pub fn volumes(&self) -> Option<&FrustumVolumes> {
        self.volumes.as_ref()
    }
}

impl FogEvaluator for OptimizedFog {
    fn mode(&self) -> RenderMode {
        RenderMode::Optimized
    }

    fn prepare(&mut self, frame: &FogFrame<'_>, commands: &mut CommandList) {
        self.volumes = Some(FrustumVolumes::build(
            frame.params,
            frame.density,
            frame.corners,
            frame.camera_height,
            frame.sun_direction,
            frame.frustum_size,
            frame.workers,
        ));
        let [w, h, _] = frame.frustum_size;
        commands.push(DrawOp::compute(FRUSTUM_LUT, "inscatter", "frustum_volume", (w, h)));
    }

    fn evaluate(&self, _frame: &FogFrame<'_>, u: f32, v: f32, depth: f32) -> (Vec3, Vec3) {
        match &self.volumes {
            Some(volumes) => volumes.sample(u, v, depth),
            None => (Vec3::ZERO, Vec3::ONE),
        }
    }

    fn release(&mut self) {
        self.volumes = None;
    }
}

/// Flags for one composite pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositeSettings {
    /// Blend fog over opaque pixels.
    pub apply_fog: bool,
    pub sun_disc: SunDisc,
}

/// Blend fog over opaque pixels and fill sky pixels from the skybox.
///
/// Opaque pixels become `scene * extinction + inscatter * shaft`, with
/// `shaft = 1` when no shaft buffer is given. Pixels with depth `>= 1` are sky.
pub fn composite(
    color: &mut ColorBuffer,
    depth: &DepthBuffer,
    frame: &FogFrame<'_>,
    evaluator: &dyn FogEvaluator,
    skybox: &SkyboxVolumes,
    shafts: Option<&Buffer2d<f32>>,
    settings: CompositeSettings,
) {
    let (w, h) = color.size();
    let scene = &*color;
    let blended = Buffer2d::from_fn(w, h, frame.workers, |x, y| {
        let uv = pixel_uv(x, y, w, h);
        let pixel = scene.get(x as i64, y as i64);
        let d = depth.get(x as i64, y as i64);

        if d >= 1.0 {
            return skybox.sky_color(
                frame.sky_params,
                &frame.view_ray(uv.x, uv.y),
                settings.sun_disc,
            );
        }
        if !settings.apply_fog {
            return pixel;
        }
        let (inscatter, extinction) = evaluator.evaluate(frame, uv.x, uv.y, d);
        let shaft = shafts.map_or(1.0, |b| b.sample_bilinear(uv.x, uv.y));
        pixel * extinction + inscatter * shaft
    });
    *color = blended;
}
