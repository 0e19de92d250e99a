//! Headless stand-in for the host renderer's opaque pass.
//!
//! A ground plane at `y = 0` plus a few spheres, ray traced into the color
//! and linear depth targets the scattering pipeline composites over.

use glam::{Vec3, Vec4};
use nebula_atmosphere::model::ray_sphere_intersect;
use nebula_atmosphere::{
    ColorBuffer, DepthBuffer, FrustumCorners, SceneLighting, ShadowMap, pixel_uv,
};

/// Offset along the surface normal for shadow rays.
const SHADOW_BIAS: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub albedo: Vec3,
}

impl Sphere {
    /// Nearest positive hit distance along a unit `dir`.
    pub fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        let (near, far) = ray_sphere_intersect(origin, dir, self.center, self.radius)?;
        [near, far].into_iter().find(|&t| t > 0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub distance: f32,
    pub normal: Vec3,
    pub albedo: Vec3,
}

#[derive(Clone, Debug)]
pub struct DemoScene {
    pub ground_albedo: Vec3,
    pub spheres: Vec<Sphere>,
}

impl Default for DemoScene {
    fn default() -> Self {
        Self {
            ground_albedo: Vec3::new(0.18, 0.22, 0.12),
            spheres: vec![
                Sphere {
                    center: Vec3::new(0.0, 400.0, -3000.0),
                    radius: 400.0,
                    albedo: Vec3::splat(0.5),
                },
                Sphere {
                    center: Vec3::new(-900.0, 250.0, -1800.0),
                    radius: 250.0,
                    albedo: Vec3::new(0.6, 0.4, 0.3),
                },
            ],
        }
    }
}

impl DemoScene {
    /// Closest surface along a unit `dir` from `origin`.
    pub fn trace(&self, origin: Vec3, dir: Vec3) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        if dir.y < 0.0 && origin.y > 0.0 {
            best = Some(Hit {
                distance: -origin.y / dir.y,
                normal: Vec3::Y,
                albedo: self.ground_albedo,
            });
        }
        for sphere in &self.spheres {
            let Some(t) = sphere.intersect(origin, dir) else {
                continue;
            };
            if best.is_none_or(|hit| t < hit.distance) {
                best = Some(Hit {
                    distance: t,
                    normal: (origin + dir * t - sphere.center).normalize_or(Vec3::Y),
                    albedo: sphere.albedo,
                });
            }
        }
        best
    }

    /// Whether anything blocks the path from `position` toward the sun.
    pub fn occluded(&self, position: Vec3, toward_sun: Vec3) -> bool {
        self.spheres
            .iter()
            .any(|s| s.intersect(position, toward_sun).is_some())
    }

    /// Draw the opaque pass: lit color plus linear depth fraction (1 for sky).
    pub fn render(
        &self,
        corners: &FrustumCorners,
        size: (u32, u32),
        lighting: &SceneLighting,
        workers: usize,
    ) -> (ColorBuffer, DepthBuffer) {
        let (width, height) = size;
        let toward_sun = lighting.sun.toward_sun();
        let sun = lighting.sun.color * lighting.sun.intensity;
        let ambient = lighting.ambient.color * lighting.ambient.intensity;

        let targets = nebula_atmosphere::Buffer2d::from_fn(width, height, workers, |x, y| {
            let uv = pixel_uv(x, y, width, height);
            let dir = corners.direction(uv.x, uv.y);
            let far = corners.far_distance(uv.x, uv.y);
            match self.trace(corners.camera, dir) {
                Some(hit) if hit.distance < far => {
                    let position = corners.camera + dir * hit.distance;
                    let lit = if self.occluded(position + hit.normal * SHADOW_BIAS, toward_sun) {
                        0.0
                    } else {
                        hit.normal.dot(toward_sun).max(0.0)
                    };
                    let color = hit.albedo * (sun * lit + ambient);
                    color.extend(hit.distance / far)
                }
                _ => Vec4::new(0.0, 0.0, 0.0, 1.0),
            }
        });
        (targets.map(|t| t.truncate()), targets.map(|t| t.w))
    }

    /// Shadow lookups against the current sun direction.
    pub fn shadow_map(&self, toward_sun: Vec3) -> SceneShadow<'_> {
        SceneShadow {
            scene: self,
            toward_sun,
        }
    }
}

/// Ray-traced sun visibility.
pub struct SceneShadow<'a> {
    scene: &'a DemoScene,
    toward_sun: Vec3,
}

impl ShadowMap for SceneShadow<'_> {
    fn visibility(&self, world_position: Vec3) -> f32 {
        if self.scene.occluded(world_position, self.toward_sun) {
            0.0
        } else {
            1.0
        }
    }
}
