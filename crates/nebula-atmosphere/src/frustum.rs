//! Camera frustum corners and the per-frame frustum inscattering volume.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use tracing::debug;

use crate::density::ParticleDensityTable;
use crate::dispatch::dispatch_columns;
use crate::model::{ViewRay, integrate_segment};
use crate::params::AtmosphereParameters;
use crate::volume::Volume3;

/// Perspective camera as seen by the scattering pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    /// World position in scene units. `y` is the height above the ground plane.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width / height.
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraState {
    /// Camera at `position` looking toward `target` with world +Y up.
    pub fn looking_at(
        position: Vec3,
        target: Vec3,
        fov_y: f32,
        aspect_ratio: f32,
        far: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(position, target, Vec3::Y);
        let rotation = Quat::from_mat4(&view.inverse()).normalize();
        Self {
            position,
            rotation,
            fov_y,
            aspect_ratio,
            near: 0.1,
            far,
        }
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// The up direction vector (+Y in camera space).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// The right direction vector (+X in camera space).
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect_ratio = width / height;
        }
    }

    /// Height above the ground in meters.
    pub fn height_meters(&self, params: &AtmosphereParameters) -> f32 {
        params.clamp_height(self.position.y * params.distance_scale)
    }
}

/// Far-plane corners in world space: top-left, top-right, bottom-left, bottom-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumCorners {
    pub camera: Vec3,
    pub corners: [Vec3; 4],
}

impl FrustumCorners {
    pub fn from_camera(camera: &CameraState) -> Self {
        let far = camera.far.max(camera.near);
        let center = camera.position + camera.forward() * far;
        let half_h = far * (camera.fov_y * 0.5).tan();
        let half_w = half_h * camera.aspect_ratio;
        let up = camera.up() * half_h;
        let right = camera.right() * half_w;
        Self {
            camera: camera.position,
            corners: [
                center + up - right,
                center + up + right,
                center - up - right,
                center - up + right,
            ],
        }
    }

    /// Point on the far plane at screen coordinates `u` (right) and `v` (down) in `[0, 1]`.
    pub fn far_point(&self, u: f32, v: f32) -> Vec3 {
        let [tl, tr, bl, br] = self.corners;
        tl.lerp(tr, u).lerp(bl.lerp(br, u), v)
    }

    /// Unit view direction through `(u, v)`.
    pub fn direction(&self, u: f32, v: f32) -> Vec3 {
        (self.far_point(u, v) - self.camera).normalize_or_zero()
    }

    /// Distance from the camera to the far plane through `(u, v)` in scene units.
    pub fn far_distance(&self, u: f32, v: f32) -> f32 {
        (self.far_point(u, v) - self.camera).length()
    }

    /// World position at linear depth fraction `depth` along the pixel ray.
    pub fn world_position(&self, u: f32, v: f32, depth: f32) -> Vec3 {
        self.camera.lerp(self.far_point(u, v), depth)
    }

    pub fn as_array(&self) -> [Vec3; 4] {
        self.corners
    }
}

/// Screen coordinates of the center of pixel `(x, y)`.
pub fn pixel_uv(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width.max(1) as f32,
        (y as f32 + 0.5) / height.max(1) as f32,
    )
}

/// Inscattering and extinction across the current view frustum.
///
/// Column `(x, y)` follows the ray through the center of cell `(x, y)` of a
/// `width * height` screen grid. Slice `k` holds the integral from the camera
/// to `(k + 1) / depth` of the way to the far plane.
#[derive(Clone, Debug, PartialEq)]
pub struct FrustumVolumes {
    pub inscatter: Volume3,
    pub extinction: Volume3,
}

impl FrustumVolumes {
    pub fn build(
        params: &AtmosphereParameters,
        density: &ParticleDensityTable,
        corners: &FrustumCorners,
        camera_height: f32,
        sun_direction: Vec3,
        size: [u32; 3],
        workers: usize,
    ) -> Self {
        let size = size.map(|s| s.max(1) as usize);
        let [w, h, d] = size;
        let slice_samples = (params.sample_count as usize).div_ceil(d).max(1) as u32;

        let cells = dispatch_columns(size, workers, |x, y| {
            let u = (x as f32 + 0.5) / w as f32;
            let v = (y as f32 + 0.5) / h as f32;
            let ray = ViewRay::from_directions(
                camera_height,
                Vec3::Y,
                corners.direction(u, v),
                sun_direction,
            );
            let length = corners.far_distance(u, v) * params.distance_scale;

            let mut column = Vec::with_capacity(d);
            let mut start = 0.0;
            let mut depth = Vec2::ZERO;
            let mut inscatter = Vec3::ZERO;
            for k in 0..d {
                let end = ((k + 1) as f32 / d as f32 * length).min(params.max_ray_length);
                let (segment, next_depth) =
                    integrate_segment(params, density, &ray, start, end, slice_samples, depth);
                inscatter += segment.radiance(params, ray.cos_view_sun);
                column.push((inscatter.extend(1.0), segment.transmittance.extend(1.0)));
                start = end.max(start);
                depth = next_depth;
            }
            column
        });

        let (inscatter, extinction): (Vec<Vec4>, Vec<Vec4>) = cells.into_iter().unzip();
        debug!(size = ?size, "Rebuilt frustum inscattering volume");
        Self {
            inscatter: Volume3::from_cells(size, inscatter),
            extinction: Volume3::from_cells(size, extinction),
        }
    }

    /// `(inscatter, extinction)` at screen `(u, v)` and linear depth fraction.
    ///
    /// In front of the first slice the result fades to no inscatter and full
    /// transmittance at the camera.
    pub fn sample(&self, u: f32, v: f32, depth: f32) -> (Vec3, Vec3) {
        let [w, h, d] = self.inscatter.size();
        let fx = u * w as f32 - 0.5;
        let fy = v * h as f32 - 0.5;
        let iz = depth.clamp(0.0, 1.0) * d as f32 - 1.0;

        if iz < 0.0 {
            let t = iz + 1.0;
            let inscatter = self.inscatter.sample(fx, fy, 0.0).truncate();
            let extinction = self.extinction.sample(fx, fy, 0.0).truncate();
            (Vec3::ZERO.lerp(inscatter, t), Vec3::ONE.lerp(extinction, t))
        } else {
            (
                self.inscatter.sample(fx, fy, iz).truncate(),
                self.extinction.sample(fx, fy, iz).truncate(),
            )
        }
    }
}
