//! Skybox reflection probe: a six-face cubemap of the sky.

use glam::Vec3;
use nebula_config::snap_probe_resolution;
use tracing::info;

use crate::buffer::ColorBuffer;
use crate::model::ViewRay;
use crate::params::AtmosphereParameters;
use crate::skybox::{SkyboxVolumes, SunDisc};

/// Cube faces in the usual +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// World direction through face coordinates `s`, `t` in `[-1, 1]`.
    pub fn direction(self, s: f32, t: f32) -> Vec3 {
        let d = match self {
            CubeFace::PositiveX => Vec3::new(1.0, -t, -s),
            CubeFace::NegativeX => Vec3::new(-1.0, -t, s),
            CubeFace::PositiveY => Vec3::new(s, 1.0, t),
            CubeFace::NegativeY => Vec3::new(s, -1.0, -t),
            CubeFace::PositiveZ => Vec3::new(s, -t, 1.0),
            CubeFace::NegativeZ => Vec3::new(-s, -t, -1.0),
        };
        d.normalize()
    }
}

/// Cubemap of the skybox around the camera.
pub struct ReflectionProbe {
    resolution: u32,
    faces: Vec<ColorBuffer>,
    refreshes: u64,
}

impl ReflectionProbe {
    /// Allocate a probe. The resolution is snapped to a supported size.
    pub fn new(resolution: u32) -> Self {
        let resolution = snap_probe_resolution(resolution);
        Self {
            resolution,
            faces: allocate_faces(resolution),
            refreshes: 0,
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Change face resolution in place. Returns `true` if the faces were reallocated.
    pub fn resize(&mut self, resolution: u32) -> bool {
        let resolution = snap_probe_resolution(resolution);
        if resolution == self.resolution {
            return false;
        }
        info!(from = self.resolution, to = resolution, "Resizing reflection probe");
        self.resolution = resolution;
        self.faces = allocate_faces(resolution);
        true
    }

    pub fn face(&self, face: CubeFace) -> &ColorBuffer {
        &self.faces[face as usize]
    }

    /// Number of completed refreshes.
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    /// Redraw all faces from the skybox as seen from `camera_height`.
    pub fn refresh(
        &mut self,
        params: &AtmosphereParameters,
        skybox: &SkyboxVolumes,
        camera_height: f32,
        sun_direction: Vec3,
        sun_disc: SunDisc,
        workers: usize,
    ) {
        let n = self.resolution;
        for face in CubeFace::ALL {
            self.faces[face as usize] = ColorBuffer::from_fn(n, n, workers, |x, y| {
                let s = (x as f32 + 0.5) / n as f32 * 2.0 - 1.0;
                let t = (y as f32 + 0.5) / n as f32 * 2.0 - 1.0;
                let ray = ViewRay::from_directions(
                    camera_height,
                    Vec3::Y,
                    face.direction(s, t),
                    sun_direction,
                );
                skybox.sky_color(params, &ray, sun_disc)
            });
        }
        self.refreshes += 1;
    }
}

fn allocate_faces(resolution: u32) -> Vec<ColorBuffer> {
    (0..6).map(|_| ColorBuffer::new(resolution, resolution)).collect()
}
