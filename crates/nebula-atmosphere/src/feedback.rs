//! Feeds light table colors back into the scene's sun and ambient light.

use glam::Vec3;
use nebula_config::LightingConfig;

use crate::light_table::LightColorTables;

/// Lowest value any light color channel or intensity is pushed down to.
pub const LIGHT_FLOOR: f32 = 0.01;

/// Scene lighting the feedback loop reads and writes.
pub trait LightingState {
    /// Direction the sun light points, from the sun toward the scene.
    fn sun_forward(&self) -> Vec3;

    fn set_sun_light(&mut self, color: Vec3, intensity: f32);

    fn set_ambient_light(&mut self, color: Vec3, intensity: f32);
}

/// Sun-like directional light.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Normalized direction pointing FROM the light (toward the surface).
    pub direction: Vec3,
    /// Color, not premultiplied by intensity.
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

impl DirectionalLight {
    /// Set the light direction, normalizing the input. Zero vectors are ignored.
    pub fn set_direction(&mut self, dir: Vec3) {
        if let Some(dir) = dir.try_normalize() {
            self.direction = dir;
        }
    }

    /// Unit vector from the scene toward the sun.
    pub fn toward_sun(&self) -> Vec3 {
        -self.direction
    }
}

/// Flat ambient term of the scene.
#[derive(Clone, Debug, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Vec3::splat(0.2),
            intensity: 1.0,
        }
    }
}

/// Simple host-side light state: one sun plus ambient.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneLighting {
    pub sun: DirectionalLight,
    pub ambient: AmbientLight,
}

impl LightingState for SceneLighting {
    fn sun_forward(&self) -> Vec3 {
        self.sun.direction
    }

    fn set_sun_light(&mut self, color: Vec3, intensity: f32) {
        self.sun.color = color;
        self.sun.intensity = intensity;
    }

    fn set_ambient_light(&mut self, color: Vec3, intensity: f32) {
        self.ambient.color = color;
        self.ambient.intensity = intensity;
    }
}

/// Split a table color into a unit-length color and its magnitude.
///
/// Channels are floored at [`LIGHT_FLOOR`] so the light never goes fully
/// black; a near-zero input yields a neutral grey.
pub fn split_color(color: Vec3) -> (Vec3, f32) {
    let length = color.length();
    let unit = if length > 1e-6 {
        color / length
    } else {
        Vec3::splat(1.0 / 3f32.sqrt())
    };
    (unit.max(Vec3::splat(LIGHT_FLOOR)), length.max(LIGHT_FLOOR))
}

/// Values pushed to the scene in one feedback step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeedbackSample {
    pub cos_sun_zenith: f32,
    pub sun: Option<(Vec3, f32)>,
    pub ambient: Option<(Vec3, f32)>,
}

/// Recolors the scene's sun and ambient light from the light tables.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackLightingUpdater {
    pub update_light_color: bool,
    pub light_color_intensity: f32,
    pub update_ambient_color: bool,
    pub ambient_color_intensity: f32,
}

impl FeedbackLightingUpdater {
    pub fn from_config(config: &LightingConfig) -> Self {
        Self {
            update_light_color: config.update_light_color,
            light_color_intensity: config.light_color_intensity.clamp(0.5, 3.0),
            update_ambient_color: config.update_ambient_color,
            ambient_color_intensity: config.ambient_color_intensity.clamp(0.5, 3.0),
        }
    }

    /// Sample both tables at the current sun angle and write the enabled lights.
    pub fn apply(
        &self,
        tables: &LightColorTables,
        lighting: &mut dyn LightingState,
    ) -> FeedbackSample {
        let forward = lighting.sun_forward();
        let cos_sun_zenith = Vec3::Y.dot(-forward.normalize_or_zero());

        let sun = self.update_light_color.then(|| {
            let (color, length) = split_color(tables.directional.sample(cos_sun_zenith));
            let intensity = length * self.light_color_intensity;
            lighting.set_sun_light(color, intensity);
            (color, intensity)
        });

        let ambient = self.update_ambient_color.then(|| {
            let (color, length) = split_color(tables.ambient.sample(cos_sun_zenith));
            let intensity = length * self.ambient_color_intensity;
            lighting.set_ambient_light(color, intensity);
            (color, intensity)
        });

        FeedbackSample {
            cos_sun_zenith,
            sun,
            ambient,
        }
    }
}
