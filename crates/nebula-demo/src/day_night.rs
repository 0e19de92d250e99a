//! In-game clock driving the sun across the sky.
//!
//! Time of day is normalized to `[0.0, 1.0)`: 0.0 is midnight, 0.25 dawn,
//! 0.5 noon and 0.75 dusk. The sun rises toward -Z, in front of the demo camera.

use glam::Vec3;
use nebula_atmosphere::SceneLighting;

/// In-game time tracking for the day/night cycle.
#[derive(Clone, Debug)]
pub struct DayNightClock {
    /// Current time of day, normalized `[0.0, 1.0)`.
    pub time_of_day: f64,
    /// Duration of one full day in simulated seconds.
    pub day_duration_seconds: f64,
    pub paused: bool,
}

impl DayNightClock {
    pub fn new(time_of_day: f64, day_duration_seconds: f64) -> Self {
        Self {
            time_of_day: time_of_day.rem_euclid(1.0),
            day_duration_seconds: day_duration_seconds.max(f64::EPSILON),
            paused: false,
        }
    }

    /// Advance the clock by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        if self.paused {
            return;
        }
        let day_fraction = dt / self.day_duration_seconds;
        self.time_of_day = (self.time_of_day + day_fraction).rem_euclid(1.0);
    }

    /// Convert time-of-day to hours (0-24 range).
    pub fn hours(&self) -> f64 {
        self.time_of_day * 24.0
    }

    /// Unit vector from the scene toward the sun.
    pub fn sun_direction(&self) -> Vec3 {
        sun_direction_from_time(self.time_of_day)
    }

    /// Point the scene's sun light at the current sun position.
    pub fn apply(&self, lighting: &mut SceneLighting) {
        lighting.sun.set_direction(-self.sun_direction());
    }
}

/// Sun direction for a normalized time of day.
///
/// The sun orbits in a plane tilted slightly off the YZ plane so that it
/// never passes exactly through the zenith.
pub fn sun_direction_from_time(time_of_day: f64) -> Vec3 {
    let angle = (time_of_day as f32) * std::f32::consts::TAU;
    Vec3::new(0.2, -angle.cos(), -angle.sin()).normalize()
}
