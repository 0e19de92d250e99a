//! Fixed random tables: Monte-Carlo sample directions and the dither matrix.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed for [`RandomDirectionTable`]. Fixed so ambient tables are reproducible.
pub const RANDOM_DIRECTION_SEED: u64 = 1_234_567_890;

/// Number of sample directions.
pub const RANDOM_DIRECTION_COUNT: usize = 256;

/// Uniformly distributed unit vectors on the sphere.
#[derive(Clone, Debug, PartialEq)]
pub struct RandomDirectionTable {
    directions: Vec<Vec3>,
}

impl RandomDirectionTable {
    /// Generate [`RANDOM_DIRECTION_COUNT`] directions from [`RANDOM_DIRECTION_SEED`].
    pub fn new() -> Self {
        Self::with_seed(RANDOM_DIRECTION_SEED, RANDOM_DIRECTION_COUNT)
    }

    pub fn with_seed(seed: u64, count: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let directions = (0..count)
            .map(|_| {
                // Archimedes: uniform z and azimuth give a uniform sphere.
                let z = 1.0 - 2.0 * rng.random::<f32>();
                let phi = std::f32::consts::TAU * rng.random::<f32>();
                let r = (1.0 - z * z).max(0.0).sqrt();
                Vec3::new(r * phi.cos(), z, r * phi.sin())
            })
            .collect();
        Self { directions }
    }

    pub fn directions(&self) -> &[Vec3] {
        &self.directions
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }
}

impl Default for RandomDirectionTable {
    fn default() -> Self {
        Self::new()
    }
}

const BAYER_8X8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// 8x8 ordered dither thresholds in `(0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DitherPattern {
    thresholds: [[f32; 8]; 8],
}

impl DitherPattern {
    pub const SIZE: usize = 8;

    pub fn new() -> Self {
        let thresholds = BAYER_8X8.map(|row| row.map(|b| (b as f32 + 0.5) / 64.0));
        Self { thresholds }
    }

    /// Threshold for a pixel; the pattern tiles across the screen.
    pub fn threshold(&self, x: u32, y: u32) -> f32 {
        self.thresholds[y as usize % Self::SIZE][x as usize % Self::SIZE]
    }
}

impl Default for DitherPattern {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directions_are_unit_length() {
        let table = RandomDirectionTable::new();
        assert_eq!(table.len(), 256);
        for d in table.directions() {
            assert!((d.length() - 1.0).abs() < 1e-4, "not unit: {d:?}");
        }
    }

    #[test]
    fn test_directions_are_deterministic() {
        assert_eq!(RandomDirectionTable::new(), RandomDirectionTable::new());
        assert_ne!(
            RandomDirectionTable::new(),
            RandomDirectionTable::with_seed(7, RANDOM_DIRECTION_COUNT)
        );
    }

    #[test]
    fn test_directions_cover_sphere() {
        let table = RandomDirectionTable::new();
        let mean: Vec3 = table.directions().iter().copied().sum::<Vec3>() / table.len() as f32;
        assert!(mean.length() < 0.2, "directions biased: mean {mean:?}");
        let upper = table.directions().iter().filter(|d| d.y > 0.0).count();
        assert!((96..=160).contains(&upper), "upper hemisphere count {upper}");
    }

    #[test]
    fn test_dither_thresholds_unique_and_bounded() {
        let dither = DitherPattern::new();
        let mut values: Vec<f32> = (0..8)
            .flat_map(|y| (0..8).map(move |x| (x, y)))
            .map(|(x, y)| dither.threshold(x, y))
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        assert_eq!(values.len(), 64);
        assert!(values[0] > 0.0 && values[63] < 1.0);
    }

    #[test]
    fn test_dither_tiles() {
        let dither = DitherPattern::new();
        assert_eq!(dither.threshold(3, 5), dither.threshold(11, 13));
    }
}
