//! Precomputed optical depth over (height, view zenith).

use glam::Vec2;

use crate::dispatch::dispatch_2d;
use crate::model::{OpticalDepthSource, optical_depth};
use crate::params::AtmosphereParameters;

/// 2D table of `(rayleigh, mie)` optical depth toward the top of the atmosphere.
///
/// Column `x` covers height `x / (width - 1) * atmosphere_height`, row `y`
/// covers zenith cosine `y / (height - 1) * 2 - 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleDensityTable {
    width: usize,
    height: usize,
    atmosphere_height: f32,
    cells: Vec<Vec2>,
}

impl ParticleDensityTable {
    /// Integrate every cell. Cells are independent and run in parallel.
    pub fn build(params: &AtmosphereParameters, size: u32, steps: u32, workers: usize) -> Self {
        let n = size.max(2) as usize;
        let last = (n - 1) as f32;
        let cells = dispatch_2d(n, n, workers, |x, y| {
            let h = x as f32 / last * params.atmosphere_height;
            let cos = y as f32 / last * 2.0 - 1.0;
            optical_depth(params, h, cos, steps)
        });
        Self {
            width: n,
            height: n,
            atmosphere_height: params.atmosphere_height,
            cells,
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Raw cell at `(x, y)`, clamped to the grid.
    pub fn cell(&self, x: usize, y: usize) -> Vec2 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.cells[y * self.width + x]
    }

    /// Bilinearly interpolated optical depth. Inputs outside the table are clamped.
    pub fn sample(&self, height: f32, cos_zenith: f32) -> Vec2 {
        let u = if height.is_nan() {
            0.0
        } else {
            (height / self.atmosphere_height).clamp(0.0, 1.0)
        };
        let v = if cos_zenith.is_nan() {
            1.0
        } else {
            (cos_zenith.clamp(-1.0, 1.0) + 1.0) * 0.5
        };

        let fx = u * (self.width - 1) as f32;
        let fy = v * (self.height - 1) as f32;
        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let top = self.cell(x0, y0).lerp(self.cell(x0 + 1, y0), tx);
        let bottom = self.cell(x0, y0 + 1).lerp(self.cell(x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }
}

impl OpticalDepthSource for ParticleDensityTable {
    fn optical_depth(&self, height: f32, cos_zenith: f32) -> Vec2 {
        self.sample(height, cos_zenith)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OPAQUE_OPTICAL_DEPTH;

    fn table() -> (AtmosphereParameters, ParticleDensityTable) {
        let params = AtmosphereParameters::default();
        let table = ParticleDensityTable::build(&params, 33, 32, 4);
        (params, table)
    }

    #[test]
    fn test_cells_match_analytic_integral() {
        let (params, table) = table();
        for &(x, y) in &[(0, 32), (16, 24), (32, 20), (4, 17)] {
            let h = x as f32 / 32.0 * params.atmosphere_height;
            let cos = y as f32 / 32.0 * 2.0 - 1.0;
            let expected = optical_depth(&params, h, cos, 32);
            assert_eq!(table.cell(x, y), expected, "cell ({x}, {y})");
        }
    }

    #[test]
    fn test_sample_hits_grid_points_exactly() {
        let (params, table) = table();
        let sample = table.sample(params.atmosphere_height * 0.5, 0.5);
        assert!((sample - table.cell(16, 24)).abs().max_element() < 1e-2);
    }

    #[test]
    fn test_sample_clamps_out_of_range_inputs() {
        let (params, table) = table();
        assert_eq!(table.sample(-500.0, 1.0), table.sample(0.0, 1.0));
        assert_eq!(
            table.sample(params.atmosphere_height * 3.0, 2.0),
            table.sample(params.atmosphere_height, 1.0)
        );
        assert!(table.sample(f32::NAN, f32::NAN).is_finite());
    }

    #[test]
    fn test_downward_rows_are_opaque_at_ground() {
        let (_, table) = table();
        assert_eq!(table.cell(0, 0), Vec2::splat(OPAQUE_OPTICAL_DEPTH));
    }

    #[test]
    fn test_interpolation_is_continuous() {
        let (_, table) = table();
        let base = table.sample(20_000.0, 0.4);
        let mut previous_error = f32::MAX;
        for eps in [1e-2, 1e-3, 1e-4] {
            let nearby = table.sample(20_000.0, 0.4 + eps);
            let error = (nearby - base).abs().max_element();
            assert!(error <= previous_error + 1e-3, "eps={eps}: {error}");
            previous_error = error;
        }
        assert!(previous_error < 5.0, "residual {previous_error}");
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let params = AtmosphereParameters::default();
        let a = ParticleDensityTable::build(&params, 17, 16, 1);
        let b = ParticleDensityTable::build(&params, 17, 16, 8);
        assert_eq!(a, b);
    }
}
