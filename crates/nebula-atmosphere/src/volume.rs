//! Dense RGBA 3D grids with trilinear sampling.

use glam::Vec4;

/// A `[width, height, depth]` grid of RGBA cells, x fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume3 {
    size: [usize; 3],
    cells: Vec<Vec4>,
}

impl Volume3 {
    /// Wrap cells produced by [`dispatch_3d`](crate::dispatch::dispatch_3d).
    ///
    /// Missing cells are filled with zero so the grid is always complete.
    pub fn from_cells(size: [usize; 3], mut cells: Vec<Vec4>) -> Self {
        let size = size.map(|s| s.max(1));
        cells.resize(size[0] * size[1] * size[2], Vec4::ZERO);
        Self { size, cells }
    }

    pub fn filled(size: [usize; 3], value: Vec4) -> Self {
        let size = size.map(|s| s.max(1));
        Self {
            size,
            cells: vec![value; size[0] * size[1] * size[2]],
        }
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn cells(&self) -> &[Vec4] {
        &self.cells
    }

    /// Cell at integer coordinates, clamped to the grid.
    pub fn cell(&self, x: usize, y: usize, z: usize) -> Vec4 {
        let [w, h, d] = self.size;
        let (x, y, z) = (x.min(w - 1), y.min(h - 1), z.min(d - 1));
        self.cells[(z * h + y) * w + x]
    }

    /// Trilinear sample at continuous cell coordinates. Coordinates are
    /// clamped to `[0, size - 1]` on every axis.
    pub fn sample(&self, fx: f32, fy: f32, fz: f32) -> Vec4 {
        let (x0, tx) = split(fx, self.size[0]);
        let (y0, ty) = split(fy, self.size[1]);
        let (z0, tz) = split(fz, self.size[2]);

        let plane = |z: usize| {
            let a = self.cell(x0, y0, z).lerp(self.cell(x0 + 1, y0, z), tx);
            let b = self.cell(x0, y0 + 1, z).lerp(self.cell(x0 + 1, y0 + 1, z), tx);
            a.lerp(b, ty)
        };
        plane(z0).lerp(plane(z0 + 1), tz)
    }

    /// Trilinear sample at normalized coordinates where `0` and `1` hit the
    /// first and last grid points.
    pub fn sample_normalized(&self, u: f32, v: f32, w: f32) -> Vec4 {
        let [sx, sy, sz] = self.size;
        self.sample(
            u * (sx - 1) as f32,
            v * (sy - 1) as f32,
            w * (sz - 1) as f32,
        )
    }
}

fn split(coord: f32, size: usize) -> (usize, f32) {
    let max = (size - 1) as f32;
    let c = if coord.is_nan() { 0.0 } else { coord.clamp(0.0, max) };
    let i = c.floor();
    (i as usize, c - i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::dispatch_3d;

    fn ramp() -> Volume3 {
        let size = [4, 3, 2];
        let cells = dispatch_3d(size, 2, |x, y, z| {
            Vec4::new(x as f32, y as f32, z as f32, (x + y + z) as f32)
        });
        Volume3::from_cells(size, cells)
    }

    #[test]
    fn test_cell_indexing() {
        let volume = ramp();
        assert_eq!(volume.cell(3, 2, 1), Vec4::new(3.0, 2.0, 1.0, 6.0));
        assert_eq!(volume.cell(9, 9, 9), volume.cell(3, 2, 1));
    }

    #[test]
    fn test_trilinear_reproduces_linear_field() {
        let volume = ramp();
        let s = volume.sample(1.25, 0.5, 0.75);
        assert!((s - Vec4::new(1.25, 0.5, 0.75, 2.5)).abs().max_element() < 1e-5, "{s:?}");
    }

    #[test]
    fn test_sample_clamps() {
        let volume = ramp();
        assert_eq!(volume.sample(-3.0, -1.0, -2.0), volume.cell(0, 0, 0));
        assert_eq!(volume.sample(10.0, 10.0, 10.0), volume.cell(3, 2, 1));
        assert_eq!(volume.sample(f32::NAN, 0.0, 0.0), volume.cell(0, 0, 0));
    }

    #[test]
    fn test_normalized_endpoints() {
        let volume = ramp();
        assert_eq!(volume.sample_normalized(1.0, 1.0, 1.0), volume.cell(3, 2, 1));
        assert_eq!(volume.sample_normalized(0.0, 0.0, 0.0), volume.cell(0, 0, 0));
    }

    #[test]
    fn test_short_cell_list_is_padded() {
        let volume = Volume3::from_cells([2, 2, 2], vec![Vec4::ONE; 3]);
        assert_eq!(volume.cells().len(), 8);
        assert_eq!(volume.cell(1, 1, 1), Vec4::ZERO);
    }
}
