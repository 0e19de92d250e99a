//! Screen-space buffers used by the light shaft chain and the fog composite.

use glam::{Vec2, Vec3, Vec4};

use crate::dispatch::dispatch_2d;

/// A cell type that can be linearly blended.
pub trait Texel: Copy + Default + Send + Sync {
    fn mix(a: Self, b: Self, t: f32) -> Self;
}

impl Texel for f32 {
    fn mix(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }
}

impl Texel for Vec2 {
    fn mix(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

impl Texel for Vec3 {
    fn mix(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

impl Texel for Vec4 {
    fn mix(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

/// A row-major 2D buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Buffer2d<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

/// Linear depth fraction per pixel. `>= 1` marks sky.
pub type DepthBuffer = Buffer2d<f32>;
/// Linear HDR color per pixel.
pub type ColorBuffer = Buffer2d<Vec3>;

impl<T: Texel> Buffer2d<T> {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, T::default())
    }

    pub fn filled(width: u32, height: u32, value: T) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            data: vec![value; (width * height) as usize],
        }
    }

    /// Evaluate `f(x, y)` for every pixel in parallel.
    pub fn from_fn<F>(width: u32, height: u32, workers: usize, f: F) -> Self
    where
        F: Fn(u32, u32) -> T + Sync,
    {
        let (width, height) = (width.max(1), height.max(1));
        let data = dispatch_2d(width as usize, height as usize, workers, |x, y| {
            f(x as u32, y as u32)
        });
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Pixel at `(x, y)` with coordinates clamped to the edges.
    pub fn get(&self, x: i64, y: i64) -> T {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.data[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: T) {
        if x < self.width && y < self.height {
            self.data[(y * self.width + x) as usize] = value;
        }
    }

    /// Bilinear sample at normalized coordinates with clamp-to-edge.
    pub fn sample_bilinear(&self, u: f32, v: f32) -> T {
        let fx = u * self.width as f32 - 0.5;
        let fy = v * self.height as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = (fx - x0).clamp(0.0, 1.0);
        let ty = (fy - y0).clamp(0.0, 1.0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = T::mix(self.get(x0, y0), self.get(x0 + 1, y0), tx);
        let bottom = T::mix(self.get(x0, y0 + 1), self.get(x0 + 1, y0 + 1), tx);
        T::mix(top, bottom, ty)
    }

    /// Map every pixel through `f`.
    pub fn map<U: Texel>(&self, f: impl Fn(T) -> U) -> Buffer2d<U> {
        Buffer2d {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

impl DepthBuffer {
    /// Half-resolution depth keeping the farthest of each 2x2 block.
    pub fn downsample_max(&self) -> Self {
        let w = self.width.div_ceil(2);
        let h = self.height.div_ceil(2);
        let mut out = Self::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let (sx, sy) = (x as i64 * 2, y as i64 * 2);
                let d = self
                    .get(sx, sy)
                    .max(self.get(sx + 1, sy))
                    .max(self.get(sx, sy + 1))
                    .max(self.get(sx + 1, sy + 1));
                out.set(x, y, d);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_clamps_to_edges() {
        let buffer = Buffer2d::from_fn(3, 2, 2, |x, y| (x + 10 * y) as f32);
        assert_eq!(buffer.get(-5, 0), 0.0);
        assert_eq!(buffer.get(9, 9), 12.0);
        assert_eq!(buffer.get(1, 1), 11.0);
    }

    #[test]
    fn test_bilinear_at_pixel_centers() {
        let buffer = Buffer2d::from_fn(4, 4, 1, |x, y| (x + 4 * y) as f32);
        assert_eq!(buffer.sample_bilinear(0.125, 0.125), 0.0);
        assert_eq!(buffer.sample_bilinear(0.375, 0.125), 1.0);
        // Halfway between two centers.
        assert!((buffer.sample_bilinear(0.25, 0.125) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_set_out_of_range_is_ignored() {
        let mut buffer = DepthBuffer::new(2, 2);
        buffer.set(5, 5, 1.0);
        assert!(buffer.data().iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_downsample_keeps_far_depth() {
        let buffer = Buffer2d::from_fn(4, 2, 1, |x, _| if x == 1 { 1.0 } else { 0.25 });
        let half = buffer.downsample_max();
        assert_eq!(half.size(), (2, 1));
        assert_eq!(half.get(0, 0), 1.0);
        assert_eq!(half.get(1, 0), 0.25);
    }

    #[test]
    fn test_zero_size_becomes_one_pixel() {
        let buffer = ColorBuffer::new(0, 0);
        assert_eq!(buffer.size(), (1, 1));
    }
}
