//! Tone mapping and PNG export of the final frame.

use std::path::Path;

use glam::Vec3;
use image::{Rgb, RgbImage};
use nebula_atmosphere::ColorBuffer;

/// Exposure applied before the Reinhard curve.
pub const EXPOSURE: f32 = 1.5;

/// Map linear HDR color to 8-bit sRGB-ish values.
pub fn tonemap(color: Vec3) -> [u8; 3] {
    let exposed = (color * EXPOSURE).max(Vec3::ZERO);
    let mapped = exposed / (exposed + Vec3::ONE);
    let encoded = mapped.powf(1.0 / 2.2);
    (encoded * 255.0 + Vec3::splat(0.5))
        .clamp(Vec3::ZERO, Vec3::splat(255.0))
        .to_array()
        .map(|c| c as u8)
}

pub fn to_image(color: &ColorBuffer) -> RgbImage {
    let (width, height) = color.size();
    RgbImage::from_fn(width, height, |x, y| {
        Rgb(tonemap(color.get(x as i64, y as i64)))
    })
}

/// Write `color` as a PNG, creating parent directories.
pub fn save_png(color: &ColorBuffer, path: &Path) -> Result<(), crate::DemoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    to_image(color).save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tonemap_bounds() {
        assert_eq!(tonemap(Vec3::ZERO), [0, 0, 0]);
        let bright = tonemap(Vec3::splat(1e6));
        assert_eq!(bright, [255, 255, 255]);
        let [r, g, b] = tonemap(Vec3::new(0.1, 0.2, 0.4));
        assert!(r < g && g < b);
    }

    #[test]
    fn test_save_png_round_trip_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames").join("sky.png");
        let color = ColorBuffer::filled(5, 3, Vec3::new(0.2, 0.4, 0.8));
        save_png(&color, &path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (5, 3));
        assert_eq!(loaded.get_pixel(2, 1).0, tonemap(Vec3::new(0.2, 0.4, 0.8)));
    }
}
