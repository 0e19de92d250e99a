//! Data-parallel kernel dispatch over 1D, 2D and 3D grids.
//!
//! A kernel is a pure function of its cell coordinate. Work is split into
//! contiguous row ranges across scoped worker threads and written straight
//! into the output buffer, so results are identical for any thread count.

use std::thread;

/// Number of worker threads used when the caller does not specify one.
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Evaluate `kernel` for every index in `0..len`.
pub fn dispatch_1d<T, F>(len: usize, workers: usize, kernel: F) -> Vec<T>
where
    T: Send + Default + Clone,
    F: Fn(usize) -> T + Sync,
{
    let mut out = vec![T::default(); len];
    if len == 0 {
        return out;
    }
    let workers = workers.clamp(1, len);
    let chunk = len.div_ceil(workers);

    if workers == 1 {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = kernel(i);
        }
        return out;
    }

    let kernel = &kernel;
    thread::scope(|scope| {
        for (c, slice) in out.chunks_mut(chunk).enumerate() {
            scope.spawn(move || {
                let base = c * chunk;
                for (i, slot) in slice.iter_mut().enumerate() {
                    *slot = kernel(base + i);
                }
            });
        }
    });
    out
}

/// Evaluate `kernel(x, y)` over a `width * height` grid, row-major.
pub fn dispatch_2d<T, F>(width: usize, height: usize, workers: usize, kernel: F) -> Vec<T>
where
    T: Send + Default + Clone,
    F: Fn(usize, usize) -> T + Sync,
{
    if width == 0 {
        return Vec::new();
    }
    dispatch_1d(width * height, workers, |i| kernel(i % width, i / width))
}

/// Evaluate `kernel(x, y, z)` over a `[w, h, d]` grid, x fastest.
pub fn dispatch_3d<T, F>(size: [usize; 3], workers: usize, kernel: F) -> Vec<T>
where
    T: Send + Default + Clone,
    F: Fn(usize, usize, usize) -> T + Sync,
{
    let [w, h, d] = size;
    if w == 0 || h == 0 {
        return Vec::new();
    }
    dispatch_1d(w * h * d, workers, |i| {
        let x = i % w;
        let y = (i / w) % h;
        let z = i / (w * h);
        kernel(x, y, z)
    })
}

/// Evaluate `column(x, y)` for every column of a `[w, h, d]` grid and
/// scatter the `d` returned cells into x-fastest order.
///
/// Used when each column is integrated cumulatively front to back.
pub fn dispatch_columns<T, F>(size: [usize; 3], workers: usize, column: F) -> Vec<T>
where
    T: Send + Default + Clone,
    F: Fn(usize, usize) -> Vec<T> + Sync,
{
    let [w, h, d] = size;
    let columns = dispatch_2d(w, h, workers, |x, y| column(x, y));
    let mut out = vec![T::default(); w * h * d];
    for (c, cells) in columns.into_iter().enumerate() {
        for (z, cell) in cells.into_iter().take(d).enumerate() {
            out[z * w * h + c] = cell;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_1d_matches_serial() {
        let serial: Vec<u64> = (0..1000u64).map(|i| i * i).collect();
        for workers in [1, 2, 3, 7, 64] {
            let parallel = dispatch_1d(1000, workers, |i| (i as u64) * (i as u64));
            assert_eq!(parallel, serial, "workers={workers}");
        }
    }

    #[test]
    fn test_2d_is_row_major() {
        let out = dispatch_2d(3, 2, 4, |x, y| (x, y));
        assert_eq!(out, vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_3d_is_x_fastest() {
        let out = dispatch_3d([2, 2, 2], 3, |x, y, z| x + 10 * y + 100 * z);
        assert_eq!(out, vec![0, 1, 10, 11, 100, 101, 110, 111]);
    }

    #[test]
    fn test_columns_scatter_to_slices() {
        let out = dispatch_columns([2, 1, 3], 2, |x, _| vec![x, x + 10, x + 20]);
        assert_eq!(out, vec![0, 1, 10, 11, 20, 21]);
    }

    #[test]
    fn test_empty_extent() {
        assert!(dispatch_1d::<f32, _>(0, 4, |_| 1.0).is_empty());
        assert!(dispatch_2d::<f32, _>(0, 4, 4, |_, _| 1.0).is_empty());
    }

    #[test]
    fn test_default_workers_positive() {
        assert!(default_workers() >= 1);
    }
}
