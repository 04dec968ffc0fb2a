//! Telea fast-marching inpainting.
//!
//! Masked pixels are filled in order of their distance from the mask boundary.
//! A min-heap drives the fast marching front; each pixel reached by the front
//! is estimated from already known pixels within `radius`, using a first-order
//! extrapolation `I(q) + ∇I(q)·(p - q)` weighted by direction, geometric
//! distance and level-set distance.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::RgbImage;

use crate::error::Result;
use crate::mask::WatermarkMask;

/// Default neighbourhood radius in pixels.
pub const DEFAULT_RADIUS: u32 = 3;

/// Distance assigned to pixels the front has not reached yet.
const UNREACHED: f32 = 1.0e6;

/// Lower bound for the directional weight so no neighbour is ignored outright.
const MIN_DIRECTION: f32 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Known,
    Band,
    Inside,
}

/// Front entry ordered so that `BinaryHeap` pops the smallest distance first.
#[derive(Debug, Clone, Copy)]
struct FrontPixel {
    t: f32,
    idx: usize,
}

impl PartialEq for FrontPixel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontPixel {}

impl PartialOrd for FrontPixel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontPixel {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

struct Field {
    width: usize,
    height: usize,
    flags: Vec<Flag>,
    dist: Vec<f32>,
    pixels: Vec<[f32; 3]>,
}

impl Field {
    fn new(image: &RgbImage, mask: &WatermarkMask) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let mut flags = Vec::with_capacity(width * height);
        let mut dist = Vec::with_capacity(width * height);
        let mut pixels = Vec::with_capacity(width * height);

        for (x, y, px) in image.enumerate_pixels() {
            let inside = mask.is_masked(x, y);
            flags.push(if inside { Flag::Inside } else { Flag::Known });
            dist.push(if inside { UNREACHED } else { 0.0 });
            pixels.push(px.0.map(f32::from));
        }

        Self {
            width,
            height,
            flags,
            dist,
            pixels,
        }
    }

    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// In-bounds neighbour of `(x, y)` offset by `(dx, dy)`.
    fn offset(&self, x: usize, y: usize, dx: isize, dy: isize) -> Option<(usize, usize)> {
        let nx = x.checked_add_signed(dx)?;
        let ny = y.checked_add_signed(dy)?;
        (nx < self.width && ny < self.height).then_some((nx, ny))
    }

    fn settled(&self, x: usize, y: usize) -> bool {
        self.flags[self.index(x, y)] != Flag::Inside
    }

    /// Known pixels with at least one masked 4-neighbour seed the front.
    fn seed_front(&mut self, heap: &mut BinaryHeap<FrontPixel>) {
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = self.index(x, y);
                if self.flags[idx] != Flag::Known {
                    continue;
                }
                let touches_hole = NEIGHBOURS.iter().any(|&(dx, dy)| {
                    self.offset(x, y, dx, dy)
                        .is_some_and(|(nx, ny)| !self.settled(nx, ny))
                });
                if touches_hole {
                    self.flags[idx] = Flag::Band;
                    heap.push(FrontPixel { t: 0.0, idx });
                }
            }
        }
    }

    /// Eikonal update from two orthogonal neighbours.
    fn solve(&self, a: Option<(usize, usize)>, b: Option<(usize, usize)>) -> f32 {
        let known = |p: Option<(usize, usize)>| {
            p.filter(|&(x, y)| self.settled(x, y))
                .map(|(x, y)| self.dist[self.index(x, y)])
        };
        match (known(a), known(b)) {
            (Some(t1), Some(t2)) => {
                let r = (2.0 - (t1 - t2) * (t1 - t2)).max(0.0).sqrt();
                let s = (t1 + t2 - r) / 2.0;
                if s >= t1 && s >= t2 {
                    s
                } else if s + r >= t1 && s + r >= t2 {
                    s + r
                } else {
                    UNREACHED
                }
            }
            (Some(t), None) | (None, Some(t)) => 1.0 + t,
            (None, None) => UNREACHED,
        }
    }

    fn arrival_time(&self, x: usize, y: usize) -> f32 {
        let left = self.offset(x, y, -1, 0);
        let right = self.offset(x, y, 1, 0);
        let up = self.offset(x, y, 0, -1);
        let down = self.offset(x, y, 0, 1);
        [
            self.solve(up, left),
            self.solve(down, left),
            self.solve(up, right),
            self.solve(down, right),
        ]
        .into_iter()
        .fold(UNREACHED, f32::min)
    }

    /// Central difference where both sides are settled, one-sided otherwise.
    fn gradient<T>(&self, x: usize, y: usize, sample: impl Fn(usize) -> T) -> (T, T)
    where
        T: Copy + Default + std::ops::Sub<Output = T> + std::ops::Div<f32, Output = T>,
    {
        let here = sample(self.index(x, y));
        let axis = |dx: isize, dy: isize| {
            let fwd = self.offset(x, y, dx, dy).filter(|&(nx, ny)| self.settled(nx, ny));
            let back = self.offset(x, y, -dx, -dy).filter(|&(nx, ny)| self.settled(nx, ny));
            match (fwd, back) {
                (Some(f), Some(b)) => {
                    (sample(self.index(f.0, f.1)) - sample(self.index(b.0, b.1))) / 2.0
                }
                (Some(f), None) => (sample(self.index(f.0, f.1)) - here) / 1.0,
                (None, Some(b)) => (here - sample(self.index(b.0, b.1))) / 1.0,
                (None, None) => T::default(),
            }
        };
        (axis(1, 0), axis(0, 1))
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    fn estimate(&self, x: usize, y: usize, radius: usize) -> Option<[f32; 3]> {
        let p = self.index(x, y);
        let (tx, ty) = self.gradient(x, y, |i| self.dist[i]);
        let t_norm = (tx * tx + ty * ty).sqrt();
        let r2 = (radius * radius) as f32;
        let reach = radius as isize;

        let mut sum = [0.0f32; 3];
        let mut total = 0.0f32;

        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let Some((qx, qy)) = self.offset(x, y, dx, dy) else {
                    continue;
                };
                let q = self.index(qx, qy);
                if q == p || self.flags[q] == Flag::Inside {
                    continue;
                }
                // r points from q to p.
                let (rx, ry) = (-dx as f32, -dy as f32);
                let len2 = rx * rx + ry * ry;
                if len2 > r2 {
                    continue;
                }
                let len = len2.sqrt();

                let mut direction = if t_norm > 0.0 {
                    (rx * tx + ry * ty) / (len * t_norm)
                } else {
                    1.0
                };
                if direction.abs() <= MIN_DIRECTION {
                    direction = MIN_DIRECTION;
                }
                let geometric = 1.0 / len2;
                let level = 1.0 / (1.0 + (self.dist[q] - self.dist[p]).abs());
                let w = (direction * geometric * level).abs();

                let (gx, gy) = self.gradient(qx, qy, |i| Rgbf(self.pixels[i]));
                let value = self.pixels[q];
                for ch in 0..3 {
                    sum[ch] += w * (value[ch] + gx.0[ch] * rx + gy.0[ch] * ry);
                }
                total += w;
            }
        }

        (total > 0.0).then(|| sum.map(|s| s / total))
    }

    fn march(&mut self, heap: &mut BinaryHeap<FrontPixel>, radius: usize) {
        while let Some(FrontPixel { idx, .. }) = heap.pop() {
            self.flags[idx] = Flag::Known;
            let (x, y) = (idx % self.width, idx / self.width);

            for &(dx, dy) in &NEIGHBOURS {
                let Some((nx, ny)) = self.offset(x, y, dx, dy) else {
                    continue;
                };
                let n = self.index(nx, ny);
                if self.flags[n] != Flag::Inside {
                    continue;
                }
                self.dist[n] = self.arrival_time(nx, ny);
                if let Some(value) = self.estimate(nx, ny, radius) {
                    self.pixels[n] = value;
                }
                self.flags[n] = Flag::Band;
                heap.push(FrontPixel {
                    t: self.dist[n],
                    idx: n,
                });
            }
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn into_image(self, width: u32, height: u32) -> RgbImage {
        let raw = self
            .pixels
            .iter()
            .flat_map(|px| px.map(|v| v.round().clamp(0.0, 255.0) as u8))
            .collect();
        // Buffer length is width * height * 3 by construction.
        RgbImage::from_raw(width, height, raw).unwrap_or_else(|| RgbImage::new(width, height))
    }
}

const NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Per-channel float triple used for image gradients.
#[derive(Debug, Clone, Copy, Default)]
struct Rgbf([f32; 3]);

impl std::ops::Sub for Rgbf {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self([
            self.0[0] - rhs.0[0],
            self.0[1] - rhs.0[1],
            self.0[2] - rhs.0[2],
        ])
    }
}

impl std::ops::Div<f32> for Rgbf {
    type Output = Self;

    fn div(self, rhs: f32) -> Self {
        Self(self.0.map(|v| v / rhs))
    }
}

/// Fill the masked pixels of `image` using Telea's fast marching method.
///
/// Pixels where the mask is `0` are copied unchanged. `radius` is the
/// neighbourhood sampled for each filled pixel (clamped to at least 1).
/// The result is deterministic for a given image, mask and radius.
///
/// # Errors
///
/// Returns [`Error::MaskSizeMismatch`](crate::Error::MaskSizeMismatch) if the
/// mask and image dimensions differ.
pub fn inpaint_telea(image: &RgbImage, mask: &WatermarkMask, radius: u32) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    if mask.dimensions() != (width, height) {
        return Err(mask.mismatch(width, height));
    }
    if mask.masked_count() == 0 {
        return Ok(image.clone());
    }

    let mut field = Field::new(image, mask);
    let mut heap = BinaryHeap::new();
    field.seed_front(&mut heap);
    field.march(&mut heap, radius.max(1) as usize);

    Ok(field.into_image(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use image::{GrayImage, Luma, Rgb};

    fn square_mask(size: u32, x0: u32, y0: u32, side: u32) -> WatermarkMask {
        WatermarkMask::from_raster(GrayImage::from_fn(size, size, |x, y| {
            let inside = (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        }))
    }

    #[test]
    fn uniform_background_fills_with_background_colour() {
        let mut img = RgbImage::from_pixel(32, 32, Rgb([40, 120, 200]));
        for y in 10..16 {
            for x in 10..16 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let mask = square_mask(32, 10, 10, 6);
        let out = inpaint_telea(&img, &mask, DEFAULT_RADIUS).unwrap();

        for y in 10..16 {
            for x in 10..16 {
                let px = out.get_pixel(x, y);
                for ch in 0..3 {
                    let diff = (i32::from(px[ch]) - i32::from([40, 120, 200][ch])).abs();
                    assert!(diff <= 1, "pixel ({x},{y}) ch {ch} = {}", px[ch]);
                }
            }
        }
    }

    #[test]
    fn unmasked_pixels_are_untouched() {
        #[allow(clippy::cast_possible_truncation)]
        let img = RgbImage::from_fn(24, 24, |x, y| {
            Rgb([(x * 10) as u8, (y * 10) as u8, ((x + y) * 5) as u8])
        });
        let mask = square_mask(24, 8, 8, 5);
        let out = inpaint_telea(&img, &mask, DEFAULT_RADIUS).unwrap();

        for (x, y, px) in out.enumerate_pixels() {
            if !mask.is_masked(x, y) {
                assert_eq!(px, img.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn horizontal_gradient_is_continued_inside_the_hole() {
        let img = RgbImage::from_fn(40, 40, |x, _| {
            #[allow(clippy::cast_possible_truncation)]
            let v = (x * 5) as u8;
            Rgb([v, v, v])
        });
        let mask = square_mask(40, 18, 8, 4);
        let out = inpaint_telea(&img, &mask, 5).unwrap();
        let left = out.get_pixel(18, 9)[0];
        let right = out.get_pixel(21, 9)[0];
        assert!(left < right, "expected left {left} < right {right}");
        assert!((80..=115).contains(&left));
    }

    #[test]
    fn deterministic_for_same_inputs() {
        #[allow(clippy::cast_possible_truncation)]
        let img = RgbImage::from_fn(20, 20, |x, y| {
            Rgb([(x * y) as u8, (x * 7) as u8, (y * 3) as u8])
        });
        let mask = square_mask(20, 4, 6, 7);
        let a = inpaint_telea(&img, &mask, 3).unwrap();
        let b = inpaint_telea(&img, &mask, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_mask_returns_copy() {
        let img = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let mask = WatermarkMask::from_raster(GrayImage::new(8, 8));
        assert_eq!(inpaint_telea(&img, &mask, 3).unwrap(), img);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let img = RgbImage::new(8, 8);
        let mask = WatermarkMask::from_raster(GrayImage::new(4, 8));
        assert!(matches!(
            inpaint_telea(&img, &mask, 3),
            Err(Error::MaskSizeMismatch { mask_width: 4, .. })
        ));
    }
}
