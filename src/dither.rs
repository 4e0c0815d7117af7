//! Contains the dither implementation.

use crate::{AboveMaxLen, Error, ImageBuf, MAX_K};
use palette::{Srgb, Srgba};

/// Floyd–Steinberg error diffusion dithering.
///
/// Pixels are visited from the last row to the first, left to right within each row.
/// Each pixel is mapped to its nearest palette color and the difference is pushed into the
/// neighbors that have not been visited yet: `7/16` to the east, and `3/16`, `5/16` and `1/16`
/// to the south-west, south and south-east, where "south" is the next row to be visited
/// (the row above in the image). Neighbors outside the image are skipped.
///
/// The pass writes the diffused error back into the pixel buffer, so it is strictly sequential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloydSteinberg;

/// The error diffusion targets as `(dx, dy, weight / 16)`, relative to the current pixel.
///
/// `dy = -1` is the next row of the sweep.
pub(crate) const NEIGHBORS: [(isize, isize, u8); 4] = [(1, 0, 7), (-1, -1, 3), (0, -1, 5), (1, -1, 1)];

/// Squared euclidean distance between two colors.
#[inline]
fn squared_distance(x: [u8; 3], y: [u8; 3]) -> u32 {
    let mut dist = 0;
    for c in 0..3 {
        let d = i32::from(x[c]) - i32::from(y[c]);
        dist += d.unsigned_abs() * d.unsigned_abs();
    }
    dist
}

/// Returns the index of the palette color nearest to `color`.
///
/// Ties go to the lowest index.
#[allow(clippy::cast_possible_truncation)]
#[inline]
fn nearest(palette: &[[u8; 3]], color: [u8; 3]) -> u8 {
    let mut nearest = 0;
    let mut min_dist = u32::MAX;
    for (i, &p) in palette.iter().enumerate() {
        let dist = squared_distance(p, color);
        if dist < min_dist {
            min_dist = dist;
            nearest = i;
        }
    }
    nearest as u8
}

/// Adds `weight / 16` of `error` to `pixel`, clamping and rounding to the nearest 8-bit value.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[inline]
fn diffuse(pixel: &mut Srgba<u8>, error: [i16; 3], weight: u8) {
    let weight = f32::from(weight) / 16.0;
    let add = |c: u8, e: i16| (f32::from(c) + f32::from(e) * weight).clamp(0.0, 255.0).round_ties_even() as u8;
    pixel.red = add(pixel.red, error[0]);
    pixel.green = add(pixel.green, error[1]);
    pixel.blue = add(pixel.blue, error[2]);
}

impl FloydSteinberg {
    /// Creates a new [`FloydSteinberg`].
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Maps every pixel to a palette index, diffusing the error through `pixels`.
    ///
    /// `pixels` is row-major, top to bottom, and is used as scratch space: on return it holds
    /// the error-adjusted colors that were matched against the palette.
    /// The returned buffer has one index per pixel, in the same order as `pixels`.
    ///
    /// # Errors
    /// Fails if `palette` is empty or longer than [`MAX_COLORS`](crate::MAX_COLORS),
    /// or if `pixels` does not hold `width * height` pixels.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn dither(
        &self,
        palette: &[Srgb<u8>],
        pixels: &mut [Srgba<u8>],
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, Error> {
        if palette.is_empty() {
            return Err(Error::EmptyPalette);
        }
        if palette.len() > MAX_K {
            return Err(AboveMaxLen(MAX_K as u32).into());
        }
        if pixels.len() as u64 != u64::from(width) * u64::from(height) {
            return Err(Error::InvalidImage { width, height, len: pixels.len() });
        }

        let palette = palette
            .iter()
            .map(|c| [c.red, c.green, c.blue])
            .collect::<Vec<_>>();

        let width = width as usize;
        let height = height as usize;
        let mut indices = vec![0; pixels.len()];

        for y in (0..height).rev() {
            for x in 0..width {
                let i = y * width + x;
                let pixel = pixels[i];
                let color = [pixel.red, pixel.green, pixel.blue];

                let index = nearest(&palette, color);
                let matched = palette[usize::from(index)];
                let error: [i16; 3] =
                    std::array::from_fn(|c| i16::from(color[c]) - i16::from(matched[c]));

                for (dx, dy, weight) in NEIGHBORS {
                    let nx = x as isize + dx;
                    let ny = y as isize + dy;
                    if nx < 0 || ny < 0 || nx >= width as isize {
                        continue;
                    }
                    diffuse(&mut pixels[ny as usize * width + nx as usize], error, weight);
                }

                indices[i] = index;
            }
        }

        Ok(indices)
    }

    /// Dithers an [`ImageBuf`] in place, returning one palette index per pixel.
    ///
    /// # Errors
    /// Fails if `palette` is empty or longer than [`MAX_COLORS`](crate::MAX_COLORS).
    pub fn dither_image(&self, palette: &[Srgb<u8>], image: &mut ImageBuf) -> Result<Vec<u8>, Error> {
        let (width, height) = image.dimensions();
        self.dither(palette, image.pixels_mut(), width, height)
    }
}
