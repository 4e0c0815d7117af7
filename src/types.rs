//! Contains various types needed across the crate.

use crate::{png, EncodeError, Error, MAX_COLORS, MAX_PIXELS};
use flate2::Compression;
use palette::{Srgb, Srgba};
use std::fmt::Display;
use thiserror::Error;

/// An error type for when the length of an input (e.g., `Vec` or slice)
/// is above the maximum supported value.
///
/// The inner value is the maximum supported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Error)]
#[error("above the maximum length of {0}")]
pub struct AboveMaxLen<T>(pub T);

/// An owned RGBA image with 8 bits per channel, stored row-major from top to bottom.
///
/// The invariants `pixels.len() == width * height` and `width * height <= MAX_PIXELS`
/// are checked on construction.
///
/// # Examples
/// ```
/// # use clusterquant::ImageBuf;
/// # use palette::Srgba;
/// # fn main() -> Result<(), clusterquant::Error> {
/// let image = ImageBuf::new(2, 1, vec![Srgba::new(0, 0, 0, 255); 2])?;
/// assert_eq!(image.dimensions(), (2, 1));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuf {
    /// The width of the image in pixels.
    width: u32,
    /// The height of the image in pixels.
    height: u32,
    /// The pixels of the image.
    pixels: Vec<Srgba<u8>>,
}

impl ImageBuf {
    /// Creates a new [`ImageBuf`] from a row-major pixel buffer.
    pub fn new(width: u32, height: u32, pixels: Vec<Srgba<u8>>) -> Result<Self, Error> {
        let expected = u64::from(width) * u64::from(height);
        if expected > u64::from(MAX_PIXELS) {
            return Err(AboveMaxLen(MAX_PIXELS).into());
        }
        if pixels.len() as u64 != expected {
            return Err(Error::InvalidImage { width, height, len: pixels.len() });
        }
        Ok(Self { width, height, pixels })
    }

    /// Creates a new [`ImageBuf`] from interleaved `RGBA` bytes.
    pub fn from_raw(width: u32, height: u32, raw: &[u8]) -> Result<Self, Error> {
        if raw.len() % 4 != 0 {
            return Err(Error::InvalidImage { width, height, len: raw.len() / 4 });
        }
        let pixels = raw
            .chunks_exact(4)
            .map(|p| Srgba::new(p[0], p[1], p[2], p[3]))
            .collect();
        Self::new(width, height, pixels)
    }

    /// Returns the `(width, height)` of the image.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the width of the image.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the image.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Returns the pixels of the image.
    #[must_use]
    pub fn pixels(&self) -> &[Srgba<u8>] {
        &self.pixels
    }

    /// Returns the pixels of the image for in-place modification.
    pub fn pixels_mut(&mut self) -> &mut [Srgba<u8>] {
        &mut self.pixels
    }

    /// Returns the pixel at `(x, y)`.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Srgba<u8> {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Returns the number of pixels in the image.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Whether the image has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Consumes the image and returns its pixels.
    #[must_use]
    pub fn into_pixels(self) -> Vec<Srgba<u8>> {
        self.pixels
    }
}

#[cfg(feature = "image")]
impl TryFrom<image::RgbaImage> for ImageBuf {
    type Error = Error;

    fn try_from(image: image::RgbaImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        Self::from_raw(width, height, image.as_raw())
    }
}

#[cfg(feature = "image")]
impl TryFrom<&image::RgbaImage> for ImageBuf {
    type Error = Error;

    fn try_from(image: &image::RgbaImage) -> Result<Self, Self::Error> {
        let (width, height) = image.dimensions();
        Self::from_raw(width, height, image.as_raw())
    }
}

/// This type is used to specify the (maximum) number of colors to include in a palette.
///
/// This is a simple new type wrapper around `u16` with the invariant that it must be
/// less than or equal to [`MAX_COLORS`].
///
/// A [`PaletteSize`] of `0` is representable, but clustering with it fails
/// since the assignment kernel needs at least one centroid.
///
/// # Examples
/// ```
/// # use clusterquant::{PaletteSize, AboveMaxLen};
/// # fn main() -> Result<(), AboveMaxLen<u16>> {
/// let size = PaletteSize::from(16);
/// let size = PaletteSize::try_from(256u16)?;
/// let size = PaletteSize::from_clamped(1024);
/// assert_eq!(size, PaletteSize::MAX);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PaletteSize(u16);

impl PaletteSize {
    /// The maximum supported palette size (given by [`MAX_COLORS`]).
    pub const MAX: Self = Self(MAX_COLORS);

    /// Gets the inner `u16` value.
    #[must_use]
    pub const fn into_inner(self) -> u16 {
        self.0
    }

    /// Creates a [`PaletteSize`] by clamping the given `u16` to be less than or equal to [`MAX_COLORS`].
    #[must_use]
    pub const fn from_clamped(value: u16) -> Self {
        if value <= MAX_COLORS {
            Self(value)
        } else {
            Self(MAX_COLORS)
        }
    }
}

impl Default for PaletteSize {
    fn default() -> Self {
        Self::MAX
    }
}

impl From<PaletteSize> for u16 {
    fn from(val: PaletteSize) -> Self {
        val.into_inner()
    }
}

impl From<PaletteSize> for usize {
    fn from(val: PaletteSize) -> Self {
        val.into_inner().into()
    }
}

impl From<u8> for PaletteSize {
    fn from(value: u8) -> Self {
        Self(value.into())
    }
}

impl TryFrom<u16> for PaletteSize {
    type Error = AboveMaxLen<u16>;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value <= MAX_COLORS {
            Ok(PaletteSize(value))
        } else {
            Err(AboveMaxLen(MAX_COLORS))
        }
    }
}

impl Display for PaletteSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_inner())
    }
}

/// A palette together with one palette index per pixel, as produced by dithering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedImage {
    /// The width of the image in pixels.
    pub width: u32,
    /// The height of the image in pixels.
    pub height: u32,
    /// The palette colors. The position of a color is its index.
    pub palette: Vec<Srgb<u8>>,
    /// One palette index per pixel, row-major from top to bottom.
    pub indices: Vec<u8>,
}

impl IndexedImage {
    /// Writes the image as an indexed-color PNG.
    pub fn encode_png(&self, compression: Compression) -> Result<Vec<u8>, EncodeError> {
        png::PngEncoder::new()
            .compression(compression)
            .encode(&self.indices, &self.palette, self.width, self.height)
    }
}
