//! Contains the [`ImagePipeline`] builder struct for the high level API.

use crate::{
    condense,
    kmeans::{self, ComputeContext, CpuContext, KmeansOptions},
    Error, FloydSteinberg, ImageBuf, IndexedImage, PaletteSize,
};
use flate2::Compression;
use palette::Srgb;

/// A builder struct to specify options to create a palette, an indexed image, or an indexed PNG
/// from an image.
///
/// The pipeline runs k-means clustering to find [`palette_size`](ImagePipeline::palette_size)
/// colors, merges colors within [`epsilon`](ImagePipeline::epsilon) of each other,
/// dithers the image against the merged palette, and finally writes the PNG.
///
/// # Examples
/// To start, create an [`ImagePipeline`] from an [`ImageBuf`]:
/// ```
/// # use clusterquant::{ImageBuf, ImagePipeline};
/// # use palette::Srgba;
/// # fn main() -> Result<(), clusterquant::Error> {
/// let image = ImageBuf::new(1, 1, vec![Srgba::new(0, 0, 0, 255)])?;
/// let pipeline = ImagePipeline::new(image);
/// # Ok(())
/// # }
/// ```
///
/// Then, you can change different options like the number of colors in the palette:
/// ```
/// # use clusterquant::{ImageBuf, ImagePipeline, KmeansOptions};
/// # use palette::Srgba;
/// # fn main() -> Result<(), clusterquant::Error> {
/// # let image = ImageBuf::new(1, 1, vec![Srgba::new(0, 0, 0, 255)])?;
/// let pipeline = ImagePipeline::new(image)
///     .palette_size(16.into())
///     .epsilon(4.0)
///     .kmeans(KmeansOptions::new().iterations(6).seed(1));
/// # Ok(())
/// # }
/// ```
///
/// Finally, run the pipeline:
/// ```
/// # use clusterquant::{ImageBuf, ImagePipeline};
/// # use palette::Srgba;
/// # fn main() -> Result<(), clusterquant::Error> {
/// # let image = ImageBuf::new(1, 1, vec![Srgba::new(0, 0, 0, 255)])?;
/// # let pipeline = ImagePipeline::new(image);
/// let png = pipeline.encode_png()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    /// The input image. It is consumed as dither scratch space.
    pub(crate) image: ImageBuf,
    /// The number of centroids to compute.
    pub(crate) k: PaletteSize,
    /// The squared distance under which palette colors are merged.
    pub(crate) epsilon: f32,
    /// The k-means parameters.
    pub(crate) kmeans: KmeansOptions,
    /// The zlib compression level of the PNG image data.
    pub(crate) compression: Compression,
}

impl ImagePipeline {
    /// Creates a new [`ImagePipeline`] with default options.
    pub fn new(image: ImageBuf) -> Self {
        Self {
            image,
            k: PaletteSize::default(),
            epsilon: 0.0,
            kmeans: KmeansOptions::new(),
            compression: Compression::default(),
        }
    }

    /// Sets the number of centroids to compute, which is the maximum size of the palette.
    ///
    /// The default value is [`PaletteSize::MAX`].
    pub fn palette_size(mut self, size: PaletteSize) -> Self {
        self.k = size;
        self
    }

    /// Sets the squared RGB distance at or below which palette colors are merged.
    ///
    /// The default is `0.0`, which only merges exact duplicates.
    /// Negative values are treated as `0.0`.
    pub fn epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon.max(0.0);
        self
    }

    /// Sets the k-means parameters.
    pub fn kmeans(mut self, options: KmeansOptions) -> Self {
        self.kmeans = options;
        self
    }

    /// Sets the zlib compression level used for the PNG image data.
    ///
    /// The default is [`Compression::default`].
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

#[cfg(feature = "image")]
impl TryFrom<image::RgbaImage> for ImagePipeline {
    type Error = Error;

    fn try_from(image: image::RgbaImage) -> Result<Self, Self::Error> {
        Ok(Self::new(image.try_into()?))
    }
}

#[cfg(feature = "image")]
impl TryFrom<&image::RgbaImage> for ImagePipeline {
    type Error = Error;

    fn try_from(image: &image::RgbaImage) -> Result<Self, Self::Error> {
        Ok(Self::new(image.try_into()?))
    }
}

impl ImagePipeline {
    /// Computes the condensed palette using the given compute context.
    pub fn palette_with(&self, context: &impl ComputeContext) -> Result<Vec<Srgb<u8>>, Error> {
        let Self { image, k, epsilon, kmeans, .. } = self;

        let centroids = kmeans::cluster(context, image, *k, kmeans)?;
        tracing::debug!(centroids = centroids.num_colors(), "computed centroids");

        Ok(condense(&centroids.to_palette(), *epsilon))
    }

    /// Computes the palette and dithers the image against it using the given compute context.
    pub fn indexed_image_with(self, context: &impl ComputeContext) -> Result<IndexedImage, Error> {
        let palette = self.palette_with(context)?;

        let mut image = self.image;
        let indices = FloydSteinberg::new().dither_image(&palette, &mut image)?;
        let (width, height) = image.dimensions();

        Ok(IndexedImage { width, height, palette, indices })
    }

    /// Runs the whole pipeline using the given compute context and returns the PNG bytes.
    pub fn encode_png_with(self, context: &impl ComputeContext) -> Result<Vec<u8>, Error> {
        let compression = self.compression;
        let indexed = self.indexed_image_with(context)?;
        Ok(indexed.encode_png(compression)?)
    }

    /// Computes the condensed palette.
    pub fn palette(&self) -> Result<Vec<Srgb<u8>>, Error> {
        self.palette_with(&CpuContext::new())
    }

    /// Computes the palette and dithers the image against it.
    pub fn indexed_image(self) -> Result<IndexedImage, Error> {
        self.indexed_image_with(&CpuContext::new())
    }

    /// Runs the whole pipeline and returns the PNG bytes.
    pub fn encode_png(self) -> Result<Vec<u8>, Error> {
        self.encode_png_with(&CpuContext::new())
    }
}

#[cfg(feature = "threads")]
impl ImagePipeline {
    /// Computes the condensed palette, running the assignment kernel in parallel.
    pub fn palette_par(&self) -> Result<Vec<Srgb<u8>>, Error> {
        self.palette_with(&CpuContext::parallel())
    }

    /// Computes the palette and dithers the image against it,
    /// running the assignment kernel in parallel.
    pub fn indexed_image_par(self) -> Result<IndexedImage, Error> {
        self.indexed_image_with(&CpuContext::parallel())
    }

    /// Runs the whole pipeline and returns the PNG bytes,
    /// running the assignment kernel in parallel.
    pub fn encode_png_par(self) -> Result<Vec<u8>, Error> {
        self.encode_png_with(&CpuContext::parallel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{kmeans::Centroids, png, tests::*, KernelError};

    fn rgb(image: &ImageBuf) -> Vec<Srgb<u8>> {
        image
            .pixels()
            .iter()
            .map(|p| Srgb::new(p.red, p.green, p.blue))
            .collect()
    }

    fn decode(bytes: &[u8]) -> (u32, u32, Vec<u8>, Vec<u8>) {
        let mut decoder = ::png::Decoder::new(bytes);
        decoder.set_transformations(::png::Transformations::IDENTITY);
        let mut reader = decoder.read_info().unwrap();
        let mut indices = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut indices).unwrap();
        assert_eq!(info.color_type, ::png::ColorType::Indexed);
        assert_eq!(info.bit_depth, ::png::BitDepth::Eight);
        indices.truncate(info.buffer_size());
        let palette = reader.info().palette.as_deref().unwrap().to_vec();
        (info.width, info.height, palette, indices)
    }

    #[test]
    fn four_colors_one_centroid_each() {
        let image = four_colors();
        let source = rgb(&image);
        let initial = Centroids::try_from(source.clone()).unwrap();

        let pipeline = ImagePipeline::new(image)
            .palette_size(4.into())
            .kmeans(KmeansOptions::new().iterations(1).initial_centroids(initial));

        let indexed = pipeline.clone().indexed_image().unwrap();
        assert_eq!(indexed.palette, source);
        assert_eq!(indexed.indices, vec![0, 1, 2, 3]);

        let (width, height, palette, indices) = decode(&pipeline.encode_png().unwrap());
        assert_eq!((width, height), (2, 2));
        assert_eq!(
            palette,
            source.iter().flat_map(|c| [c.red, c.green, c.blue]).collect::<Vec<_>>()
        );
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn four_colors_sampled_centroids() {
        let image = four_colors();
        let source = rgb(&image);

        for seed in 0..8 {
            let indexed = ImagePipeline::new(image.clone())
                .palette_size(4.into())
                .kmeans(KmeansOptions::new().iterations(1).seed(seed))
                .indexed_image()
                .unwrap();

            // every centroid starts at a pixel and a single counted pixel keeps it there
            assert!(!indexed.palette.is_empty() && indexed.palette.len() <= 4);
            assert!(indexed.palette.iter().all(|c| source.contains(c)));
            assert_eq!(indexed.indices.len(), 4);
            assert!(indexed.indices.iter().all(|&i| usize::from(i) < indexed.palette.len()));
        }
    }

    #[test]
    fn round_trip_matches_indexed_image() {
        let pipeline = ImagePipeline::new(gradient(45, 30))
            .palette_size(12.into())
            .epsilon(16.0)
            .kmeans(KmeansOptions::new().iterations(4).seed(5));

        let indexed = pipeline.clone().indexed_image().unwrap();
        let bytes = pipeline.encode_png().unwrap();

        let (width, height, palette, indices) = decode(&bytes);
        assert_eq!((width, height), (45, 30));
        assert_eq!(
            palette,
            indexed.palette.iter().flat_map(|c| [c.red, c.green, c.blue]).collect::<Vec<_>>()
        );
        assert_eq!(indices, indexed.indices);
        assert!(png::chunks(&bytes).unwrap().all(|c| c.crc_is_valid()));
    }

    #[test]
    fn single_color_palette() {
        let indexed = ImagePipeline::new(gradient(16, 16))
            .palette_size(1.into())
            .indexed_image()
            .unwrap();

        assert_eq!(indexed.palette.len(), 1);
        assert!(indexed.indices.iter().all(|&i| i == 0));
    }

    #[test]
    fn huge_epsilon_merges_to_one_color() {
        let palette = ImagePipeline::new(gradient(16, 16))
            .palette_size(32.into())
            .epsilon(f32::MAX)
            .palette()
            .unwrap();

        assert_eq!(palette.len(), 1);
    }

    #[test]
    fn palette_never_exceeds_size() {
        let pipeline = ImagePipeline::new(gradient(20, 20)).palette_size(24.into());
        let palette = pipeline.palette().unwrap();
        assert!(!palette.is_empty() && palette.len() <= 24);

        // epsilon 0 leaves no exact duplicates
        for (i, a) in palette.iter().enumerate() {
            assert!(!palette[(i + 1)..].contains(a));
        }
    }

    #[test]
    fn zero_palette_size_is_a_kernel_error() {
        let result = ImagePipeline::new(gradient(4, 4)).palette_size(0.into()).encode_png();
        assert!(matches!(result, Err(Error::Kernel(KernelError::Compile(_)))));
    }

    #[cfg(feature = "threads")]
    #[test]
    fn parallel_matches_sequential() {
        let pipeline = ImagePipeline::new(gradient(33, 17))
            .palette_size(9.into())
            .kmeans(KmeansOptions::new().seed(2));

        assert_eq!(pipeline.clone().encode_png().unwrap(), pipeline.encode_png_par().unwrap());
    }
}
