//! Palette generation through iterative nearest-centroid clustering (Lloyd's k-means).
//!
//! Each iteration assigns every pixel to its nearest centroid through an [`AssignmentKernel`]
//! and then moves each centroid to the mean of the pixels assigned to it.
//! The assignment step has no cross-pixel dependencies and is the only data-parallel step;
//! it is performed by whatever [`ComputeContext`] the caller provides.
//! [`CpuContext`] is the built-in context.
//!
//! The kernel reports assignments as the truncated 8-bit color of the chosen centroid rather than
//! its index, so two centroids that truncate to the same color are treated as one cluster
//! during recomputation. Only the last of them is moved; the others keep their value.
//!
//! No convergence check is performed by default: the loop always runs for the configured number
//! of iterations. [`KmeansOptions::stop_when_stable`] enables an early exit.

mod kernel;
mod stats;

pub use kernel::*;

use crate::{AboveMaxLen, ImageBuf, KernelError, PaletteSize, MAX_COLORS, MAX_K};
use palette::Srgb;
use rand::{prelude::Distribution, SeedableRng};
use rand_distr::Uniform;
use rand_xoshiro::Xoroshiro128PlusPlus;
use stats::ClusterStats;

/// A list of cluster centers with the invariant that its length is at most [`MAX_COLORS`].
#[derive(Debug, Clone, PartialEq)]
#[repr(transparent)]
pub struct Centroids<Color>(Vec<Color>);

impl<Color> Centroids<Color> {
    /// Consumes the centroids and returns the inner `Vec`.
    #[must_use]
    pub fn into_inner(self) -> Vec<Color> {
        self.0
    }

    /// Creates new [`Centroids`] by truncating the input to a max length of [`MAX_COLORS`].
    #[must_use]
    pub fn from_truncated(mut centroids: Vec<Color>) -> Self {
        centroids.truncate(MAX_K);
        Self(centroids)
    }

    /// Returns the number of centroids.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn num_colors(&self) -> u16 {
        self.0.len() as u16
    }

    /// Returns the centroids as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Color] {
        &self.0
    }
}

impl Centroids<Srgb<f32>> {
    /// Floors each `[0, 255]` scaled centroid to 8 bits per channel.
    ///
    /// The order of the centroids is kept.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn to_palette(&self) -> Vec<Srgb<u8>> {
        self.0
            .iter()
            .map(|c| Srgb::new(c.red as u8, c.green as u8, c.blue as u8))
            .collect()
    }
}

impl<Color> From<Centroids<Color>> for Vec<Color> {
    fn from(value: Centroids<Color>) -> Self {
        value.into_inner()
    }
}

impl<Color> TryFrom<Vec<Color>> for Centroids<Color> {
    type Error = AboveMaxLen<u16>;

    fn try_from(colors: Vec<Color>) -> Result<Self, Self::Error> {
        if colors.len() <= MAX_K {
            Ok(Self(colors))
        } else {
            Err(AboveMaxLen(MAX_COLORS))
        }
    }
}

/// A builder struct to specify the parameters for k-means.
///
/// # Examples
/// ```
/// # use clusterquant::KmeansOptions;
/// let options = KmeansOptions::new()
///     .iterations(8)
///     .seed(42)
///     .stop_when_stable(true);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct KmeansOptions {
    /// The number of assignment and recomputation rounds.
    pub(crate) iterations: u32,
    /// The seed value for the random number generator.
    pub(crate) seed: u64,
    /// The initial centroids to use instead of sampled pixels.
    pub(crate) initial_centroids: Option<Centroids<Srgb<u8>>>,
    /// Whether the last row and column count towards the centroid means.
    pub(crate) include_trailing_edge: bool,
    /// Whether to stop once an iteration leaves every centroid unchanged.
    pub(crate) stop_when_stable: bool,
}

impl Default for KmeansOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl KmeansOptions {
    /// The default number of iterations.
    pub const DEFAULT_ITERATIONS: u32 = 4;

    /// Creates a new [`KmeansOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            iterations: Self::DEFAULT_ITERATIONS,
            seed: 0,
            initial_centroids: None,
            include_trailing_edge: false,
            stop_when_stable: false,
        }
    }

    /// Sets the number of iterations to run.
    ///
    /// The default is [`KmeansOptions::DEFAULT_ITERATIONS`].
    /// With `0` iterations the initial centroids are returned as is.
    #[must_use]
    pub const fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the seed value for the random number generator used to pick the initial centroids.
    ///
    /// The default seed is `0`.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the initial centroids.
    ///
    /// By default, the initial centroids are the colors of randomly chosen pixels
    /// (see [`sample_centroids`]). When set, the palette size given to [`cluster`] is ignored
    /// and one centroid is computed per initial color.
    #[must_use]
    pub fn initial_centroids(mut self, centroids: Centroids<Srgb<u8>>) -> Self {
        self.initial_centroids = Some(centroids);
        self
    }

    /// Sets whether the last column and row of the image are used when recomputing centroids.
    ///
    /// The default is `false`: pixels with `x = width - 1` or `y = height - 1` are still assigned,
    /// but do not move any centroid.
    #[must_use]
    pub const fn include_trailing_edge(mut self, include: bool) -> Self {
        self.include_trailing_edge = include;
        self
    }

    /// Sets whether to stop early once an iteration leaves every centroid unchanged.
    ///
    /// The default is `false`, that is, to always run every iteration.
    #[must_use]
    pub const fn stop_when_stable(mut self, stop: bool) -> Self {
        self.stop_when_stable = stop;
        self
    }
}

/// Picks `k` initial centroids by reading the colors of `k` uniformly random pixel positions.
///
/// Positions are drawn independently, so the same pixel (or color) may be picked more than once.
/// An empty image gives no centroids.
#[must_use]
pub fn sample_centroids(image: &ImageBuf, k: PaletteSize, seed: u64) -> Centroids<Srgb<u8>> {
    if image.is_empty() {
        return Centroids(Vec::new());
    }

    let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
    let columns = Uniform::new(0, image.width());
    let rows = Uniform::new(0, image.height());

    let centroids = (0..k.into_inner())
        .map(|_| {
            let x = columns.sample(rng);
            let y = rows.sample(rng);
            let pixel = image.pixel(x, y);
            Srgb::new(pixel.red, pixel.green, pixel.blue)
        })
        .collect();

    Centroids(centroids)
}

/// Scales an 8-bit color to `[0, 1]`.
#[inline]
fn normalize(color: [u8; 3]) -> [f32; 3] {
    color.map(|c| f32::from(c) / 255.0)
}

/// Computes `k` centroids for `image`, scaled to `[0, 255]`.
///
/// The centroids start at [`KmeansOptions::initial_centroids`] if set, otherwise at
/// [`sample_centroids`]. The kernel is compiled once with `context` and then run for
/// [`KmeansOptions::iterations`] rounds. A centroid that receives no pixels in a round keeps its
/// value for that round.
///
/// # Errors
/// Returns a [`KernelError`] if the kernel cannot be built, for example for `k = 0` or an empty image.
pub fn cluster<Context: ComputeContext>(
    context: &Context,
    image: &ImageBuf,
    k: PaletteSize,
    options: &KmeansOptions,
) -> Result<Centroids<Srgb<f32>>, KernelError> {
    let KmeansOptions {
        iterations,
        seed,
        ref initial_centroids,
        include_trailing_edge,
        stop_when_stable,
    } = *options;

    let (width, height) = image.dimensions();
    let initial = match initial_centroids {
        Some(centroids) => centroids.clone(),
        None => sample_centroids(image, k, seed),
    };

    let mut centroids = initial
        .as_slice()
        .iter()
        .map(|c| normalize([c.red, c.green, c.blue]))
        .collect::<Vec<_>>();

    let mut kernel = context.compile(centroids.len(), width, height)?;

    let colors = image
        .pixels()
        .iter()
        .map(|p| normalize([p.red, p.green, p.blue]))
        .collect::<Vec<_>>();

    let mut frame = vec![palette::Srgba::new(0, 0, 0, u8::MAX); colors.len()];

    for iteration in 0..iterations {
        for (i, &centroid) in centroids.iter().enumerate() {
            kernel.bind(i, centroid);
        }
        kernel.dispatch(&colors, &mut frame);

        let mut stats = ClusterStats::new(&centroids);
        stats.accumulate(
            &frame,
            &colors,
            width as usize,
            height as usize,
            include_trailing_edge,
        );
        let update = stats.apply(&mut centroids);

        tracing::trace!(
            iteration,
            empty = update.empty,
            shadowed = update.shadowed,
            changed = update.changed,
            "k-means iteration finished"
        );

        if stop_when_stable && !update.changed {
            tracing::debug!(iteration, "centroids stable, stopping early");
            break;
        }
    }

    let centroids = centroids
        .into_iter()
        .map(|[r, g, b]| Srgb::new(r * 255.0, g * 255.0, b * 255.0))
        .collect();

    Ok(Centroids(centroids))
}
