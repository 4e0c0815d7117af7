//! The nearest-centroid assignment kernel and the contexts that build it.
//!
//! A kernel is compiled once for a fixed number of clusters and frame size. Each iteration binds
//! the current centroids, dispatches over every pixel, and leaves an RGBA8 frame where each pixel
//! holds the truncated 8-bit color of its nearest centroid. Frames are stored bottom row first,
//! the way a GPU read-back returns them.

use crate::{KernelError, MAX_COLORS, MAX_K, MAX_PIXELS};
use palette::Srgba;
use wide::{f32x8, u32x8, CmpLt};

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// A compute backend able to build the nearest-centroid assignment kernel.
pub trait ComputeContext {
    /// The compiled kernel type.
    type Kernel: AssignmentKernel;

    /// Builds a kernel with `clusters` centroid parameters for a `width x height` frame.
    fn compile(&self, clusters: usize, width: u32, height: u32) -> Result<Self::Kernel, KernelError>;
}

/// A compiled nearest-centroid assignment kernel.
pub trait AssignmentKernel {
    /// The number of centroid parameters of the kernel.
    fn clusters(&self) -> usize;

    /// Sets the centroid parameter at `index` to a normalized RGB color.
    fn bind(&mut self, index: usize, centroid: [f32; 3]);

    /// Runs the kernel over the normalized, top-to-bottom `colors` of the image
    /// and writes the result frame, bottom row first, into `frame`.
    fn dispatch(&mut self, colors: &[[f32; 3]], frame: &mut [Srgba<u8>]);
}

/// Truncates a normalized color to 8 bits per channel.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[inline]
pub(crate) fn quantize(color: [f32; 3]) -> [u8; 3] {
    color.map(|c| (c * 255.0) as u8)
}

/// Returns the index of the centroid nearest to `query`.
///
/// The centroids are packed 8 per chunk, one `f32x8` per component. A lane only moves to a later
/// chunk on a strictly smaller distance, and lanes are reduced by lowest index on ties, so the
/// result always matches a linear scan that keeps the first minimum.
#[allow(clippy::float_cmp)]
#[inline]
fn simd_argmin(points: &[[f32x8; 3]], query: [f32; 3]) -> usize {
    let mut cur_chunk = u32x8::ZERO;
    let mut min_chunk = cur_chunk;
    let mut min_distance = f32x8::splat(f32::INFINITY);

    let query = query.map(f32x8::splat);

    for chunk in points {
        let d0 = chunk[0] - query[0];
        let d1 = chunk[1] - query[1];
        let d2 = chunk[2] - query[2];
        let distance = d0 * d0 + d1 * d1 + d2 * d2;

        let closer = distance.cmp_lt(min_distance);
        let mask = u32x8::new(closer.to_array().map(f32::to_bits));
        min_chunk = mask.blend(cur_chunk, min_chunk);
        min_distance = closer.blend(distance, min_distance);
        cur_chunk += u32x8::ONE;
    }

    let distances = min_distance.to_array();
    let chunks = min_chunk.to_array();

    let mut min_index = usize::MAX;
    let mut min_dist = f32::INFINITY;
    for lane in 0..8 {
        let index = chunks[lane] as usize * 8 + lane;
        let dist = distances[lane];
        if dist < min_dist || (dist == min_dist && index < min_index) {
            min_dist = dist;
            min_index = index;
        }
    }

    min_index
}

/// Returns the index of the centroid nearest to `query` by a linear scan.
///
/// Only a strictly smaller distance replaces the current best, so ties go to the lowest index.
pub(crate) fn nearest_linear(centroids: &[[f32; 3]], query: [f32; 3]) -> usize {
    let mut nearest = 0;
    let mut min_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d0 = c[0] - query[0];
        let d1 = c[1] - query[1];
        let d2 = c[2] - query[2];
        let dist = d0 * d0 + d1 * d1 + d2 * d2;
        if dist < min_dist {
            min_dist = dist;
            nearest = i;
        }
    }
    nearest
}

/// Builds [`CpuKernel`]s, which evaluate the assignment on the CPU using SIMD.
///
/// With the `threads` feature, [`CpuContext::parallel`] spreads the rows of the frame
/// across the [`rayon`] thread pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuContext {
    /// Whether to dispatch rows in parallel.
    parallel: bool,
}

impl CpuContext {
    /// Creates a context whose kernels run on the calling thread.
    #[must_use]
    pub const fn new() -> Self {
        Self { parallel: false }
    }

    /// Creates a context whose kernels run across the rayon thread pool.
    #[cfg(feature = "threads")]
    #[must_use]
    pub const fn parallel() -> Self {
        Self { parallel: true }
    }
}

impl ComputeContext for CpuContext {
    type Kernel = CpuKernel;

    fn compile(&self, clusters: usize, width: u32, height: u32) -> Result<CpuKernel, KernelError> {
        if clusters == 0 {
            return Err(KernelError::Compile("kernel needs at least one cluster parameter".into()));
        }
        if clusters > MAX_K {
            return Err(KernelError::Compile(format!(
                "{clusters} cluster parameters exceed the {MAX_COLORS} available slots"
            )));
        }

        let pixels = u64::from(width) * u64::from(height);
        if pixels == 0 {
            return Err(KernelError::Link(format!("cannot attach to an empty {width}x{height} frame")));
        }
        if pixels > u64::from(MAX_PIXELS) {
            return Err(KernelError::Link(format!(
                "{width}x{height} frame exceeds the maximum of {MAX_PIXELS} pixels"
            )));
        }

        Ok(CpuKernel {
            components: vec![[f32x8::splat(f32::INFINITY); 3]; clusters.div_ceil(8)],
            quantized: vec![Srgba::new(0, 0, 0, u8::MAX); clusters],
            width: width as usize,
            height: height as usize,
            parallel: self.parallel,
        })
    }
}

/// The nearest-centroid kernel built by [`CpuContext`].
#[derive(Debug, Clone)]
pub struct CpuKernel {
    /// The centroids, 8 per chunk, one `f32x8` per component. Unused lanes hold infinity.
    components: Vec<[f32x8; 3]>,
    /// The truncated 8-bit color written for each centroid.
    quantized: Vec<Srgba<u8>>,
    /// The width of the frame.
    width: usize,
    /// The height of the frame.
    height: usize,
    /// Whether to dispatch rows in parallel.
    parallel: bool,
}

impl CpuKernel {
    /// Writes one frame row from one row of source colors.
    #[inline]
    fn shade_row(components: &[[f32x8; 3]], quantized: &[Srgba<u8>], colors: &[[f32; 3]], out: &mut [Srgba<u8>]) {
        for (out, &color) in out.iter_mut().zip(colors) {
            *out = quantized[simd_argmin(components, color)];
        }
    }
}

impl AssignmentKernel for CpuKernel {
    fn clusters(&self) -> usize {
        self.quantized.len()
    }

    fn bind(&mut self, index: usize, centroid: [f32; 3]) {
        let (chunk, lane) = (index / 8, index % 8);
        let chunk = &mut self.components[chunk];
        for (c, &value) in chunk.iter_mut().zip(&centroid) {
            let mut lanes = c.to_array();
            lanes[lane] = value;
            *c = f32x8::new(lanes);
        }

        let [r, g, b] = quantize(centroid);
        self.quantized[index] = Srgba::new(r, g, b, u8::MAX);
    }

    fn dispatch(&mut self, colors: &[[f32; 3]], frame: &mut [Srgba<u8>]) {
        let Self { components, quantized, width, height, parallel } = &*self;
        let (width, height) = (*width, *height);
        debug_assert_eq!(colors.len(), width * height);
        debug_assert_eq!(frame.len(), width * height);

        let row = |(out_row, out): (usize, &mut [Srgba<u8>])| {
            let y = height - 1 - out_row;
            Self::shade_row(components, quantized, &colors[(y * width)..((y + 1) * width)], out);
        };

        #[cfg(feature = "threads")]
        {
            if *parallel {
                frame.par_chunks_exact_mut(width).enumerate().for_each(row);
                return;
            }
        }

        #[cfg(not(feature = "threads"))]
        let _ = parallel;

        frame.chunks_exact_mut(width).enumerate().for_each(row);
    }
}

/// Packs normalized centroids 8 per chunk for [`simd_argmin`].
#[cfg(test)]
fn pack(centroids: &[[f32; 3]]) -> Vec<[f32x8; 3]> {
    use std::array;

    centroids
        .chunks(8)
        .map(|chunk| {
            array::from_fn(|c| {
                f32x8::new(array::from_fn(|lane| chunk.get(lane).map_or(f32::INFINITY, |p| p[c])))
            })
        })
        .collect()
}
