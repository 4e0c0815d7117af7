//! Per-iteration bookkeeping for recomputing centroids from a kernel frame.

use super::kernel::quantize;
use palette::Srgba;
use std::collections::HashMap;

/// The outcome of applying one iteration's statistics to the centroids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Update {
    /// The number of centroids that received no pixels and kept their value.
    pub empty: usize,
    /// The number of centroids whose quantized color is shared with a later centroid.
    pub shadowed: usize,
    /// Whether any centroid changed value.
    pub changed: bool,
}

/// Pixel counts and color sums for each centroid, found through its quantized color.
///
/// Centroids whose quantized colors are equal cannot be told apart in the kernel frame.
/// The lookup resolves such a color to the last of them, which then receives the pixels
/// of all of them while the others see no pixels and keep their value.
pub(crate) struct ClusterStats {
    /// Maps a quantized centroid color to the centroid that owns it.
    lookup: HashMap<[u8; 3], usize>,
    /// The number of pixels assigned to each centroid.
    counts: Vec<u32>,
    /// The sum of the unquantized colors of the pixels assigned to each centroid.
    sums: Vec<[f64; 3]>,
}

impl ClusterStats {
    /// Creates empty statistics keyed by the quantized colors of `centroids`.
    pub fn new(centroids: &[[f32; 3]]) -> Self {
        let mut lookup = HashMap::with_capacity(centroids.len());
        for (i, &centroid) in centroids.iter().enumerate() {
            lookup.insert(quantize(centroid), i);
        }

        Self {
            lookup,
            counts: vec![0; centroids.len()],
            sums: vec![[0.0; 3]; centroids.len()],
        }
    }

    /// Adds every pixel of the source image to the centroid matching its frame color.
    ///
    /// `frame` is bottom row first while `colors` is top row first.
    /// Unless `include_trailing_edge` is set, the last column and the last row of the source
    /// image are skipped.
    pub fn accumulate(
        &mut self,
        frame: &[Srgba<u8>],
        colors: &[[f32; 3]],
        width: usize,
        height: usize,
        include_trailing_edge: bool,
    ) {
        let (columns, rows) = if include_trailing_edge {
            (width, height)
        } else {
            (width.saturating_sub(1), height.saturating_sub(1))
        };

        for y in 0..rows {
            let mirror = height - 1 - y;
            let out = &frame[(mirror * width)..(mirror * width + columns)];
            let src = &colors[(y * width)..(y * width + columns)];

            for (out, color) in out.iter().zip(src) {
                if let Some(&i) = self.lookup.get(&[out.red, out.green, out.blue]) {
                    self.counts[i] += 1;
                    for (sum, &c) in self.sums[i].iter_mut().zip(color) {
                        *sum += f64::from(c);
                    }
                }
            }
        }
    }

    /// Replaces each centroid that received pixels with the mean of those pixels.
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    pub fn apply(&self, centroids: &mut [[f32; 3]]) -> Update {
        let mut update = Update {
            empty: 0,
            shadowed: centroids.len() - self.lookup.len(),
            changed: false,
        };

        for ((centroid, &count), sum) in centroids.iter_mut().zip(&self.counts).zip(&self.sums) {
            if count == 0 {
                update.empty += 1;
                continue;
            }

            let n = f64::from(count);
            let mean = sum.map(|s| (s / n) as f32);
            if mean != *centroid {
                update.changed = true;
                *centroid = mean;
            }
        }

        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPAQUE: u8 = u8::MAX;

    #[test]
    fn mean_of_assigned_pixels() {
        let mut centroids = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let mut stats = ClusterStats::new(&centroids);

        // 3x1 image, all columns counted
        let colors = [[0.1, 0.1, 0.1], [0.3, 0.3, 0.3], [0.9, 0.8, 0.7]];
        let frame = [
            Srgba::new(0, 0, 0, OPAQUE),
            Srgba::new(0, 0, 0, OPAQUE),
            Srgba::new(255, 255, 255, OPAQUE),
        ];
        stats.accumulate(&frame, &colors, 3, 1, true);
        let update = stats.apply(&mut centroids);

        assert_eq!(update.empty, 0);
        assert!(update.changed);
        for (actual, expected) in centroids[0].iter().zip([0.2, 0.2, 0.2]) {
            assert!((actual - expected).abs() < 1e-6);
        }
        assert_eq!(centroids[1], [0.9, 0.8, 0.7]);
    }

    #[test]
    fn empty_cluster_is_unchanged() {
        let mut centroids = [[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]];
        let mut stats = ClusterStats::new(&centroids);

        let colors = [[0.1, 0.1, 0.1]];
        let frame = [Srgba::new(0, 0, 0, OPAQUE)];
        stats.accumulate(&frame, &colors, 1, 1, true);
        let update = stats.apply(&mut centroids);

        assert_eq!(update.empty, 1);
        assert_eq!(centroids[1], [0.5, 0.5, 0.5]);
    }

    #[test]
    fn trailing_edge_is_skipped_by_default() {
        let mut centroids = [[0.0, 0.0, 0.0]];
        let mut stats = ClusterStats::new(&centroids);

        // 2x2 image where only the top-left pixel is counted
        let colors = [[0.2, 0.2, 0.2], [0.9, 0.9, 0.9], [0.9, 0.9, 0.9], [0.9, 0.9, 0.9]];
        let frame = [Srgba::new(0, 0, 0, OPAQUE); 4];
        stats.accumulate(&frame, &colors, 2, 2, false);
        stats.apply(&mut centroids);

        assert_eq!(centroids[0], [0.2, 0.2, 0.2]);
    }

    #[test]
    fn frame_rows_are_mirrored() {
        let mut centroids = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let mut stats = ClusterStats::new(&centroids);

        // 1x2 image: top pixel dark, bottom pixel light; the frame lists the bottom row first
        let colors = [[0.1, 0.1, 0.1], [0.9, 0.9, 0.9]];
        let frame = [Srgba::new(255, 255, 255, OPAQUE), Srgba::new(0, 0, 0, OPAQUE)];
        stats.accumulate(&frame, &colors, 1, 2, true);
        stats.apply(&mut centroids);

        assert_eq!(centroids, [[0.1, 0.1, 0.1], [0.9, 0.9, 0.9]]);
    }

    #[test]
    fn colliding_centroids_merge_into_the_last() {
        // both truncate to (0, 0, 0)
        let mut centroids = [[0.001, 0.001, 0.001], [0.002, 0.002, 0.002]];
        let mut stats = ClusterStats::new(&centroids);

        let colors = [[0.003, 0.003, 0.003]];
        let frame = [Srgba::new(0, 0, 0, OPAQUE)];
        stats.accumulate(&frame, &colors, 1, 1, true);
        let update = stats.apply(&mut centroids);

        assert_eq!(update.shadowed, 1);
        assert_eq!(update.empty, 1);
        assert_eq!(centroids[0], [0.001, 0.001, 0.001]);
        assert_eq!(centroids[1], [0.003, 0.003, 0.003]);
    }
}
