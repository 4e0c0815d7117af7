//! Merging of near-duplicate palette colors.

use palette::cast::{self, ArrayCast};

/// Squared euclidean distance between two colors.
fn squared_distance(x: [f32; 3], y: [f32; 3]) -> f32 {
    let mut dist = 0.0;
    for c in 0..3 {
        let d = x[c] - y[c];
        dist += d * d;
    }
    dist
}

/// Removes palette colors that lie within `epsilon` squared distance of an earlier color.
///
/// The first remaining color is kept and every other remaining color whose squared distance to
/// it is less than or equal to `epsilon` is dropped; this repeats until no colors remain.
/// The kept colors are returned in their original order, so the result is never longer than
/// `palette`. With an `epsilon` of `0.0` only exact duplicates are removed.
///
/// # Examples
/// ```
/// # use clusterquant::condense;
/// # use palette::Srgb;
/// let palette = [Srgb::new(0u8, 0, 0), Srgb::new(0, 0, 0), Srgb::new(10, 10, 10)];
/// let condensed = condense(&palette, 0.0);
/// assert_eq!(condensed, vec![Srgb::new(0, 0, 0), Srgb::new(10, 10, 10)]);
/// ```
#[must_use]
pub fn condense<Color, Component>(palette: &[Color], epsilon: f32) -> Vec<Color>
where
    Color: ArrayCast<Array = [Component; 3]> + Copy,
    Component: Copy + Into<f32>,
{
    let mut remaining = palette.to_vec();
    let mut condensed = Vec::with_capacity(palette.len());

    while !remaining.is_empty() {
        let representative = remaining.remove(0);
        let point = cast::into_array(representative).map(Into::into);
        remaining.retain(|&color| {
            squared_distance(point, cast::into_array(color).map(Into::into)) > epsilon
        });
        condensed.push(representative);
    }

    tracing::debug!(from = palette.len(), to = condensed.len(), epsilon, "condensed palette");

    condensed
}
