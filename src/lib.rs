//! A library for reducing an image to a small color palette and writing it as a dithered,
//! palette-indexed PNG.
//!
//! The work is split into four stages, each usable on its own:
//! - [`kmeans`]: iterative nearest-centroid clustering whose per-pixel assignment step runs as a
//!   data-parallel kernel behind the [`ComputeContext`](kmeans::ComputeContext) trait.
//! - [`condense`]: merges near-duplicate palette colors.
//! - [`FloydSteinberg`]: error diffusion dithering that maps each pixel to a palette index.
//! - [`png`]: writes the palette and index buffer as an indexed-color PNG.
//!
//! # Features
//! - `pipelines`: exposes the [`ImagePipeline`] builder that chains the stages together.
//! - `threads`: runs the assignment kernel in parallel via [`rayon`].
//! - `image`: enables integration with the [`image`] crate.
//! - `cli`: builds the `compress-image` binary.
//!
//! # High-Level API
//! ```no_run
//! # use clusterquant::{ImageBuf, ImagePipeline, KmeansOptions};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = image::open("some image")?.into_rgba8();
//!
//! let png = ImagePipeline::new(ImageBuf::try_from(img)?)
//!     .palette_size(64.into())
//!     .epsilon(2.0)
//!     .kmeans(KmeansOptions::new().iterations(8).seed(42))
//!     .encode_png()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::unreadable_literal,
    clippy::wildcard_imports
)]

mod dither;
mod error;
mod types;

#[cfg(feature = "pipelines")]
mod api;

pub mod condense;
pub mod kmeans;
pub mod png;

pub use condense::condense;
pub use dither::FloydSteinberg;
pub use kmeans::KmeansOptions;
pub use error::*;
pub use types::*;

#[cfg(feature = "pipelines")]
pub use api::*;

/// The maximum supported image size in number of pixels is `u32::MAX`.
pub const MAX_PIXELS: u32 = u32::MAX;

/// The maximum supported number of palette colors is `256`.
pub const MAX_COLORS: u16 = u8::MAX as u16 + 1;

/// `MAX_COLORS` as a `usize` for array and `Vec` lengths.
pub(crate) const MAX_K: usize = MAX_COLORS as usize;
