//! Error types returned by the clustering, dithering, and encoding stages.

use thiserror::Error;

/// An error raised while building the nearest-centroid assignment kernel.
///
/// Both variants are fatal: the pipeline aborts and nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// The kernel program could not be built for the requested number of clusters.
    #[error("failed to compile assignment kernel: {0}")]
    Compile(String),
    /// The kernel program could not be attached to a frame of the requested size.
    #[error("failed to link assignment kernel: {0}")]
    Link(String),
}

/// An error raised while writing the indexed PNG container.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The zlib stream for the image data chunk could not be produced.
    #[error("failed to compress image data: {0}")]
    Compression(#[from] std::io::Error),

    /// PNG images must have a non-zero width and height that fit in 31 bits,
    /// and the index buffer must hold exactly `width * height` entries.
    #[error("invalid dimensions {width}x{height} for {len} indices")]
    InvalidDimensions { width: u32, height: u32, len: usize },

    /// A palette must hold between 1 and 256 colors.
    #[error("palette of {0} colors cannot be written (expected 1..=256)")]
    PaletteSize(usize),

    /// An index buffer entry does not address a palette color.
    #[error("index {index} is out of range for a palette of {palette_len} colors")]
    IndexOutOfRange { index: u8, palette_len: usize },

    /// Chunk payloads are limited to `2^31 - 1` bytes.
    #[error("{chunk_type} chunk of {len} bytes exceeds the maximum chunk length")]
    ChunkTooLarge { chunk_type: String, len: usize },
}

/// The error type for the pipeline as a whole.
#[derive(Debug, Error)]
pub enum Error {
    /// See [`KernelError`].
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// See [`EncodeError`].
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The pixel buffer does not hold `width * height` pixels.
    #[error("pixel buffer of {len} pixels does not match dimensions {width}x{height}")]
    InvalidImage { width: u32, height: u32, len: usize },

    /// Dithering and encoding need at least one palette color.
    #[error("palette is empty")]
    EmptyPalette,

    /// A length exceeded a supported maximum.
    #[error(transparent)]
    AboveMaxLen(#[from] crate::AboveMaxLen<u32>),
}
