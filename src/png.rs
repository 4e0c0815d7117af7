//! Writing of palette-indexed PNG files.
//!
//! The output always consists of the PNG signature followed by exactly four chunks:
//! `IHDR` (8-bit depth, indexed color, no interlacing), `PLTE`, a single `IDAT` with the zlib
//! compressed scanlines (each prefixed with filter type `0`), and an empty `IEND`.
//! Every chunk is laid out as `length | type | data | crc`, with big-endian integers and the
//! CRC-32 computed over the type and data.

use crate::EncodeError;
use flate2::{write::ZlibEncoder, Compression, Crc};
use palette::Srgb;
use std::{fmt::Display, io::Write};

/// The 8-byte PNG file signature.
pub const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// The largest length a chunk or image dimension may have.
const MAX_LENGTH: u32 = (1 << 31) - 1;

/// The PNG color type for palette-indexed images.
const COLOR_TYPE_INDEXED: u8 = 3;

/// The four-letter ASCII tag identifying a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkType(pub [u8; 4]);

impl ChunkType {
    /// The image header.
    pub const IHDR: Self = Self(*b"IHDR");
    /// The palette.
    pub const PLTE: Self = Self(*b"PLTE");
    /// The compressed image data.
    pub const IDAT: Self = Self(*b"IDAT");
    /// The end marker.
    pub const IEND: Self = Self(*b"IEND");
}

impl Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// A chunk borrowed from an encoded PNG buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// The chunk tag.
    pub chunk_type: ChunkType,
    /// The chunk payload.
    pub data: &'a [u8],
    /// The stored CRC-32.
    pub crc: u32,
}

impl Chunk<'_> {
    /// Computes the CRC-32 of a chunk type followed by its data.
    #[must_use]
    pub fn compute_crc(chunk_type: ChunkType, data: &[u8]) -> u32 {
        let mut crc = Crc::new();
        crc.update(&chunk_type.0);
        crc.update(data);
        crc.sum()
    }

    /// Whether the stored CRC matches the chunk type and data.
    #[must_use]
    pub fn crc_is_valid(&self) -> bool {
        Self::compute_crc(self.chunk_type, self.data) == self.crc
    }
}

/// An iterator over the chunks of a PNG buffer, created by [`chunks`].
///
/// Iteration stops at the end of the buffer or at a truncated chunk.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    /// The bytes after the last chunk read.
    rest: &'a [u8],
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (length, rest) = self.rest.split_first_chunk::<4>()?;
        let (chunk_type, rest) = rest.split_first_chunk::<4>()?;
        let length = u32::from_be_bytes(*length) as usize;
        if rest.len() < length + 4 {
            self.rest = &[];
            return None;
        }

        let (data, rest) = rest.split_at(length);
        let (crc, rest) = rest.split_first_chunk::<4>()?;
        self.rest = rest;

        Some(Chunk {
            chunk_type: ChunkType(*chunk_type),
            data,
            crc: u32::from_be_bytes(*crc),
        })
    }
}

/// Returns an iterator over the chunks of `bytes`, or `None` if it does not start with [`SIGNATURE`].
#[must_use]
pub fn chunks(bytes: &[u8]) -> Option<Chunks<'_>> {
    bytes
        .strip_prefix(&SIGNATURE)
        .map(|rest| Chunks { rest })
}

/// Appends one chunk to `out`.
fn write_chunk(out: &mut Vec<u8>, chunk_type: ChunkType, data: &[u8]) -> Result<(), EncodeError> {
    let length = u32::try_from(data.len())
        .ok()
        .filter(|&len| len <= MAX_LENGTH)
        .ok_or_else(|| EncodeError::ChunkTooLarge {
            chunk_type: chunk_type.to_string(),
            len: data.len(),
        })?;

    out.reserve(12 + data.len());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&chunk_type.0);
    out.extend_from_slice(data);
    out.extend_from_slice(&Chunk::compute_crc(chunk_type, data).to_be_bytes());
    Ok(())
}

/// Writes palette-indexed images as PNG files.
///
/// # Examples
/// ```
/// # use clusterquant::png::PngEncoder;
/// # use palette::Srgb;
/// # fn main() -> Result<(), clusterquant::EncodeError> {
/// let palette = [Srgb::new(0, 0, 0), Srgb::new(255, 255, 255)];
/// let indices = [0, 1, 1, 0];
/// let bytes = PngEncoder::new().encode(&indices, &palette, 2, 2)?;
/// assert_eq!(bytes[..8], clusterquant::png::SIGNATURE);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngEncoder {
    /// The zlib compression level for the image data.
    compression: Compression,
}

impl Default for PngEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PngEncoder {
    /// Creates a new [`PngEncoder`] with the default compression level.
    #[must_use]
    pub fn new() -> Self {
        Self { compression: Compression::default() }
    }

    /// Sets the zlib compression level for the image data.
    #[must_use]
    pub const fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Encodes `indices`, a row-major `width x height` buffer of indices into `palette`.
    ///
    /// # Errors
    /// Fails if the dimensions are zero, larger than `2^31 - 1`, or do not match `indices`,
    /// if `palette` is empty or has more than 256 colors, if an index is out of range for
    /// `palette`, or if compression fails.
    pub fn encode(
        &self,
        indices: &[u8],
        palette: &[Srgb<u8>],
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, EncodeError> {
        let pixels = u64::from(width) * u64::from(height);
        if width == 0
            || height == 0
            || width > MAX_LENGTH
            || height > MAX_LENGTH
            || indices.len() as u64 != pixels
        {
            return Err(EncodeError::InvalidDimensions { width, height, len: indices.len() });
        }
        if palette.is_empty() || palette.len() > 256 {
            return Err(EncodeError::PaletteSize(palette.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| usize::from(i) >= palette.len()) {
            return Err(EncodeError::IndexOutOfRange { index, palette_len: palette.len() });
        }

        let mut header = Vec::with_capacity(13);
        header.extend_from_slice(&width.to_be_bytes());
        header.extend_from_slice(&height.to_be_bytes());
        header.extend_from_slice(&[8, COLOR_TYPE_INDEXED, 0, 0, 0]);

        let plte = palette
            .iter()
            .flat_map(|c| [c.red, c.green, c.blue])
            .collect::<Vec<_>>();

        let idat = self.compress(indices, width as usize)?;

        let mut out = Vec::with_capacity(SIGNATURE.len() + 4 * 12 + header.len() + plte.len() + idat.len());
        out.extend_from_slice(&SIGNATURE);
        write_chunk(&mut out, ChunkType::IHDR, &header)?;
        write_chunk(&mut out, ChunkType::PLTE, &plte)?;
        write_chunk(&mut out, ChunkType::IDAT, &idat)?;
        write_chunk(&mut out, ChunkType::IEND, &[])?;

        tracing::debug!(
            width,
            height,
            colors = palette.len(),
            compressed = idat.len(),
            bytes = out.len(),
            "encoded indexed png"
        );

        Ok(out)
    }

    /// Prefixes each row with the "none" filter type and compresses the result as a zlib stream.
    fn compress(&self, indices: &[u8], width: usize) -> Result<Vec<u8>, EncodeError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.compression);
        for row in indices.chunks_exact(width) {
            encoder.write_all(&[0])?;
            encoder.write_all(row)?;
        }
        Ok(encoder.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use std::io::Read;

    struct Decoded {
        width: u32,
        height: u32,
        color_type: ::png::ColorType,
        bit_depth: ::png::BitDepth,
        palette: Vec<u8>,
        indices: Vec<u8>,
    }

    fn decode(bytes: &[u8]) -> Decoded {
        let mut decoder = ::png::Decoder::new(bytes);
        decoder.set_transformations(::png::Transformations::IDENTITY);
        let mut reader = decoder.read_info().unwrap();
        let mut indices = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut indices).unwrap();
        indices.truncate(info.buffer_size());
        let palette = reader.info().palette.as_deref().unwrap().to_vec();

        Decoded {
            width: info.width,
            height: info.height,
            color_type: info.color_type,
            bit_depth: info.bit_depth,
            palette,
            indices,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn checker(width: u32, height: u32, colors: u8) -> Vec<u8> {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x + 3 * y) % u32::from(colors)) as u8))
            .collect()
    }

    #[test]
    fn round_trip_through_png_decoder() {
        let palette = test_data_256()[..7].to_vec();
        let (width, height) = (13, 5);
        let indices = checker(width, height, 7);

        let bytes = PngEncoder::new().encode(&indices, &palette, width, height).unwrap();
        let decoded = decode(&bytes);

        assert_eq!((decoded.width, decoded.height), (width, height));
        assert_eq!(decoded.color_type, ::png::ColorType::Indexed);
        assert_eq!(decoded.bit_depth, ::png::BitDepth::Eight);
        assert_eq!(
            decoded.palette,
            palette.iter().flat_map(|c| [c.red, c.green, c.blue]).collect::<Vec<_>>()
        );
        assert_eq!(decoded.indices, indices);
    }

    #[test]
    fn full_palette_round_trip() {
        let palette = test_data_256();
        let indices = checker(64, 16, u8::MAX).into_iter().chain(0..=255).collect::<Vec<_>>();
        let bytes = PngEncoder::new()
            .compression(Compression::best())
            .encode(&indices, &palette, 64, 20)
            .unwrap();

        assert_eq!(decode(&bytes).indices, indices);
    }

    #[test]
    fn exactly_four_chunks_with_valid_crcs() {
        let palette = [Srgb::new(1, 2, 3), Srgb::new(4, 5, 6)];
        let bytes = PngEncoder::new().encode(&[0, 1, 1, 0, 0, 1], &palette, 3, 2).unwrap();

        let chunks = chunks(&bytes).unwrap().collect::<Vec<_>>();
        let types = chunks.iter().map(|c| c.chunk_type).collect::<Vec<_>>();
        assert_eq!(types, [ChunkType::IHDR, ChunkType::PLTE, ChunkType::IDAT, ChunkType::IEND]);
        assert!(chunks.iter().all(Chunk::crc_is_valid));

        assert_eq!(chunks[0].data, [0, 0, 0, 3, 0, 0, 0, 2, 8, 3, 0, 0, 0]);
        assert_eq!(chunks[1].data, [1, 2, 3, 4, 5, 6]);
        assert!(chunks[3].data.is_empty());

        let mut raw = Vec::new();
        flate2::read::ZlibDecoder::new(chunks[2].data).read_to_end(&mut raw).unwrap();
        assert_eq!(raw, [0, 0, 1, 1, 0, 0, 0, 1]);
    }

    #[test]
    fn byte_exact_layout() {
        let bytes = PngEncoder::new().encode(&[0], &[Srgb::new(9, 9, 9)], 1, 1).unwrap();

        assert_eq!(bytes[..8], SIGNATURE);
        // IHDR length and tag
        assert_eq!(bytes[8..16], [0, 0, 0, 13, b'I', b'H', b'D', b'R']);
        // the empty IEND chunk has a well known CRC
        assert_eq!(
            bytes[(bytes.len() - 12)..],
            [0, 0, 0, 0, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82]
        );
    }

    #[test]
    fn corrupted_chunk_fails_crc() {
        let mut bytes = PngEncoder::new().encode(&[0, 0], &[Srgb::new(9, 9, 9)], 2, 1).unwrap();
        // first PLTE data byte: signature + IHDR (25) + length and tag (8)
        bytes[8 + 25 + 8] ^= 0xFF;
        let chunks = chunks(&bytes).unwrap().collect::<Vec<_>>();
        assert!(chunks[0].crc_is_valid());
        assert!(!chunks[1].crc_is_valid());
    }

    #[test]
    fn rejects_invalid_input() {
        let palette = [Srgb::new(0, 0, 0)];
        let encoder = PngEncoder::new();

        assert!(matches!(
            encoder.encode(&[], &palette, 0, 0),
            Err(EncodeError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            encoder.encode(&[0; 3], &palette, 2, 2),
            Err(EncodeError::InvalidDimensions { .. })
        ));
        assert!(matches!(encoder.encode(&[0; 4], &[], 2, 2), Err(EncodeError::PaletteSize(0))));
        assert!(matches!(
            encoder.encode(&[0; 4], &vec![Srgb::new(0, 0, 0); 257], 2, 2),
            Err(EncodeError::PaletteSize(257))
        ));
        assert!(matches!(
            encoder.encode(&[0, 1, 0, 0], &palette, 2, 2),
            Err(EncodeError::IndexOutOfRange { index: 1, palette_len: 1 })
        ));
    }

    #[test]
    fn chunks_requires_signature() {
        assert!(chunks(b"not a png").is_none());
        assert_eq!(chunks(&SIGNATURE).unwrap().count(), 0);
    }
}
