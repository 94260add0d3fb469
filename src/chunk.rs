//! Chunk payload decompression

use crate::error::{BagError, Result};
use crate::types::Compression;
use std::borrow::Cow;

/// Return the uncompressed payload of a chunk.
///
/// Uncompressed chunks are borrowed straight from `stored`. The result must
/// be exactly `uncompressed_size` bytes long.
pub fn decompress(
    compression: Compression,
    stored: &[u8],
    uncompressed_size: usize,
) -> Result<Cow<'_, [u8]>> {
    let data = match compression {
        Compression::None => Cow::Borrowed(stored),
        Compression::Lz4 => Cow::Owned(decompress_lz4(stored, uncompressed_size)?),
        Compression::Bz2 => Cow::Owned(decompress_bz2(stored, uncompressed_size)?),
    };

    if data.len() != uncompressed_size {
        return Err(BagError::compression(format!(
            "{compression} chunk decompressed to {} bytes, expected {uncompressed_size}",
            data.len()
        )));
    }

    log::trace!(
        "decompressed {compression} chunk: {} -> {} bytes",
        stored.len(),
        data.len()
    );
    Ok(data)
}

/// Upper bound on the buffer reserved before any output is produced
#[cfg(feature = "compression")]
const MAX_INITIAL_CAPACITY: usize = 16 * 1024 * 1024;

/// Read at most one byte past `uncompressed_size` so an oversized chunk is
/// reported by the size check instead of being inflated in full.
#[cfg(feature = "compression")]
fn read_bounded(
    decoder: impl std::io::Read,
    uncompressed_size: usize,
    compression: Compression,
) -> Result<Vec<u8>> {
    use std::io::Read;

    let limit = uncompressed_size as u64 + 1;
    let mut out = Vec::with_capacity(uncompressed_size.min(MAX_INITIAL_CAPACITY));
    decoder
        .take(limit)
        .read_to_end(&mut out)
        .map_err(|e| BagError::compression(format!("{compression} decompression failed: {e}")))?;
    Ok(out)
}

#[cfg(feature = "compression")]
fn decompress_lz4(stored: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    read_bounded(
        lz4_flex::frame::FrameDecoder::new(stored),
        uncompressed_size,
        Compression::Lz4,
    )
}

#[cfg(feature = "compression")]
fn decompress_bz2(stored: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    read_bounded(
        bzip2::read::BzDecoder::new(stored),
        uncompressed_size,
        Compression::Bz2,
    )
}

#[cfg(not(feature = "compression"))]
fn decompress_lz4(_stored: &[u8], _uncompressed_size: usize) -> Result<Vec<u8>> {
    Err(BagError::UnsupportedCompression {
        format: "lz4 (feature not enabled)".to_string(),
    })
}

#[cfg(not(feature = "compression"))]
fn decompress_bz2(_stored: &[u8], _uncompressed_size: usize) -> Result<Vec<u8>> {
    Err(BagError::UnsupportedCompression {
        format: "bz2 (feature not enabled)".to_string(),
    })
}
