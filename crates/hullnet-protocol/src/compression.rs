//! Deflate compression for large payloads.
//!
//! Raw deflate (no zlib or gzip wrapper) via `flate2`. Small control and
//! state messages skip this entirely; see [`COMPRESSION_THRESHOLD`].
//!
//! [`COMPRESSION_THRESHOLD`]: crate::COMPRESSION_THRESHOLD

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::ProtocolError;

/// Deflates `data` with the fastest compression level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::fast());
    encoder.write_all(data).map_err(ProtocolError::Compression)?;
    encoder.finish().map_err(ProtocolError::Compression)
}

/// Inflates `data`, refusing output longer than `max_len` bytes.
///
/// The cap is what stops a tiny datagram from expanding into an
/// arbitrarily large allocation.
pub fn decompress(data: &[u8], max_len: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::new();
    DeflateDecoder::new(data)
        .take(max_len as u64 + 1)
        .read_to_end(&mut out)
        .map_err(ProtocolError::Compression)?;
    if out.len() > max_len {
        return Err(ProtocolError::MessageTooLarge {
            length: out.len(),
            max: max_len,
        });
    }
    Ok(out)
}
