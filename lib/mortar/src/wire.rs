//! Decoding of `/query` response bodies.
//!
//! A body is one LZ4 frame. Decompressed, it holds two Arrow IPC streams
//! written back to back: stream metadata first, timeseries data second. The
//! second stream starts right after the first stream's end-of-stream marker.
//! The reader stops quietly at the end of its input, so each stream must be
//! seen to end with the marker, and nothing may follow the second one.

use crate::errors::MortarError;
use log::debug;
use lz4_flex::frame::FrameDecoder;
use polars::prelude::{DataFrame, IpcStreamReader, PolarsError, SerReader};
use std::io::{Cursor, Read};

/// Continuation token followed by a zero message length.
pub const END_OF_STREAM: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00];

pub fn decode_response(
    body: &[u8],
    max_decompressed_bytes: u64,
) -> Result<(DataFrame, DataFrame), MortarError> {
    let decompressed = decompress(body, max_decompressed_bytes)?;
    decode_stream_pair(decompressed)
}

/// Reads at most one byte past the ceiling so oversize bodies are detected
/// without inflating them completely.
pub fn decompress(body: &[u8], max_decompressed_bytes: u64) -> Result<Vec<u8>, MortarError> {
    let mut decoder = FrameDecoder::new(body).take(max_decompressed_bytes.saturating_add(1));
    let mut decompressed = vec![];
    decoder
        .read_to_end(&mut decompressed)
        .map_err(MortarError::DecompressionError)?;
    if decompressed.len() as u64 > max_decompressed_bytes {
        return Err(MortarError::DecompressedSizeExceeded(max_decompressed_bytes));
    }
    debug!(
        "Decompressed {} byte response to {} bytes",
        body.len(),
        decompressed.len()
    );
    Ok(decompressed)
}

pub fn decode_stream_pair(decompressed: Vec<u8>) -> Result<(DataFrame, DataFrame), MortarError> {
    let total = decompressed.len();
    let mut cursor = Cursor::new(decompressed);
    let metadata = IpcStreamReader::new(&mut cursor)
        .finish()
        .map_err(MortarError::MetadataDecodeError)?;
    if !ends_with_marker(&cursor) {
        return Err(MortarError::MetadataDecodeError(truncated("metadata")));
    }
    debug!("Metadata stream ended at byte {} of {}", cursor.position(), total);
    let data = IpcStreamReader::new(&mut cursor)
        .finish()
        .map_err(MortarError::DataDecodeError)?;
    if !ends_with_marker(&cursor) {
        return Err(MortarError::DataDecodeError(truncated("data")));
    }
    if cursor.position() as usize != total {
        return Err(MortarError::DataDecodeError(PolarsError::ComputeError(
            format!(
                "{} trailing bytes after data stream",
                total - cursor.position() as usize
            )
            .into(),
        )));
    }
    Ok((metadata, data))
}

fn ends_with_marker(cursor: &Cursor<Vec<u8>>) -> bool {
    let end = cursor.position() as usize;
    end >= END_OF_STREAM.len() && cursor.get_ref()[end - END_OF_STREAM.len()..end] == END_OF_STREAM
}

fn truncated(stream: &str) -> PolarsError {
    PolarsError::ComputeError(
        format!("{} stream ended without an end-of-stream marker", stream).into(),
    )
}
