//! `u32 BE uncompressed length ‖ zlib stream` framing.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use keyward_core::{KeywardError, KeywardResult};
use std::io::{Read, Write};

const LENGTH_PREFIX: usize = 4;

/// Compress `data` at the best compression level.
pub fn pack(data: &[u8]) -> KeywardResult<Vec<u8>> {
    let len = u32::try_from(data.len())
        .map_err(|_| KeywardError::Serialization(format!("payload too large: {} bytes", data.len())))?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX + data.len() / 2);
    out.extend_from_slice(&len.to_be_bytes());
    let mut encoder = ZlibEncoder::new(out, Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`pack`]. Anything that does not inflate to exactly the
/// announced length is treated as a wrong key or corrupt data.
pub fn unpack(packed: &[u8]) -> KeywardResult<Vec<u8>> {
    if packed.len() < LENGTH_PREFIX {
        return Err(KeywardError::WrongPasswordOrCorruptData);
    }
    let (prefix, stream) = packed.split_at(LENGTH_PREFIX);
    let mut announced = [0u8; LENGTH_PREFIX];
    announced.copy_from_slice(prefix);
    let announced = u32::from_be_bytes(announced) as usize;

    let mut data = Vec::new();
    ZlibDecoder::new(stream)
        .read_to_end(&mut data)
        .map_err(|e| {
            tracing::debug!("inflate failed: {e}");
            KeywardError::WrongPasswordOrCorruptData
        })?;
    if data.len() != announced {
        tracing::debug!(announced, actual = data.len(), "inflated length mismatch");
        return Err(KeywardError::WrongPasswordOrCorruptData);
    }
    Ok(data)
}
