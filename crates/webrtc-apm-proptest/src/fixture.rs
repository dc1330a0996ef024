//! Persisted replay fixtures.
//!
//! One [`OutputData`] record per (reverse channels, near channels, rate)
//! case, stored as a native-endian `u32` byte count followed by a JSON
//! payload of exactly that many bytes.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Counters collected while replaying a far/near stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputData {
    pub has_echo_count: u32,
    pub has_voice_count: u32,
    pub is_saturated_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("fixture i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("fixture payload is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("fixture truncated: expected {expected} payload bytes, found {found}")]
    Truncated { expected: usize, found: usize },
}

/// File name for one replay case.
pub fn fixture_file_name(near_channels: usize, reverse_channels: usize, sample_rate_hz: u32) -> String {
    format!("output_data_n{near_channels}_r{reverse_channels}_{}k.bin", sample_rate_hz / 1000)
}

/// Serialize `data` with its size prefix.
pub fn encode(data: &OutputData) -> Result<Vec<u8>, FixtureError> {
    let payload = serde_json::to_vec(data)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        FixtureError::Io(io::Error::new(io::ErrorKind::InvalidInput, "payload too large"))
    })?;
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&len.to_ne_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parse a size-prefixed record.
pub fn decode(bytes: &[u8]) -> Result<OutputData, FixtureError> {
    let Some((prefix, rest)) = bytes.split_first_chunk::<4>() else {
        return Err(FixtureError::Truncated {
            expected: 4,
            found: bytes.len(),
        });
    };
    let expected = u32::from_ne_bytes(*prefix) as usize;
    if rest.len() < expected {
        return Err(FixtureError::Truncated {
            expected,
            found: rest.len(),
        });
    }
    Ok(serde_json::from_slice(&rest[..expected])?)
}

pub fn write_output_data(path: impl AsRef<Path>, data: &OutputData) -> Result<(), FixtureError> {
    let bytes = encode(data)?;
    let mut file = fs::File::create(path)?;
    file.write_all(&bytes)?;
    file.flush()?;
    Ok(())
}

pub fn read_output_data(path: impl AsRef<Path>) -> Result<OutputData, FixtureError> {
    let mut bytes = Vec::new();
    fs::File::open(path)?.read_to_end(&mut bytes)?;
    decode(&bytes)
}
