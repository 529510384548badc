//! # Record Format
//!
//! Binary framing for every value the Brain hands to a `Persistence` backend.
//!
//! Format: Header (6 bytes) + payload.
//! - 4 bytes: Magic ("BRAN")
//! - 1 byte: Version
//! - 1 byte: Payload encoding (postcard or JSON)
//!
//! Typed tables (nodes, graph aggregate, indices, HEAD) use postcard.
//! Deltas use JSON because their diffs carry arbitrary `serde_json::Value`s,
//! which postcard cannot deserialize.
//!
//! ## Validation
//!
//! Size and header are checked before the payload is parsed.

use crate::primitives;
use crate::types::BrainError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Maximum accepted record size. Validated before deserialization.
pub const MAX_RECORD_SIZE: usize = 256 * 1024 * 1024; // 256 MB

const HEADER_LEN: usize = 6;

// =============================================================================
// HEADER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Postcard,
    Json,
}

impl Encoding {
    const fn tag(self) -> u8 {
        match self {
            Self::Postcard => 0,
            Self::Json => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, BrainError> {
        match tag {
            0 => Ok(Self::Postcard),
            1 => Ok(Self::Json),
            other => Err(BrainError::DeserializationError(format!(
                "Unknown payload encoding: {other}"
            ))),
        }
    }
}

/// The header that precedes every record.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub encoding: Encoding,
}

impl RecordHeader {
    #[must_use]
    pub fn new(encoding: Encoding) -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
            encoding,
        }
    }

    pub fn validate(&self) -> Result<(), BrainError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(BrainError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(BrainError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes[5] = self.encoding.tag();
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BrainError> {
        let Some(header) = bytes.get(..HEADER_LEN) else {
            return Err(BrainError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
            encoding: Encoding::from_tag(header[5])?,
        })
    }
}

// =============================================================================
// ENCODE / DECODE
// =============================================================================

/// Frame a value as a record. Pure transformation, no I/O.
pub fn encode<T: Serialize + ?Sized>(value: &T, encoding: Encoding) -> Result<Vec<u8>, BrainError> {
    let payload = match encoding {
        Encoding::Postcard => postcard::to_stdvec(value)
            .map_err(|e| BrainError::SerializationError(e.to_string()))?,
        Encoding::Json => {
            serde_json::to_vec(value).map_err(|e| BrainError::SerializationError(e.to_string()))?
        }
    };

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&RecordHeader::new(encoding).to_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parse a record, whatever encoding its header names.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BrainError> {
    if bytes.len() > MAX_RECORD_SIZE {
        return Err(BrainError::DeserializationError(format!(
            "Record size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_RECORD_SIZE
        )));
    }

    let header = RecordHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = &bytes[HEADER_LEN..];
    match header.encoding {
        Encoding::Postcard => postcard::from_bytes(payload).map_err(|e| {
            BrainError::DeserializationError(format!("Failed to decode record: {e}"))
        }),
        Encoding::Json => serde_json::from_slice(payload).map_err(|e| {
            BrainError::DeserializationError(format!("Failed to decode record: {e}"))
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================
