//! # Record Format
//!
//! Binary serialization for persisted resources.
//!
//! Format: Header (5 bytes) + postcard-serialized object.
//! - 4 bytes: Magic ("FGTE")
//! - 1 byte: Version
//!
//! The record size is checked against `MAX_RECORD_SIZE` before the payload is
//! decoded, and a bad header is rejected before postcard sees any bytes.

use crate::{FeatureGateError, primitives};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Header length in bytes.
const HEADER_LEN: usize = 5;

/// The header that precedes every record payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl RecordHeader {
    /// Create a header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate magic and version.
    pub fn validate(&self) -> Result<(), FeatureGateError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(FeatureGateError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(FeatureGateError::DeserializationError(format!(
                "Unsupported record version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FeatureGateError> {
        if bytes.len() < HEADER_LEN {
            return Err(FeatureGateError::DeserializationError(
                "Record header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for RecordHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize an object to record bytes (header + payload).
pub fn encode_record<T: Serialize>(value: &T) -> Result<Vec<u8>, FeatureGateError> {
    let payload = postcard::to_stdvec(value)
        .map_err(|e| FeatureGateError::SerializationError(e.to_string()))?;
    if payload.len() + HEADER_LEN > primitives::MAX_RECORD_SIZE {
        return Err(FeatureGateError::SerializationError(format!(
            "record of {} bytes exceeds maximum {}",
            payload.len() + HEADER_LEN,
            primitives::MAX_RECORD_SIZE
        )));
    }

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&RecordHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Deserialize an object from record bytes.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FeatureGateError> {
    if bytes.len() > primitives::MAX_RECORD_SIZE {
        return Err(FeatureGateError::DeserializationError(format!(
            "record of {} bytes exceeds maximum {}",
            bytes.len(),
            primitives::MAX_RECORD_SIZE
        )));
    }
    RecordHeader::from_bytes(bytes)?.validate()?;
    postcard::from_bytes(&bytes[HEADER_LEN..])
        .map_err(|e| FeatureGateError::DeserializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Feature, FeatureGate, FeatureReference, FeatureReferenceResult, ReferenceStatus,
        StabilityLevel,
    };

    #[test]
    fn gate_with_status_survives_encoding() {
        let mut gate = FeatureGate::new(
            "tkg-system",
            vec![FeatureReference::new("foo", true).voiding_warranty()],
        );
        gate.metadata.resource_version = 7;
        gate.status.upsert(FeatureReferenceResult {
            name: "foo".to_string(),
            status: ReferenceStatus::Applied,
            message: primitives::MSG_APPLIED.to_string(),
        });

        let bytes = encode_record(&gate).expect("encode");
        let back: FeatureGate = decode_record(&bytes).expect("decode");
        assert_eq!(back, gate);
    }

    #[test]
    fn bad_magic_rejected() {
        let feature = Feature::new("foo", "foo", StabilityLevel::Stable);
        let mut bytes = encode_record(&feature).expect("encode");
        bytes[0] = b'X';
        let result: Result<Feature, _> = decode_record(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn future_version_rejected() {
        let feature = Feature::new("foo", "foo", StabilityLevel::Stable);
        let mut bytes = encode_record(&feature).expect("encode");
        bytes[4] = primitives::FORMAT_VERSION + 1;
        let result: Result<Feature, _> = decode_record(&bytes);
        assert!(matches!(
            result,
            Err(FeatureGateError::DeserializationError(_))
        ));
    }

    #[test]
    fn truncated_header_rejected() {
        let result: Result<Feature, _> = decode_record(b"FGT");
        assert!(result.is_err());
    }
}
