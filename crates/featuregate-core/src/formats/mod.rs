//! # Record Formats
//!
//! Binary encoding of persisted Features and FeatureGates.

pub mod record;

pub use record::{RecordHeader, decode_record, encode_record};
