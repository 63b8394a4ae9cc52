//! # Engine Primitives
//!
//! Hardcoded constants shared by the admission, reconciliation and client
//! paths. These are compiled into the binary and immutable at runtime.

/// Name of the FeatureGate that gates platform features by convention.
pub const SYSTEM_FEATURE_GATE: &str = "tkg-system";

/// Result message for a Feature deleted while still listed in a gate status.
pub const MSG_FEATURE_MISSING: &str = "Feature does not exist in cluster";

/// Result message for an intent that violates an immutable policy.
pub const MSG_IMMUTABLE: &str = "Feature could not be toggled because it is immutable";

/// Result message for an intent that would void the warranty without consent.
pub const MSG_VOIDS_WARRANTY: &str = "The stability level of this feature indicates that it \
     should not be activated in production environments. To activate the feature, you must \
     agree to permanently void all support guarantees for this environment by setting \
     featureRef.permanentlyVoidAllSupportGuarantees to true.";

/// Result message for an intent that was applied.
pub const MSG_APPLIED: &str = "Feature has been successfully toggled";

/// Magic bytes for persisted records.
///
/// - Record = Magic Bytes ("FGTE") + Version (u8) + postcard payload.
pub const MAGIC_BYTES: &[u8; 4] = b"FGTE";

/// Current record format version.
///
/// Increment this when making breaking changes to the record format.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum size of a single persisted record (1 MiB).
///
/// Checked before decoding so a corrupted length cannot drive allocation.
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// Upper bound on a single reconcile step, matching the controller default.
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;
