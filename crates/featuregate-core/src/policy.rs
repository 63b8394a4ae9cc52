//! # Stability Policy Table
//!
//! Hardcoded mapping from `StabilityLevel` to `Policy`.
//!
//! The table is compiled into the binary and immutable at runtime. Lookups
//! are pure and lock-free, so any number of callers may use them concurrently.
//!
//! | Level             | default | immutable | voids warranty | discoverable |
//! |-------------------|---------|-----------|----------------|--------------|
//! | Work In Progress  | off     | no        | yes            | no           |
//! | Experimental      | off     | no        | yes            | yes          |
//! | Technical Preview | off     | no        | no             | yes          |
//! | Stable            | on      | yes       | no             | yes          |
//! | Deprecated        | on      | no        | no             | yes          |
//!
//! An `Unrecognized` level fails closed: it stays off and cannot be turned on.

use crate::StabilityLevel;
use serde::{Deserialize, Serialize};

/// Activation rules attached to a stability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Activation state when no FeatureGate expresses an intent.
    pub default_activation: bool,
    /// Activation can never differ from `default_activation`.
    pub immutable: bool,
    /// Deviating from `default_activation` requires irrevocable consent.
    pub voids_warranty: bool,
    /// Listing concern only; not enforced by this crate.
    pub discoverable: bool,
}

impl Policy {
    /// Whether `activate` differs from the default.
    #[must_use]
    pub const fn deviates(&self, activate: bool) -> bool {
        activate != self.default_activation
    }

    /// Whether `activate` is forbidden because the level is immutable.
    #[must_use]
    pub const fn forbids(&self, activate: bool) -> bool {
        self.immutable && self.deviates(activate)
    }

    /// Whether `activate` needs consent that has not been given yet.
    #[must_use]
    pub const fn needs_warranty_consent(&self, activate: bool, consented: bool) -> bool {
        self.voids_warranty && !consented && self.deviates(activate)
    }
}

const WORK_IN_PROGRESS: Policy = Policy {
    default_activation: false,
    immutable: false,
    voids_warranty: true,
    discoverable: false,
};

const EXPERIMENTAL: Policy = Policy {
    default_activation: false,
    immutable: false,
    voids_warranty: true,
    discoverable: true,
};

const TECHNICAL_PREVIEW: Policy = Policy {
    default_activation: false,
    immutable: false,
    voids_warranty: false,
    discoverable: true,
};

const STABLE: Policy = Policy {
    default_activation: true,
    immutable: true,
    voids_warranty: false,
    discoverable: true,
};

const DEPRECATED: Policy = Policy {
    default_activation: true,
    immutable: false,
    voids_warranty: false,
    discoverable: true,
};

/// Deactivated and locked.
const FAIL_CLOSED: Policy = Policy {
    default_activation: false,
    immutable: true,
    voids_warranty: false,
    discoverable: false,
};

/// Look up the policy for a stability level.
#[must_use]
pub const fn policy_for(level: StabilityLevel) -> Policy {
    match level {
        StabilityLevel::WorkInProgress => WORK_IN_PROGRESS,
        StabilityLevel::Experimental => EXPERIMENTAL,
        StabilityLevel::TechnicalPreview => TECHNICAL_PREVIEW,
        StabilityLevel::Stable => STABLE,
        StabilityLevel::Deprecated => DEPRECATED,
        StabilityLevel::Unrecognized => FAIL_CLOSED,
    }
}

impl StabilityLevel {
    /// The policy attached to this level.
    #[must_use]
    pub const fn policy(self) -> Policy {
        policy_for(self)
    }
}
