//! `ActivationRequest` and its two concrete variants (§3, §9 Design Note 1).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eligibility::ActivationType;
use crate::ids::{RoleBinding, UserId};

/// Unique printable identifier for an activation request.
///
/// Carries the activation type as a prefix (`jit-` or `mpa-`) so a token
/// consumer can reject cross-type confusion without decoding the rest of
/// the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationId(pub String);

impl ActivationId {
    pub fn new(activation_type: ActivationType) -> Self {
        let prefix = match activation_type {
            ActivationType::SelfApproval => "jit",
            ActivationType::PeerApproval => "mpa",
        };
        Self(format!("{prefix}-{}", uuid::Uuid::new_v4()))
    }

    pub fn activation_type(&self) -> Option<ActivationType> {
        if self.0.starts_with("jit-") {
            Some(ActivationType::SelfApproval)
        } else if self.0.starts_with("mpa-") {
            Some(ActivationType::PeerApproval)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ActivationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A self-approval request. No reviewers; at least one entitlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitRequest {
    pub id: ActivationId,
    pub requesting_user: UserId,
    pub entitlements: Vec<RoleBinding>,
    pub justification: String,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
}

/// A peer-approval request. Exactly one entitlement; one or more reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpaRequest {
    pub id: ActivationId,
    pub requesting_user: UserId,
    pub entitlements: Vec<RoleBinding>,
    pub reviewers: Vec<UserId>,
    pub justification: String,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
}

impl MpaRequest {
    /// The single entitlement this request targets. Panics if the
    /// `|entitlements| == 1` invariant (enforced at construction by
    /// `Activator::create_mpa_request`) has somehow been violated.
    pub fn entitlement(&self) -> &RoleBinding {
        &self.entitlements[0]
    }
}

/// Tagged union over the two request kinds (§9 Design Note 1). The
/// activator dispatches on the tag rather than on a class hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ActivationRequest {
    Jit(JitRequest),
    Mpa(MpaRequest),
}

impl ActivationRequest {
    pub fn id(&self) -> &ActivationId {
        match self {
            Self::Jit(r) => &r.id,
            Self::Mpa(r) => &r.id,
        }
    }

    pub fn requesting_user(&self) -> &UserId {
        match self {
            Self::Jit(r) => &r.requesting_user,
            Self::Mpa(r) => &r.requesting_user,
        }
    }

    pub fn entitlements(&self) -> &[RoleBinding] {
        match self {
            Self::Jit(r) => &r.entitlements,
            Self::Mpa(r) => &r.entitlements,
        }
    }

    pub fn justification(&self) -> &str {
        match self {
            Self::Jit(r) => &r.justification,
            Self::Mpa(r) => &r.justification,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        match self {
            Self::Jit(r) => r.start_time,
            Self::Mpa(r) => r.start_time,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::Jit(r) => r.duration,
            Self::Mpa(r) => r.duration,
        }
    }

    pub fn activation_type(&self) -> ActivationType {
        match self {
            Self::Jit(_) => ActivationType::SelfApproval,
            Self::Mpa(_) => ActivationType::PeerApproval,
        }
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        let delta = chrono::Duration::from_std(self.duration()).ok()?;
        self.start_time().checked_add_signed(delta)
    }
}
