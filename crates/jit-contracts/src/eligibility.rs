//! Eligibility types produced by the policy analyzer (C1) and consumed by
//! the role catalog (C2) and activator (C3).

use serde::{Deserialize, Serialize};

use crate::ids::RoleBinding;

/// Which of the two recognized marker predicates applies to a binding.
///
/// A later design introduces a third variant, `ExternalApproval`; this
/// implementation follows the Self/Peer two-way split (see DESIGN.md, Open
/// Question 1) and does not expose it as a distinct variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActivationType {
    SelfApproval,
    PeerApproval,
}

/// Whether a temporary grant derived from an eligibility is presently in
/// effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EligibilityStatus {
    Available,
    Active,
}

/// A latent or currently-exercised permission.
///
/// Invariant: a given `(role_binding, activation_type)` appears at most once
/// in a user's `EligibilitySet` — if both an eligible and an active entry
/// would exist for the pair, only the `Active` one is retained (§4.1 merge
/// rule 3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Eligibility {
    pub role_binding: RoleBinding,
    pub activation_type: ActivationType,
    pub status: EligibilityStatus,
}

/// The result of an eligibility discovery call: a sorted set of
/// eligibilities plus any non-fatal warnings surfaced by the analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EligibilitySet {
    pub eligibilities: Vec<Eligibility>,
    pub warnings: Vec<String>,
}

impl EligibilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from an unordered collection, sorting per §4.1 merge
    /// rule 4 (resource full name, then role — the derived `Ord` on
    /// `Eligibility` compares `role_binding` first, matching that order).
    pub fn from_eligibilities(mut eligibilities: Vec<Eligibility>, warnings: Vec<String>) -> Self {
        eligibilities.sort();
        Self { eligibilities, warnings }
    }

    pub fn contains_role_binding(&self, role_binding: &RoleBinding, activation_type: ActivationType) -> bool {
        self.eligibilities
            .iter()
            .any(|e| &e.role_binding == role_binding && e.activation_type == activation_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rb(resource: &str, role: &str) -> RoleBinding {
        RoleBinding::new(resource, role)
    }

    #[test]
    fn eligibility_set_sorts_by_resource_then_role() {
        let set = EligibilitySet::from_eligibilities(
            vec![
                Eligibility {
                    role_binding: rb("proj-2", "roles/viewer"),
                    activation_type: ActivationType::SelfApproval,
                    status: EligibilityStatus::Available,
                },
                Eligibility {
                    role_binding: rb("proj-1", "roles/editor"),
                    activation_type: ActivationType::SelfApproval,
                    status: EligibilityStatus::Available,
                },
                Eligibility {
                    role_binding: rb("proj-1", "roles/viewer"),
                    activation_type: ActivationType::SelfApproval,
                    status: EligibilityStatus::Available,
                },
            ],
            vec![],
        );

        let resources: Vec<&str> = set.eligibilities.iter().map(|e| e.role_binding.resource.as_str()).collect();
        assert_eq!(resources, vec!["proj-1", "proj-1", "proj-2"]);
        assert_eq!(set.eligibilities[0].role_binding.role, "roles/editor");
        assert_eq!(set.eligibilities[1].role_binding.role, "roles/viewer");
    }
}
