//! # jit-analyzer — Policy Analyzer (C1, §4.1)
//!
//! Transforms raw policy-analysis results into structured `Eligibility`
//! sets. All the domain logic — marker recognition, the resource/identity
//! filters, and the merge rules — lives here; `PolicyAnalysisClient`
//! (defined in `jit-core`) is the only outbound dependency.

pub mod markers;

use std::collections::BTreeSet;

use tracing::{debug, warn};

use jit_contracts::analysis::ConditionEvaluation;
use jit_contracts::cancellation::Cancellation;
use jit_contracts::eligibility::{ActivationType, Eligibility, EligibilitySet, EligibilityStatus};
use jit_contracts::error::JitResult;
use jit_contracts::ids::{ProjectId, RoleBinding, ScopeId, UserId};
use jit_core::traits::{EligibilityAnalyzer, PolicyAnalysisClient};

use markers::{classify, Classification};

/// The production `EligibilityAnalyzer` (C1): wraps a `PolicyAnalysisClient`
/// and the configured search scope.
pub struct PolicyEligibilityAnalyzer {
    client: Box<dyn PolicyAnalysisClient>,
    scope: ScopeId,
}

impl PolicyEligibilityAnalyzer {
    pub fn new(client: Box<dyn PolicyAnalysisClient>, scope: ScopeId) -> Self {
        Self { client, scope }
    }
}

/// True if `(classification, evaluation)` together designate a live
/// eligibility or active grant (§4.1 merging rules 1–2).
fn recognized(classification: Classification, evaluation: ConditionEvaluation) -> Option<EligibilityStatus> {
    match (classification, evaluation) {
        (Classification::Eligible(_), ConditionEvaluation::Conditional) => Some(EligibilityStatus::Available),
        (Classification::Active, ConditionEvaluation::True) => Some(EligibilityStatus::Active),
        // Active-but-false (expired) and eligible-but-true/false are not
        // recognized states (§4.1 merge rule 2: "Active-but-false
        // (expired) are discarded").
        _ => None,
    }
}

/// An `Active` classification carries no type of its own (§4.1 merge rule
/// 3); its type is the type of the eligible binding for the same
/// `role_binding`, if one was observed among the sibling candidates. With
/// no such sibling, it defaults to `SelfApproval`, since the self-approval
/// path is the only one that provisions without a separate eligible-binding
/// lookup.
fn resolve_activation_types(raw: Vec<(RoleBinding, Classification, EligibilityStatus)>) -> Vec<Eligibility> {
    use std::collections::HashMap;

    let mut type_by_role_binding: HashMap<RoleBinding, ActivationType> = HashMap::new();
    for (role_binding, classification, _) in &raw {
        if let Classification::Eligible(activation_type) = classification {
            type_by_role_binding.insert(role_binding.clone(), *activation_type);
        }
    }

    raw.into_iter()
        .map(|(role_binding, classification, status)| {
            let activation_type = match classification {
                Classification::Eligible(t) => t,
                Classification::Active => {
                    type_by_role_binding.get(&role_binding).copied().unwrap_or(ActivationType::SelfApproval)
                }
            };
            Eligibility { role_binding, activation_type, status }
        })
        .collect()
}

impl EligibilityAnalyzer for PolicyEligibilityAnalyzer {
    fn find_projects_with_eligibilities(
        &self,
        user: &UserId,
        cancellation: &Cancellation,
    ) -> JitResult<BTreeSet<ProjectId>> {
        let response =
            self.client.find_accessible_resources_by_user(&self.scope, user, None, None, true, cancellation)?;
        for warning in &response.warnings {
            warn!(user = %user.email, warning, "policy analyzer reported a non-fatal error");
        }

        let mut projects = BTreeSet::new();
        for result in &response.results {
            let Some(classification) = classify(result.binding.condition.as_ref()) else { continue };
            for acl in &result.acls {
                if recognized(classification, acl.condition_evaluation).is_none() {
                    continue;
                }
                for resource in &acl.resources {
                    if let Some(project) = ProjectId::from_full_resource_name(resource) {
                        projects.insert(project);
                    }
                }
            }
        }
        debug!(user = %user.email, project_count = projects.len(), "resolved projects with eligibilities");
        Ok(projects)
    }

    fn find_eligibilities(
        &self,
        user: &UserId,
        project: &ProjectId,
        types: &[ActivationType],
        statuses: &[EligibilityStatus],
        cancellation: &Cancellation,
    ) -> JitResult<EligibilitySet> {
        let resource_filter = project.full_resource_name();
        let response = self.client.find_accessible_resources_by_user(
            &self.scope,
            user,
            None,
            Some(&resource_filter),
            false,
            cancellation,
        )?;

        let mut raw = Vec::new();
        for result in &response.results {
            let Some(classification) = classify(result.binding.condition.as_ref()) else { continue };
            for acl in &result.acls {
                let Some(status) = recognized(classification, acl.condition_evaluation) else { continue };
                if !acl.resources.iter().any(|r| r == &resource_filter) {
                    continue;
                }
                raw.push((RoleBinding::new(resource_filter.clone(), result.binding.role.clone()), classification, status));
            }
        }

        let candidates = resolve_activation_types(raw);
        let merged = merge(candidates);
        let filtered: Vec<Eligibility> = merged
            .into_iter()
            .filter(|e| types.contains(&e.activation_type) && statuses.contains(&e.status))
            .collect();

        Ok(EligibilitySet::from_eligibilities(filtered, response.warnings))
    }

    fn find_reviewers(
        &self,
        role_binding: &RoleBinding,
        _activation_type: ActivationType,
        cancellation: &Cancellation,
    ) -> JitResult<BTreeSet<UserId>> {
        let principals = self.client.find_permissioned_principals_by_resource(
            &self.scope,
            &role_binding.resource,
            &role_binding.role,
            cancellation,
        )?;

        let reviewers = principals
            .into_iter()
            .filter_map(|principal| principal.strip_prefix("user:").map(|email| UserId::new(email, email)))
            .collect();
        Ok(reviewers)
    }
}

/// Merge rule 3 (§4.1): dedupe by `(role_binding, activation_type)`; when
/// both an eligible and an active entry exist for the pair, retain the
/// active one.
fn merge(candidates: Vec<Eligibility>) -> Vec<Eligibility> {
    use std::collections::HashMap;

    let mut by_key: HashMap<(RoleBinding, ActivationType), Eligibility> = HashMap::new();
    for candidate in candidates {
        let key = (candidate.role_binding.clone(), candidate.activation_type);
        by_key
            .entry(key)
            .and_modify(|existing| {
                if candidate.status == EligibilityStatus::Active {
                    existing.status = EligibilityStatus::Active;
                }
            })
            .or_insert(candidate);
    }
    by_key.into_values().collect()
}
