//! # jit-catalog — Role Catalog (C2, §4.2)
//!
//! The query-facing façade: lists projects, eligibilities, and candidate
//! reviewers for a user, and provides the `verify_user_can_request` /
//! `verify_user_can_approve` guards the activator relies on.

use std::collections::BTreeSet;

use tracing::debug;

use jit_contracts::cancellation::Cancellation;
use jit_contracts::eligibility::{ActivationType, Eligibility, EligibilityStatus, EligibilitySet};
use jit_contracts::error::{JitError, JitResult};
use jit_contracts::ids::{ProjectId, UserId};
use jit_contracts::request::ActivationRequest;
use jit_contracts::request::MpaRequest;
use jit_core::traits::{EligibilityAnalyzer, ResourceManagerClient, RoleCatalog};

/// The production `RoleCatalog` (C2). `project_query`, when set, makes
/// `list_projects` delegate to the resource manager's search instead of
/// policy analysis (§4.2, §6 `projectQuery`).
pub struct ProjectRoleCatalog {
    analyzer: Box<dyn EligibilityAnalyzer>,
    resource_manager: Box<dyn ResourceManagerClient>,
    project_query: Option<String>,
}

impl ProjectRoleCatalog {
    pub fn new(
        analyzer: Box<dyn EligibilityAnalyzer>,
        resource_manager: Box<dyn ResourceManagerClient>,
        project_query: Option<String>,
    ) -> Self {
        Self { analyzer, resource_manager, project_query }
    }

    fn project_of(&self, resource: &str) -> JitResult<ProjectId> {
        ProjectId::from_full_resource_name(resource)
            .ok_or_else(|| JitError::NotFound { what: format!("project resource '{resource}'") })
    }
}

const ALL_TYPES: [ActivationType; 2] = [ActivationType::SelfApproval, ActivationType::PeerApproval];
const ALL_STATUSES: [EligibilityStatus; 2] = [EligibilityStatus::Available, EligibilityStatus::Active];

impl RoleCatalog for ProjectRoleCatalog {
    fn list_projects(&self, user: &UserId, cancellation: &Cancellation) -> JitResult<BTreeSet<ProjectId>> {
        match &self.project_query {
            Some(query) => self.resource_manager.search_project_ids(query, cancellation),
            None => self.analyzer.find_projects_with_eligibilities(user, cancellation),
        }
    }

    fn list_eligibilities(
        &self,
        user: &UserId,
        project: &ProjectId,
        cancellation: &Cancellation,
    ) -> JitResult<EligibilitySet> {
        self.analyzer.find_eligibilities(user, project, &ALL_TYPES, &ALL_STATUSES, cancellation)
    }

    fn list_reviewers(
        &self,
        requesting_user: &UserId,
        eligibility: &Eligibility,
        cancellation: &Cancellation,
    ) -> JitResult<BTreeSet<UserId>> {
        let project = self.project_of(&eligibility.role_binding.resource)?;
        let own_set = self.analyzer.find_eligibilities(
            requesting_user,
            &project,
            &[eligibility.activation_type],
            &ALL_STATUSES,
            cancellation,
        )?;
        if !own_set.contains_role_binding(&eligibility.role_binding, eligibility.activation_type) {
            return Err(JitError::AccessDenied {
                reason: format!("not eligible for {} via {:?}", eligibility.role_binding.role, eligibility.activation_type),
            });
        }

        let mut reviewers =
            self.analyzer.find_reviewers(&eligibility.role_binding, eligibility.activation_type, cancellation)?;
        reviewers.remove(requesting_user);
        Ok(reviewers)
    }

    fn verify_user_can_request(
        &self,
        user: &UserId,
        request: &ActivationRequest,
        cancellation: &Cancellation,
    ) -> JitResult<()> {
        let activation_type = request.activation_type();
        for entitlement in request.entitlements() {
            let project = self.project_of(&entitlement.resource)?;
            let set =
                self.analyzer.find_eligibilities(user, &project, &[activation_type], &ALL_STATUSES, cancellation)?;
            if !set.contains_role_binding(entitlement, activation_type) {
                debug!(user = %user.email, role = %entitlement.role, "requester no longer eligible");
                return Err(JitError::AccessDenied { reason: entitlement.role.clone() });
            }
        }
        Ok(())
    }

    fn verify_user_can_approve(
        &self,
        approver: &UserId,
        request: &MpaRequest,
        cancellation: &Cancellation,
    ) -> JitResult<()> {
        if !request.reviewers.iter().any(|r| r == approver) {
            return Err(JitError::AccessDenied { reason: "approver is not a listed reviewer on this request".into() });
        }

        let entitlement = request.entitlement();
        let eligibility = Eligibility {
            role_binding: entitlement.clone(),
            activation_type: ActivationType::PeerApproval,
            status: EligibilityStatus::Available,
        };
        let holders = self.list_reviewers(&request.requesting_user, &eligibility, cancellation)?;
        if !holders.contains(approver) {
            return Err(JitError::AccessDenied {
                reason: format!("approver does not hold peer-approval eligibility for {}", entitlement.role),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_contracts::analysis::IamPolicy;
    use jit_contracts::ids::RoleBinding;
    use std::collections::BTreeSet as Set;

    struct StubAnalyzer;
    impl EligibilityAnalyzer for StubAnalyzer {
        fn find_projects_with_eligibilities(&self, _: &UserId, _: &Cancellation) -> JitResult<Set<ProjectId>> {
            Ok(Set::new())
        }
        fn find_eligibilities(
            &self,
            user: &UserId,
            project: &ProjectId,
            types: &[ActivationType],
            statuses: &[EligibilityStatus],
            _: &Cancellation,
        ) -> JitResult<EligibilitySet> {
            if user.email == "alice@example.com" && project.0 == "project-1" && types.contains(&ActivationType::PeerApproval)
            {
                return Ok(EligibilitySet::from_eligibilities(
                    vec![Eligibility {
                        role_binding: RoleBinding::new(project.full_resource_name(), "roles/viewer"),
                        activation_type: ActivationType::PeerApproval,
                        status: EligibilityStatus::Available,
                    }],
                    vec![],
                ));
            }
            let _ = statuses;
            Ok(EligibilitySet::new())
        }
        fn find_reviewers(
            &self,
            _role_binding: &RoleBinding,
            _activation_type: ActivationType,
            _: &Cancellation,
        ) -> JitResult<Set<UserId>> {
            Ok(Set::from([UserId::new("u2", "bob@example.com"), UserId::new("u1", "alice@example.com")]))
        }
    }

    struct StubResourceManager;
    impl ResourceManagerClient for StubResourceManager {
        fn get_iam_policy(&self, _: &ProjectId, _: &Cancellation) -> JitResult<IamPolicy> {
            unimplemented!()
        }
        fn set_iam_policy(&self, _: &ProjectId, _: &IamPolicy, _: &Cancellation) -> JitResult<()> {
            unimplemented!()
        }
        fn search_project_ids(&self, _: &str, _: &Cancellation) -> JitResult<Set<ProjectId>> {
            Ok(Set::from([ProjectId::new("searched")]))
        }
    }

    fn catalog(project_query: Option<&str>) -> ProjectRoleCatalog {
        ProjectRoleCatalog::new(Box::new(StubAnalyzer), Box::new(StubResourceManager), project_query.map(String::from))
    }

    #[test]
    fn list_reviewers_excludes_requesting_user() {
        let cat = catalog(None);
        let alice = UserId::new("u1", "alice@example.com");
        let eligibility = Eligibility {
            role_binding: RoleBinding::new(
                "//cloudresourcemanager.googleapis.com/projects/project-1",
                "roles/viewer",
            ),
            activation_type: ActivationType::PeerApproval,
            status: EligibilityStatus::Available,
        };

        let reviewers = cat.list_reviewers(&alice, &eligibility, &Cancellation::new()).unwrap();
        assert!(!reviewers.contains(&alice));
        assert!(reviewers.contains(&UserId::new("u2", "bob@example.com")));
    }

    #[test]
    fn list_reviewers_denied_when_requester_not_eligible() {
        let cat = catalog(None);
        let mallory = UserId::new("u9", "mallory@example.com");
        let eligibility = Eligibility {
            role_binding: RoleBinding::new(
                "//cloudresourcemanager.googleapis.com/projects/project-1",
                "roles/viewer",
            ),
            activation_type: ActivationType::PeerApproval,
            status: EligibilityStatus::Available,
        };

        let err = cat.list_reviewers(&mallory, &eligibility, &Cancellation::new()).unwrap_err();
        assert!(matches!(err, JitError::AccessDenied { .. }));
    }

    #[test]
    fn list_projects_uses_search_when_project_query_configured() {
        let cat = catalog(Some("labels.team=platform"));
        let projects = cat.list_projects(&UserId::new("u1", "alice@example.com"), &Cancellation::new()).unwrap();
        assert!(projects.contains(&ProjectId::new("searched")));
    }
}
