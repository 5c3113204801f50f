//! # jit-provision — IAM Provisioner (C6, §4.6)
//!
//! Applies a time-conditioned binding to a project's IAM policy with
//! purge/replace semantics, using an etag-based optimistic-concurrency
//! read-modify-write. The retry condition is narrow (etag mismatch only),
//! so the bounded-backoff loop is a small local helper rather than a
//! generic retry crate (§4.6 implementation note).

use std::thread::sleep;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use jit_contracts::analysis::{Binding, BindingOptions, Condition, IamPolicy, ACTIVATION_CONDITION_TITLE};
use jit_contracts::cancellation::Cancellation;
use jit_contracts::error::{JitError, JitResult};
use jit_contracts::ids::{ProjectId, RoleBinding};
use jit_core::traits::{Provisioner, ResourceManagerClient};

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// The production `Provisioner` (C6).
pub struct IamProvisioner {
    resource_manager: Box<dyn ResourceManagerClient>,
}

impl IamProvisioner {
    pub fn new(resource_manager: Box<dyn ResourceManagerClient>) -> Self {
        Self { resource_manager }
    }

    fn apply(
        &self,
        project: &ProjectId,
        role_binding: &RoleBinding,
        member: &str,
        window: (DateTime<Utc>, DateTime<Utc>),
        description: String,
        options: BindingOptions,
        cancellation: &Cancellation,
    ) -> JitResult<()> {
        let mut policy = self.resource_manager.get_iam_policy(project, cancellation)?;

        if options.purge_existing_temporary_bindings {
            policy.bindings.retain(|b| !is_prior_activation_binding(b, member));
        }

        let new_binding = activation_binding(role_binding, member, window, description);

        if options.fail_if_binding_exists && policy.bindings.iter().any(|b| is_identical_binding(b, &new_binding)) {
            return Err(JitError::AlreadyExists { what: format!("binding for {member} on {}", role_binding.role) });
        }

        policy.bindings.push(new_binding);
        self.resource_manager.set_iam_policy(project, &policy, cancellation)
    }
}

fn condition_expression(window: (DateTime<Utc>, DateTime<Utc>)) -> String {
    format!(
        "(request.time >= timestamp(\"{}\") && request.time < timestamp(\"{}\"))",
        window.0.to_rfc3339(),
        window.1.to_rfc3339()
    )
}

fn activation_binding(
    role_binding: &RoleBinding,
    member: &str,
    window: (DateTime<Utc>, DateTime<Utc>),
    description: String,
) -> Binding {
    Binding::new(
        vec![member.to_string()],
        role_binding.role.clone(),
        Some(Condition {
            title: Some(ACTIVATION_CONDITION_TITLE.to_string()),
            description: Some(description),
            expression: condition_expression(window),
        }),
    )
}

/// A prior activation binding for `member`: condition title equals the
/// reserved activation title and the binding's sole member is `member`
/// (§4.6: "regardless of whether the window is still valid").
fn is_prior_activation_binding(binding: &Binding, member: &str) -> bool {
    let is_activation = binding.condition.as_ref().and_then(|c| c.title.as_deref()) == Some(ACTIVATION_CONDITION_TITLE);
    is_activation && binding.members == [member.to_string()]
}

/// Identical member set, role, and condition expression (§4.6
/// `FAIL_IF_BINDING_EXISTS`). The condition title is allowed to differ
/// since it embeds a per-request description.
fn is_identical_binding(existing: &Binding, candidate: &Binding) -> bool {
    existing.members == candidate.members
        && existing.role == candidate.role
        && existing.condition.as_ref().map(|c| &c.expression) == candidate.condition.as_ref().map(|c| &c.expression)
}

impl Provisioner for IamProvisioner {
    fn provision(
        &self,
        project: &ProjectId,
        role_binding: &RoleBinding,
        member: &str,
        window: (DateTime<Utc>, DateTime<Utc>),
        description: String,
        options: BindingOptions,
        cancellation: &Cancellation,
    ) -> JitResult<()> {
        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            if cancellation.is_cancelled() {
                return Err(JitError::Transient { reason: "provisioning cancelled".into() });
            }
            match self.apply(project, role_binding, member, window, description.clone(), options, cancellation) {
                Ok(()) => {
                    debug!(project = %project, role = %role_binding.role, attempt, "binding provisioned");
                    return Ok(());
                }
                Err(JitError::Conflict { reason }) if attempt < MAX_ATTEMPTS => {
                    warn!(project = %project, attempt, reason = %reason, "etag conflict, retrying");
                    sleep(backoff);
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
        Err(JitError::Conflict { reason: format!("etag conflict persisted after {MAX_ATTEMPTS} attempts") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::collections::BTreeSet;

    struct FlakyResourceManager {
        policy: Mutex<IamPolicy>,
        conflicts_remaining: Mutex<u32>,
    }

    impl ResourceManagerClient for FlakyResourceManager {
        fn get_iam_policy(&self, _project: &ProjectId, _: &Cancellation) -> JitResult<IamPolicy> {
            Ok(self.policy.lock().unwrap().clone())
        }

        fn set_iam_policy(&self, _project: &ProjectId, policy: &IamPolicy, _: &Cancellation) -> JitResult<()> {
            let mut remaining = self.conflicts_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(JitError::Conflict { reason: "etag mismatch".into() });
            }
            *self.policy.lock().unwrap() = policy.clone();
            Ok(())
        }

        fn search_project_ids(&self, _query: &str, _: &Cancellation) -> JitResult<BTreeSet<ProjectId>> {
            Ok(BTreeSet::new())
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc::now();
        (start, start + chrono::Duration::minutes(15))
    }

    #[test]
    fn provision_retries_on_etag_conflict_then_succeeds() {
        let rm = FlakyResourceManager {
            policy: Mutex::new(IamPolicy { bindings: vec![], etag: "v1".into() }),
            conflicts_remaining: Mutex::new(2),
        };
        let provisioner = IamProvisioner::new(Box::new(rm));
        let project = ProjectId::new("project-1");
        let role_binding = RoleBinding::new(project.full_resource_name(), "roles/viewer");

        let result = provisioner.provision(
            &project,
            &role_binding,
            "user:alice@example.com",
            window(),
            "bug#7".into(),
            BindingOptions::default(),
            &Cancellation::new(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn purge_removes_prior_activation_binding_for_same_member() {
        let stale = Binding::new(
            vec!["user:alice@example.com".to_string()],
            "roles/viewer",
            Some(Condition {
                title: Some(ACTIVATION_CONDITION_TITLE.to_string()),
                description: Some("stale".to_string()),
                expression: "(request.time >= timestamp(\"2020-01-01T00:00:00Z\") && request.time < timestamp(\"2020-01-01T01:00:00Z\"))".into(),
            }),
        );
        let rm = FlakyResourceManager {
            policy: Mutex::new(IamPolicy { bindings: vec![stale], etag: "v1".into() }),
            conflicts_remaining: Mutex::new(0),
        };
        let project = ProjectId::new("project-1");
        let role_binding = RoleBinding::new(project.full_resource_name(), "roles/viewer");
        let provisioner = IamProvisioner::new(Box::new(rm));

        provisioner
            .provision(
                &project,
                &role_binding,
                "user:alice@example.com",
                window(),
                "fresh".into(),
                BindingOptions { purge_existing_temporary_bindings: true, fail_if_binding_exists: false },
                &Cancellation::new(),
            )
            .unwrap();
    }

    #[test]
    fn fail_if_binding_exists_rejects_identical_binding() {
        let window = window();
        let existing = activation_binding(
            &RoleBinding::new("//cloudresourcemanager.googleapis.com/projects/project-1", "roles/viewer"),
            "user:alice@example.com",
            window,
            "first approval".into(),
        );
        let rm = FlakyResourceManager {
            policy: Mutex::new(IamPolicy { bindings: vec![existing], etag: "v1".into() }),
            conflicts_remaining: Mutex::new(0),
        };
        let project = ProjectId::new("project-1");
        let role_binding = RoleBinding::new(project.full_resource_name(), "roles/viewer");
        let provisioner = IamProvisioner::new(Box::new(rm));

        let err = provisioner
            .provision(
                &project,
                &role_binding,
                "user:alice@example.com",
                window,
                "second approval".into(),
                BindingOptions { purge_existing_temporary_bindings: false, fail_if_binding_exists: true },
                &Cancellation::new(),
            )
            .unwrap_err();
        assert!(matches!(err, JitError::AlreadyExists { .. }));
    }
}
