//! The activation state machine (C3, §4.3):
//!
//! ```text
//!  NEW ──createJit──▶ VALIDATED_JIT ──activate──▶ PROVISIONED
//!  NEW ──createMpa──▶ VALIDATED_MPA ──sign──▶ TOKEN_ISSUED
//!                                        ──verify──▶ VALIDATED_MPA_ASAPPROVAL
//!                                           ──approve──▶ PROVISIONED
//! ```
//!
//! The states above are not reified as a type — each transition is a
//! method that takes the previous step's output and returns the next,
//! with the compiler (not a stored discriminant) enforcing the order: you
//! cannot call `approve` without a `MpaRequest` value, which you can only
//! have obtained from `create_mpa_request` or `verify_token`.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use jit_contracts::analysis::{BindingOptions, ACTIVATION_CONDITION_TITLE};
use jit_contracts::cancellation::Cancellation;
use jit_contracts::config::EngineConfig;
use jit_contracts::eligibility::{ActivationType, EligibilityStatus, EligibilitySet};
use jit_contracts::error::{JitError, JitResult};
use jit_contracts::ids::{ProjectId, RoleBinding, UserId};
use jit_contracts::notification::{Notification, NotificationType};
use jit_contracts::request::{ActivationId, ActivationRequest, JitRequest, MpaRequest};
use jit_contracts::activation::Activation;

use crate::traits::{Clock, Notifier, Provisioner, RoleCatalog, TokenService};

/// Tolerance applied uniformly to "start time must not be in the past" at
/// both request creation and activation/approval time (§9 Open Question 2:
/// the sources disagreed between ±10s at minting and 1 minute at
/// activation — this implementation picks the wider, 1-minute bound and
/// applies it everywhere a start time is validated).
pub const START_TIME_TOLERANCE: Duration = Duration::from_secs(60);

/// The process-wide, immutable composition root (§9 "Global singletons").
/// Construct one `Activator` per process; every method call is
/// self-contained and safe to invoke concurrently from multiple request
/// handlers (§5).
pub struct Activator {
    catalog: Box<dyn RoleCatalog>,
    tokens: Box<dyn TokenService>,
    notifier: Box<dyn Notifier>,
    provisioner: Box<dyn Provisioner>,
    clock: Box<dyn Clock>,
    config: EngineConfig,
}

impl Activator {
    pub fn new(
        catalog: Box<dyn RoleCatalog>,
        tokens: Box<dyn TokenService>,
        notifier: Box<dyn Notifier>,
        provisioner: Box<dyn Provisioner>,
        clock: Box<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self { catalog, tokens, notifier, provisioner, clock, config }
    }

    // ── Pass-through catalog queries (§6 inbound) ──────────────────────────

    pub fn list_projects(&self, user: &UserId, cancellation: &Cancellation) -> JitResult<BTreeSet<ProjectId>> {
        self.catalog.list_projects(user, cancellation)
    }

    pub fn list_eligibilities(
        &self,
        user: &UserId,
        project: &ProjectId,
        cancellation: &Cancellation,
    ) -> JitResult<EligibilitySet> {
        self.catalog.list_eligibilities(user, project, cancellation)
    }

    pub fn list_reviewers(
        &self,
        requesting_user: &UserId,
        eligibility: &jit_contracts::eligibility::Eligibility,
        cancellation: &Cancellation,
    ) -> JitResult<BTreeSet<UserId>> {
        self.catalog.list_reviewers(requesting_user, eligibility, cancellation)
    }

    // ── NEW ──createJit──▶ VALIDATED_JIT ───────────────────────────────────

    /// Validate and build a `JitRequest`. Does **not** verify eligibility
    /// — that is deferred to `activate` (§4.3).
    pub fn create_jit_request(
        &self,
        user: UserId,
        entitlements: Vec<RoleBinding>,
        justification: String,
        start_time: DateTime<Utc>,
        duration: Duration,
    ) -> JitResult<JitRequest> {
        if entitlements.is_empty() {
            return Err(JitError::InvalidArgument { reason: "at least one entitlement is required".into() });
        }
        if entitlements.len() > self.config.max_entitlements_per_jit_request {
            return Err(JitError::InvalidArgument {
                reason: format!(
                    "at most {} entitlements allowed per JIT request, got {}",
                    self.config.max_entitlements_per_jit_request,
                    entitlements.len()
                ),
            });
        }
        self.validate_common(&user, &[], &justification, start_time, duration)?;

        Ok(JitRequest {
            id: ActivationId::new(ActivationType::SelfApproval),
            requesting_user: user,
            entitlements,
            justification,
            start_time,
            duration,
        })
    }

    // ── NEW ──createMpa──▶ VALIDATED_MPA ───────────────────────────────────

    /// Validate and build an `MpaRequest`. Eligibility IS pre-verified
    /// here, to avoid minting a token that will later fail (§4.3).
    #[allow(clippy::too_many_arguments)]
    pub fn create_mpa_request(
        &self,
        user: UserId,
        entitlements: Vec<RoleBinding>,
        reviewers: Vec<UserId>,
        justification: String,
        start_time: DateTime<Utc>,
        duration: Duration,
        cancellation: &Cancellation,
    ) -> JitResult<MpaRequest> {
        if entitlements.len() != 1 {
            return Err(JitError::InvalidArgument {
                reason: format!("MPA requests require exactly one entitlement, got {}", entitlements.len()),
            });
        }
        if reviewers.len() < self.config.min_reviewers || reviewers.len() > self.config.max_reviewers {
            return Err(JitError::InvalidArgument {
                reason: format!(
                    "reviewer count must be between {} and {}, got {}",
                    self.config.min_reviewers,
                    self.config.max_reviewers,
                    reviewers.len()
                ),
            });
        }
        self.validate_common(&user, &reviewers, &justification, start_time, duration)?;

        let min = self.config.min_activation_duration();
        let max = self.config.max_activation_duration();
        if duration < min || duration > max {
            return Err(JitError::InvalidArgument {
                reason: format!("duration must be between {:?} and {:?}, got {:?}", min, max, duration),
            });
        }

        let request = MpaRequest {
            id: ActivationId::new(ActivationType::PeerApproval),
            requesting_user: user,
            entitlements,
            reviewers,
            justification,
            start_time,
            duration,
        };

        self.catalog.verify_user_can_request(
            &request.requesting_user,
            &ActivationRequest::Mpa(request.clone()),
            cancellation,
        )?;

        Ok(request)
    }

    fn validate_common(
        &self,
        user: &UserId,
        reviewers: &[UserId],
        justification: &str,
        start_time: DateTime<Utc>,
        duration: Duration,
    ) -> JitResult<()> {
        if justification.trim().is_empty() {
            return Err(JitError::InvalidArgument { reason: "justification must not be empty".into() });
        }
        let regex = self.config.justification_regex()?;
        if !regex.is_match(justification) {
            return Err(JitError::AccessDenied {
                reason: format!("justification does not match policy: {}", self.config.justification_hint),
            });
        }
        if duration.is_zero() {
            return Err(JitError::InvalidArgument { reason: "duration must be > 0".into() });
        }
        let now = self.clock.now();
        if start_time < now - chrono::Duration::from_std(START_TIME_TOLERANCE).unwrap() {
            return Err(JitError::InvalidArgument { reason: "start time is in the past".into() });
        }
        if reviewers.iter().any(|r| r == user) {
            return Err(JitError::InvalidArgument { reason: "requesting user cannot be their own reviewer".into() });
        }
        Ok(())
    }

    // ── VALIDATED_MPA ──sign──▶ TOKEN_ISSUED ───────────────────────────────

    pub fn sign_token(
        &self,
        request: &MpaRequest,
        cancellation: &Cancellation,
    ) -> JitResult<(String, DateTime<Utc>, DateTime<Utc>)> {
        self.tokens.sign_token(request, cancellation)
    }

    // ── TOKEN_ISSUED ──verify──▶ VALIDATED_MPA_ASAPPROVAL ──────────────────

    pub fn verify_token(&self, token: &str, cancellation: &Cancellation) -> JitResult<MpaRequest> {
        self.tokens.verify_token(token, cancellation)
    }

    // ── VALIDATED_JIT ──activate──▶ PROVISIONED ────────────────────────────

    pub fn activate(&self, request: &JitRequest, cancellation: &Cancellation) -> JitResult<Activation> {
        debug!(request_id = %request.id, user = %request.requesting_user.email, action = "activate", "validating JIT activation");

        let regex = self.config.justification_regex()?;
        if !regex.is_match(&request.justification) {
            return Err(JitError::AccessDenied {
                reason: format!("justification does not match policy: {}", self.config.justification_hint),
            });
        }

        self.catalog.verify_user_can_request(
            &request.requesting_user,
            &ActivationRequest::Jit(request.clone()),
            cancellation,
        )?;

        let member = request.requesting_user.principal();
        let window = self.window_for(request.start_time, request.duration)?;
        let description = format!("Self-approved, justification: {}", request.justification);

        for entitlement in &request.entitlements {
            self.provision_one(entitlement, &member, window, description.clone(), BindingOptions {
                purge_existing_temporary_bindings: true,
                fail_if_binding_exists: false,
            }, cancellation)?;
        }

        info!(request_id = %request.id, user = %request.requesting_user.email, action = "activate", "JIT activation provisioned");

        let activation = Activation { request: ActivationRequest::Jit(request.clone()), end_time: window.1 };
        self.notifier.dispatch(&Notification {
            recipients: vec![request.requesting_user.email.clone()],
            cc_recipients: vec![],
            subject: "Your JIT access request was activated".to_string(),
            notification_type: NotificationType::ActivationSelfApproved,
            properties: self_approved_properties(request),
        });

        Ok(activation)
    }

    // ── VALIDATED_MPA_ASAPPROVAL ──approve──▶ PROVISIONED ──────────────────

    pub fn approve(&self, approver: &UserId, request: &MpaRequest, cancellation: &Cancellation) -> JitResult<Activation> {
        debug!(request_id = %request.id, approver = %approver.email, action = "approve", "validating MPA approval");

        if approver == &request.requesting_user {
            return Err(JitError::AccessDenied { reason: "a requester cannot approve their own request".into() });
        }
        if !request.reviewers.iter().any(|r| r == approver) {
            return Err(JitError::AccessDenied { reason: "approver is not a listed reviewer on this request".into() });
        }

        let regex = self.config.justification_regex()?;
        if !regex.is_match(&request.justification) {
            return Err(JitError::AccessDenied {
                reason: format!("justification does not match policy: {}", self.config.justification_hint),
            });
        }

        self.catalog.verify_user_can_request(
            &request.requesting_user,
            &ActivationRequest::Mpa(request.clone()),
            cancellation,
        )?;
        self.catalog.verify_user_can_approve(approver, request, cancellation)?;

        let member = request.requesting_user.principal();
        let window = self.window_for(request.start_time, request.duration)?;
        let description = format!("Approved by {}, justification: {}", approver.email, request.justification);
        let entitlement = request.entitlement();

        // Concurrent-approval resolution (§4.3, §9 Open Question 3): the
        // provisioner signals AlreadyExists when a second reviewer races
        // the first to the same (member, role, condition) binding. The
        // loser observes that as success, since the request was already
        // fulfilled by the winner.
        match self.provision_one(
            entitlement,
            &member,
            window,
            description,
            BindingOptions { purge_existing_temporary_bindings: true, fail_if_binding_exists: true },
            cancellation,
        ) {
            Ok(()) => {}
            Err(JitError::AlreadyExists { .. }) => {
                info!(request_id = %request.id, approver = %approver.email, "binding already provisioned by a concurrent approval");
            }
            Err(e) => return Err(e),
        }

        info!(request_id = %request.id, approver = %approver.email, action = "approve", "MPA activation provisioned");

        let activation = Activation { request: ActivationRequest::Mpa(request.clone()), end_time: window.1 };
        self.notifier.dispatch(&Notification {
            recipients: vec![request.requesting_user.email.clone()],
            cc_recipients: request.reviewers.iter().map(|r| r.email.clone()).collect(),
            subject: "Your JIT access request was approved".to_string(),
            notification_type: NotificationType::ActivationApproved,
            properties: approved_properties(request, approver),
        });

        Ok(activation)
    }

    /// Notify reviewers that a request is awaiting their approval (§4.5
    /// `RequestActivation`). The activator does not call this itself —
    /// the out-of-scope REST façade invokes it once `sign_token` has
    /// produced a URL to embed — but it is exposed here because rendering
    /// the notification is a core concern, not a façade one.
    pub fn notify_request_activation(&self, request: &MpaRequest) {
        self.notifier.dispatch(&Notification {
            recipients: request.reviewers.iter().map(|r| r.email.clone()).collect(),
            cc_recipients: vec![request.requesting_user.email.clone()],
            subject: "A JIT access request needs your approval".to_string(),
            notification_type: NotificationType::RequestActivation,
            properties: self_approved_properties(&JitRequest {
                id: request.id.clone(),
                requesting_user: request.requesting_user.clone(),
                entitlements: request.entitlements.clone(),
                justification: request.justification.clone(),
                start_time: request.start_time,
                duration: request.duration,
            }),
        });
    }

    fn window_for(&self, start: DateTime<Utc>, duration: Duration) -> JitResult<(DateTime<Utc>, DateTime<Utc>)> {
        let delta = chrono::Duration::from_std(duration)
            .map_err(|e| JitError::InvalidArgument { reason: format!("duration out of range: {e}") })?;
        let end = start.checked_add_signed(delta).ok_or_else(|| JitError::InvalidArgument {
            reason: "start time plus duration overflows".into(),
        })?;
        Ok((start, end))
    }

    fn provision_one(
        &self,
        entitlement: &RoleBinding,
        member: &str,
        window: (DateTime<Utc>, DateTime<Utc>),
        description: String,
        options: BindingOptions,
        cancellation: &Cancellation,
    ) -> JitResult<()> {
        let project = ProjectId::from_full_resource_name(&entitlement.resource).ok_or_else(|| {
            JitError::InvalidArgument { reason: format!("entitlement resource '{}' is not a bare project", entitlement.resource) }
        })?;

        match self.provisioner.provision(&project, entitlement, member, window, description, options, cancellation) {
            Ok(()) => Ok(()),
            Err(JitError::AlreadyExists { what }) => {
                warn!(project = %project, role = %entitlement.role, "binding already exists");
                Err(JitError::AlreadyExists { what })
            }
            Err(e) => Err(e),
        }
    }
}

fn self_approved_properties(request: &JitRequest) -> std::collections::BTreeMap<String, String> {
    let mut properties = std::collections::BTreeMap::new();
    properties.insert("BENEFICIARY".to_string(), request.requesting_user.email.clone());
    properties.insert("JUSTIFICATION".to_string(), request.justification.clone());
    properties.insert("START".to_string(), request.start_time.to_rfc3339());
    properties.insert(
        "ENTITLEMENTS".to_string(),
        request.entitlements.iter().map(|e| format!("{}:{}", e.resource, e.role)).collect::<Vec<_>>().join(", "),
    );
    properties.insert("CONDITION_TITLE".to_string(), ACTIVATION_CONDITION_TITLE.to_string());
    properties
}

fn approved_properties(request: &MpaRequest, approver: &UserId) -> std::collections::BTreeMap<String, String> {
    let mut properties = std::collections::BTreeMap::new();
    properties.insert("BENEFICIARY".to_string(), request.requesting_user.email.clone());
    properties.insert("APPROVER".to_string(), approver.email.clone());
    properties.insert("JUSTIFICATION".to_string(), request.justification.clone());
    properties.insert("START".to_string(), request.start_time.to_rfc3339());
    let entitlement = request.entitlement();
    properties.insert("ENTITLEMENT".to_string(), format!("{}:{}", entitlement.resource, entitlement.role));
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use jit_contracts::eligibility::Eligibility;
    use std::sync::Mutex;

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct PermissiveCatalog;
    impl RoleCatalog for PermissiveCatalog {
        fn list_projects(&self, _: &UserId, _: &Cancellation) -> JitResult<BTreeSet<ProjectId>> {
            Ok(BTreeSet::new())
        }
        fn list_eligibilities(&self, _: &UserId, _: &ProjectId, _: &Cancellation) -> JitResult<EligibilitySet> {
            Ok(EligibilitySet::new())
        }
        fn list_reviewers(&self, _: &UserId, _: &Eligibility, _: &Cancellation) -> JitResult<BTreeSet<UserId>> {
            Ok(BTreeSet::new())
        }
        fn verify_user_can_request(&self, _: &UserId, _: &ActivationRequest, _: &Cancellation) -> JitResult<()> {
            Ok(())
        }
        fn verify_user_can_approve(&self, _: &UserId, _: &MpaRequest, _: &Cancellation) -> JitResult<()> {
            Ok(())
        }
    }

    struct DenyingCatalog;
    impl RoleCatalog for DenyingCatalog {
        fn list_projects(&self, _: &UserId, _: &Cancellation) -> JitResult<BTreeSet<ProjectId>> {
            Ok(BTreeSet::new())
        }
        fn list_eligibilities(&self, _: &UserId, _: &ProjectId, _: &Cancellation) -> JitResult<EligibilitySet> {
            Ok(EligibilitySet::new())
        }
        fn list_reviewers(&self, _: &UserId, _: &Eligibility, _: &Cancellation) -> JitResult<BTreeSet<UserId>> {
            Ok(BTreeSet::new())
        }
        fn verify_user_can_request(&self, _: &UserId, _: &ActivationRequest, _: &Cancellation) -> JitResult<()> {
            Err(JitError::AccessDenied { reason: "roles/editor".into() })
        }
        fn verify_user_can_approve(&self, _: &UserId, _: &MpaRequest, _: &Cancellation) -> JitResult<()> {
            Err(JitError::AccessDenied { reason: "not a reviewer-holder".into() })
        }
    }

    struct NoopTokens;
    impl TokenService for NoopTokens {
        fn sign_token(&self, _: &MpaRequest, _: &Cancellation) -> JitResult<(String, DateTime<Utc>, DateTime<Utc>)> {
            unimplemented!()
        }
        fn verify_token(&self, _: &str, _: &Cancellation) -> JitResult<MpaRequest> {
            unimplemented!()
        }
    }

    struct RecordingNotifier(Mutex<Vec<NotificationType>>);
    impl Notifier for RecordingNotifier {
        fn dispatch(&self, notification: &Notification) {
            self.0.lock().unwrap().push(notification.notification_type);
        }
    }

    struct RecordingProvisioner {
        calls: Mutex<u32>,
        fail_with_already_exists: bool,
    }
    impl Provisioner for RecordingProvisioner {
        fn provision(
            &self,
            _project: &ProjectId,
            _role_binding: &RoleBinding,
            _member: &str,
            _window: (DateTime<Utc>, DateTime<Utc>),
            _description: String,
            _options: BindingOptions,
            _cancellation: &Cancellation,
        ) -> JitResult<()> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if self.fail_with_already_exists && *calls > 1 {
                return Err(JitError::AlreadyExists { what: "binding".into() });
            }
            Ok(())
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::from_toml_str(
            r#"
                scope = "projects/demo"
                justification-pattern = "^.+$"
                justification-hint = "provide a ticket reference"
                service-account = "jit-signer@demo.iam.gserviceaccount.com"
                min-reviewers = 1
                max-reviewers = 3
            "#,
        )
        .unwrap()
    }

    fn activator(catalog: Box<dyn RoleCatalog>, provisioner: RecordingProvisioner, now: DateTime<Utc>) -> Activator {
        Activator::new(
            catalog,
            Box::new(NoopTokens),
            Box::new(RecordingNotifier(Mutex::new(vec![]))),
            Box::new(provisioner),
            Box::new(FixedClock(now)),
            config(),
        )
    }

    #[test]
    fn create_jit_request_rejects_past_start_time() {
        let now = Utc::now();
        let act = activator(Box::new(PermissiveCatalog), RecordingProvisioner { calls: Mutex::new(0), fail_with_already_exists: false }, now);
        let err = act
            .create_jit_request(
                UserId::new("u1", "alice@example.com"),
                vec![RoleBinding::new("project-1", "roles/editor")],
                "bug#7".into(),
                now - chrono::Duration::hours(1),
                Duration::from_secs(600),
            )
            .unwrap_err();
        assert!(matches!(err, JitError::InvalidArgument { .. }));
    }

    #[test]
    fn create_mpa_request_rejects_self_as_reviewer() {
        let now = Utc::now();
        let act = activator(Box::new(PermissiveCatalog), RecordingProvisioner { calls: Mutex::new(0), fail_with_already_exists: false }, now);
        let alice = UserId::new("u1", "alice@example.com");
        let cancellation = Cancellation::new();
        let err = act
            .create_mpa_request(
                alice.clone(),
                vec![RoleBinding::new("project-1", "roles/viewer")],
                vec![alice],
                "bug#7".into(),
                now,
                Duration::from_secs(900),
                &cancellation,
            )
            .unwrap_err();
        assert!(matches!(err, JitError::InvalidArgument { .. }));
    }

    #[test]
    fn activate_jit_provisions_one_binding_per_entitlement() {
        let now = Utc::now();
        let provisioner = RecordingProvisioner { calls: Mutex::new(0), fail_with_already_exists: false };
        let act = activator(Box::new(PermissiveCatalog), provisioner, now);
        let cancellation = Cancellation::new();

        let request = act
            .create_jit_request(
                UserId::new("u1", "alice@example.com"),
                vec![RoleBinding::new("//cloudresourcemanager.googleapis.com/projects/project-1", "roles/editor")],
                "bug#7".into(),
                now,
                Duration::from_secs(600),
            )
            .unwrap();

        let activation = act.activate(&request, &cancellation).unwrap();
        assert_eq!(activation.end_time, now + chrono::Duration::seconds(600));
    }

    #[test]
    fn activate_jit_denied_when_no_longer_eligible() {
        let now = Utc::now();
        let provisioner = RecordingProvisioner { calls: Mutex::new(0), fail_with_already_exists: false };
        let act = activator(Box::new(DenyingCatalog), provisioner, now);
        let cancellation = Cancellation::new();

        let request = act
            .create_jit_request(
                UserId::new("u1", "alice@example.com"),
                vec![RoleBinding::new("//cloudresourcemanager.googleapis.com/projects/project-1", "roles/editor")],
                "bug#7".into(),
                now,
                Duration::from_secs(600),
            )
            .unwrap();

        let err = act.activate(&request, &cancellation).unwrap_err();
        assert!(matches!(err, JitError::AccessDenied { .. }));
    }

    #[test]
    fn approve_rejects_self_approval() {
        let now = Utc::now();
        let provisioner = RecordingProvisioner { calls: Mutex::new(0), fail_with_already_exists: false };
        let act = activator(Box::new(PermissiveCatalog), provisioner, now);
        let cancellation = Cancellation::new();

        let alice = UserId::new("u1", "alice@example.com");
        let bob = UserId::new("u2", "bob@example.com");
        let request = act
            .create_mpa_request(
                alice.clone(),
                vec![RoleBinding::new("//cloudresourcemanager.googleapis.com/projects/project-1", "roles/viewer")],
                vec![bob],
                "bug#7".into(),
                now,
                Duration::from_secs(900),
                &cancellation,
            )
            .unwrap();

        let err = act.approve(&alice, &request, &cancellation).unwrap_err();
        assert!(matches!(err, JitError::AccessDenied { .. }));
    }

    #[test]
    fn concurrent_approval_second_caller_sees_success() {
        let now = Utc::now();
        let provisioner = RecordingProvisioner { calls: Mutex::new(0), fail_with_already_exists: true };
        let act = activator(Box::new(PermissiveCatalog), provisioner, now);
        let cancellation = Cancellation::new();

        let alice = UserId::new("u1", "alice@example.com");
        let bob = UserId::new("u2", "bob@example.com");
        let carol = UserId::new("u3", "carol@example.com");
        let request = act
            .create_mpa_request(
                alice,
                vec![RoleBinding::new("//cloudresourcemanager.googleapis.com/projects/project-1", "roles/viewer")],
                vec![bob.clone(), carol.clone()],
                "bug#7".into(),
                now,
                Duration::from_secs(900),
                &cancellation,
            )
            .unwrap();

        let first = act.approve(&bob, &request, &cancellation);
        let second = act.approve(&carol, &request, &cancellation);
        assert!(first.is_ok());
        assert!(second.is_ok());
    }
}
