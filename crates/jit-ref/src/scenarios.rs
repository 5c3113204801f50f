//! One function per §8 scenario (S1–S7), each wiring a complete
//! `Activator` to this crate's mock outbound clients. Runnable both as
//! `#[test]`s here and as `demo` subcommands.

use std::time::Duration;

use chrono::Utc;

use jit_analyzer::markers::{JIT_MARKER, PEER_MARKER};
use jit_analyzer::PolicyEligibilityAnalyzer;
use jit_catalog::ProjectRoleCatalog;
use jit_contracts::analysis::{AccessControlList, AnalysisResult, Binding, Condition, ConditionEvaluation, ACTIVATION_CONDITION_TITLE};
use jit_contracts::cancellation::Cancellation;
use jit_contracts::config::EngineConfig;
use jit_contracts::error::JitError;
use jit_contracts::ids::{ProjectId, RoleBinding, UserId};
use jit_core::Activator;
use jit_notify::TemplateNotifier;
use jit_provision::IamProvisioner;
use jit_token::JwtTokenService;

use crate::mocks::{FixedClock, FixedPolicyAnalysisClient, InMemoryMailTransport, InMemoryResourceManagerClient, LocalCredentialsClient};

fn project_resource(project: &str) -> String {
    format!("//cloudresourcemanager.googleapis.com/projects/{project}")
}

fn build_config(justification_pattern: &str) -> EngineConfig {
    EngineConfig::from_toml_str(&format!(
        r#"
            scope = "projects/demo"
            justification-pattern = '{justification_pattern}'
            justification-hint = "must match the configured policy"
            service-account = "jit-signer@demo.iam.gserviceaccount.com"
            min-reviewers = 1
            max-reviewers = 5
        "#
    ))
    .expect("fixed scenario config is always valid")
}

/// Everything a scenario needs to build an `Activator` plus handles to
/// observe what it did.
struct Harness {
    activator: Activator,
    mail: InMemoryMailTransport,
    resource_manager: InMemoryResourceManagerClient,
}

fn harness(analysis: FixedPolicyAnalysisClient, justification_pattern: &str, now: chrono::DateTime<Utc>) -> Harness {
    let resource_manager = InMemoryResourceManagerClient::new();
    let credentials = LocalCredentialsClient::generate();
    let mail = InMemoryMailTransport::new();

    let config = build_config(justification_pattern);
    let catalog = ProjectRoleCatalog::new(
        Box::new(PolicyEligibilityAnalyzer::new(Box::new(analysis), config.scope_id().unwrap())),
        Box::new(resource_manager.clone()),
        config.project_query.clone(),
    );
    let tokens = JwtTokenService::new(
        Box::new(credentials),
        Box::new(FixedClock(now)),
        config.service_account.clone(),
        config.token_validity(),
    );
    let notifier = TemplateNotifier::from_config(&config, vec![Box::new(mail.clone())]).unwrap();
    let provisioner = IamProvisioner::new(Box::new(resource_manager.clone()));

    let activator = Activator::new(Box::new(catalog), Box::new(tokens), Box::new(notifier), Box::new(provisioner), Box::new(FixedClock(now)), config);

    Harness { activator, mail, resource_manager }
}

fn jit_eligible_result(role: &str, resource: &str) -> AnalysisResult {
    AnalysisResult {
        binding: Binding::new(vec!["user:alice@example.com".to_string()], role, Some(Condition { title: None, description: None, expression: JIT_MARKER.to_string() })),
        acls: vec![AccessControlList { resources: vec![resource.to_string()], condition_evaluation: ConditionEvaluation::Conditional }],
    }
}

fn peer_eligible_result(member: &str, role: &str, resource: &str) -> AnalysisResult {
    AnalysisResult {
        binding: Binding::new(vec![member.to_string()], role, Some(Condition { title: None, description: None, expression: PEER_MARKER.to_string() })),
        acls: vec![AccessControlList { resources: vec![resource.to_string()], condition_evaluation: ConditionEvaluation::Conditional }],
    }
}

/// S1: self-approved JIT activation provisions one binding.
pub fn s1_self_approved_activation() -> Result<String, JitError> {
    let now = Utc::now();
    let resource = project_resource("project-1");
    let analysis = FixedPolicyAnalysisClient::new().with_results("alice@example.com", vec![jit_eligible_result("roles/editor", &resource)]);
    let harness = harness(analysis, "^.+$", now);
    let cancellation = Cancellation::new();

    let request = harness.activator.create_jit_request(
        UserId::new("u1", "alice@example.com"),
        vec![RoleBinding::new(resource.clone(), "roles/editor")],
        "bug#7".to_string(),
        now,
        Duration::from_secs(600),
    )?;
    let activation = harness.activator.activate(&request, &cancellation)?;

    let project = ProjectId::from_full_resource_name(&resource).unwrap();
    let policy = harness.resource_manager.policy_for(&project);
    let binding = policy.bindings.last().expect("a binding was provisioned");
    assert_eq!(binding.members, vec!["user:alice@example.com".to_string()]);
    assert_eq!(binding.condition.as_ref().unwrap().title.as_deref(), Some(ACTIVATION_CONDITION_TITLE));
    assert_eq!(activation.end_time, now + chrono::Duration::seconds(600));

    Ok(format!("S1 ok: provisioned {} for {:?}, ends {}", binding.role, binding.members, activation.end_time))
}

fn s2_setup(now: chrono::DateTime<Utc>) -> (Harness, jit_contracts::request::MpaRequest) {
    let resource = project_resource("project-1");
    let analysis = FixedPolicyAnalysisClient::new()
        .with_results("alice@example.com", vec![peer_eligible_result("user:alice@example.com", "roles/viewer", &resource)])
        .with_results("bob@example.com", vec![peer_eligible_result("user:bob@example.com", "roles/viewer", &resource)])
        .with_results("carol@example.com", vec![peer_eligible_result("user:carol@example.com", "roles/viewer", &resource)])
        .with_principals(resource.clone(), "roles/viewer", vec!["user:alice@example.com".to_string(), "user:bob@example.com".to_string(), "user:carol@example.com".to_string()]);
    let harness = harness(analysis, "^.+$", now);
    let cancellation = Cancellation::new();

    let request = harness
        .activator
        .create_mpa_request(
            UserId::new("u1", "alice@example.com"),
            vec![RoleBinding::new(resource, "roles/viewer")],
            vec![UserId::new("u2", "bob@example.com"), UserId::new("u3", "carol@example.com")],
            "bug#7".to_string(),
            now,
            Duration::from_secs(900),
            &cancellation,
        )
        .expect("S2 setup request is valid");

    (harness, request)
}

/// S2: peer-approved activation by one of two eligible reviewers.
pub fn s2_peer_approved_activation() -> Result<String, JitError> {
    let now = Utc::now();
    let (harness, request) = s2_setup(now);
    let cancellation = Cancellation::new();

    let (token, _iat, _exp) = harness.activator.sign_token(&request, &cancellation)?;
    let verified = harness.activator.verify_token(&token, &cancellation)?;
    let bob = UserId::new("u2", "bob@example.com");
    harness.activator.approve(&bob, &verified, &cancellation)?;

    let mail = harness.mail.sent();
    let approval_mail = mail.iter().find(|m| m.to.contains(&"alice@example.com".to_string())).expect("approval notification sent");
    assert!(approval_mail.cc.contains(&"bob@example.com".to_string()));
    assert!(approval_mail.cc.contains(&"carol@example.com".to_string()));

    Ok(format!("S2 ok: approved, notified {:?} cc {:?}", approval_mail.to, approval_mail.cc))
}

/// S3: the beneficiary cannot approve their own MPA request.
pub fn s3_self_approval_denied() -> Result<String, JitError> {
    let now = Utc::now();
    let (harness, request) = s2_setup(now);
    let cancellation = Cancellation::new();

    let (token, _iat, _exp) = harness.activator.sign_token(&request, &cancellation)?;
    let verified = harness.activator.verify_token(&token, &cancellation)?;
    let alice = UserId::new("u1", "alice@example.com");

    match harness.activator.approve(&alice, &verified, &cancellation) {
        Err(JitError::AccessDenied { reason }) => Ok(format!("S3 ok: denied as expected ({reason})")),
        Ok(_) => Err(JitError::InvalidArgument { reason: "expected AccessDenied, approval succeeded".into() }),
        Err(other) => Err(other),
    }
}

/// S4: two reviewers approve the same token concurrently; exactly one
/// binding write wins and the other observes success via `AlreadyExists`.
pub fn s4_concurrent_approval_both_succeed() -> Result<String, JitError> {
    let now = Utc::now();
    let (harness, request) = s2_setup(now);
    let cancellation = Cancellation::new();

    let (token, _iat, _exp) = harness.activator.sign_token(&request, &cancellation)?;
    let verified = harness.activator.verify_token(&token, &cancellation)?;
    let bob = UserId::new("u2", "bob@example.com");
    let carol = UserId::new("u3", "carol@example.com");

    let first = harness.activator.approve(&bob, &verified, &cancellation);
    let second = harness.activator.approve(&carol, &verified, &cancellation);

    if first.is_ok() && second.is_ok() {
        Ok("S4 ok: both approvers observed success".to_string())
    } else {
        Err(JitError::Conflict { reason: "expected both concurrent approvals to succeed".into() })
    }
}

/// S5: verifying an expired token fails with `TokenInvalid`.
pub fn s5_expired_token_rejected() -> Result<String, JitError> {
    let now = Utc::now();
    let resource = project_resource("project-1");
    let analysis = FixedPolicyAnalysisClient::new()
        .with_results("alice@example.com", vec![peer_eligible_result("user:alice@example.com", "roles/viewer", &resource)])
        .with_results("bob@example.com", vec![peer_eligible_result("user:bob@example.com", "roles/viewer", &resource)])
        .with_principals(resource.clone(), "roles/viewer", vec!["user:alice@example.com".to_string(), "user:bob@example.com".to_string()]);

    // Sign under a clock two hours in the past with a short validity so
    // the token is genuinely expired by the time verification runs under
    // the real wall clock (jsonwebtoken validates `exp` against real time).
    let past = now - chrono::Duration::hours(2);
    let harness = harness(analysis, "^.+$", past);
    let cancellation = Cancellation::new();

    let request = harness.activator.create_mpa_request(
        UserId::new("u1", "alice@example.com"),
        vec![RoleBinding::new(resource, "roles/viewer")],
        vec![UserId::new("u2", "bob@example.com")],
        "bug#7".to_string(),
        past,
        Duration::from_secs(60),
        &cancellation,
    )?;
    let (token, _iat, _exp) = harness.activator.sign_token(&request, &cancellation)?;

    match harness.activator.verify_token(&token, &cancellation) {
        Err(JitError::TokenInvalid { reason }) => Ok(format!("S5 ok: rejected expired token ({reason})")),
        Ok(_) => Err(JitError::InvalidArgument { reason: "expected TokenInvalid, verification succeeded".into() }),
        Err(other) => Err(other),
    }
}

/// S6: a marker expression with an extra clause is not recognized —
/// `listEligibilities` returns an empty set, no warnings.
pub fn s6_extra_clause_condition_not_recognized() -> Result<String, JitError> {
    let now = Utc::now();
    let resource = project_resource("project-1");
    let tampered = AnalysisResult {
        binding: Binding::new(
            vec!["user:alice@example.com".to_string()],
            "roles/editor",
            Some(Condition { title: None, description: None, expression: format!("{JIT_MARKER} && resource.name=='X'") }),
        ),
        acls: vec![AccessControlList { resources: vec![resource.clone()], condition_evaluation: ConditionEvaluation::Conditional }],
    };
    let analysis = FixedPolicyAnalysisClient::new().with_results("alice@example.com", vec![tampered]);
    let harness = harness(analysis, "^.+$", now);
    let cancellation = Cancellation::new();

    let project = ProjectId::from_full_resource_name(&resource).unwrap();
    let set = harness.activator.list_eligibilities(&UserId::new("u1", "alice@example.com"), &project, &cancellation)?;

    if set.eligibilities.is_empty() && set.warnings.is_empty() {
        Ok("S6 ok: tampered condition yielded no eligibilities and no warnings".to_string())
    } else {
        Err(JitError::InvalidArgument { reason: "expected an empty eligibility set".into() })
    }
}

/// S7: a justification that fails the configured pattern is rejected with
/// the configured hint.
pub fn s7_justification_pattern_rejected() -> Result<String, JitError> {
    let now = Utc::now();
    let resource = project_resource("project-1");
    let analysis = FixedPolicyAnalysisClient::new().with_results("alice@example.com", vec![jit_eligible_result("roles/editor", &resource)]);
    let harness = harness(analysis, r"^\d+$", now);

    match harness.activator.create_jit_request(
        UserId::new("u1", "alice@example.com"),
        vec![RoleBinding::new(resource, "roles/editor")],
        "oops".to_string(),
        now,
        Duration::from_secs(600),
    ) {
        Err(JitError::AccessDenied { reason }) => Ok(format!("S7 ok: rejected ({reason})")),
        Ok(_) => Err(JitError::InvalidArgument { reason: "expected AccessDenied, request was accepted".into() }),
        Err(other) => Err(other),
    }
}
