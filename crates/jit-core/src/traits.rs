//! Trait definitions for every inbound and outbound seam of the engine
//! (§6). The activator (`crate::activator::Activator`) and every
//! component crate depend only on these traits, never on each other's
//! concrete types.
//!
//! Outbound traits (§6 "Outbound") are implemented by adapter crates this
//! engine does not own in production; `jit-ref` provides reference mocks.
//! Inbound traits (§6 "Inbound") are implemented by the component crates
//! (`jit-analyzer`, `jit-catalog`, `jit-token`, `jit-notify`,
//! `jit-provision`) and composed by the activator.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;

use jit_contracts::activation::Activation;
use jit_contracts::analysis::{AnalysisResponse, BindingOptions, IamPolicy};
use jit_contracts::cancellation::Cancellation;
use jit_contracts::eligibility::{ActivationType, Eligibility, EligibilityStatus, EligibilitySet};
use jit_contracts::error::JitResult;
use jit_contracts::ids::{ProjectId, RoleBinding, ScopeId, UserId};
use jit_contracts::notification::Notification;
use jit_contracts::request::{ActivationRequest, MpaRequest};

// ── Outbound: Policy-analysis client (§6) ──────────────────────────────────

/// The external cloud policy analyzer. `jit-analyzer` (C1) is the only
/// consumer of this trait.
pub trait PolicyAnalysisClient: Send + Sync {
    /// Resources (and the bindings granting them) that `user` can reach
    /// from `scope`, optionally narrowed by a permission or resource
    /// filter. `expand` mirrors the analyzer's own "expand resource
    /// groups into individual resources" flag.
    fn find_accessible_resources_by_user(
        &self,
        scope: &ScopeId,
        user: &UserId,
        permission_filter: Option<&str>,
        resource_filter: Option<&str>,
        expand: bool,
        cancellation: &Cancellation,
    ) -> JitResult<AnalysisResponse>;

    /// Principals (raw identity strings, e.g. `user:alice@example.com`)
    /// granted `role` on `resource_full_name`, for reviewer discovery.
    fn find_permissioned_principals_by_resource(
        &self,
        scope: &ScopeId,
        resource_full_name: &str,
        role: &str,
        cancellation: &Cancellation,
    ) -> JitResult<Vec<String>>;
}

// ── Outbound: Resource-manager client (§6) ─────────────────────────────────

/// The raw cloud resource-manager client. `jit-provision` (C6) performs
/// the etag read-modify-write dance on top of this; `jit-catalog` (C2)
/// uses `search_project_ids` only when `projectQuery` is configured.
pub trait ResourceManagerClient: Send + Sync {
    fn get_iam_policy(&self, project: &ProjectId, cancellation: &Cancellation) -> JitResult<IamPolicy>;

    /// Write `policy` back. Implementations MUST fail with
    /// `JitError::Conflict` if `policy.etag` no longer matches the
    /// server's current etag (optimistic concurrency, §4.6).
    fn set_iam_policy(&self, project: &ProjectId, policy: &IamPolicy, cancellation: &Cancellation) -> JitResult<()>;

    fn search_project_ids(&self, query: &str, cancellation: &Cancellation) -> JitResult<BTreeSet<ProjectId>>;
}

// ── Outbound: Credentials client (§6) ──────────────────────────────────────

/// The cloud credentials service backing C4. Signing never touches a
/// private key inside this process — `sign_jwt` delegates to the
/// cloud-managed key and returns the already-encoded compact JWT.
pub trait CredentialsClient: Send + Sync {
    fn sign_jwt(
        &self,
        service_account: &str,
        claims: &serde_json::Value,
        cancellation: &Cancellation,
    ) -> JitResult<String>;

    /// Fetch the signing service account's JSON Web Key Set from its
    /// well-known URL (§4.4, §5 "Resource pooling").
    fn fetch_jwks(&self, service_account: &str, cancellation: &Cancellation) -> JitResult<JwkSet>;
}

// ── Outbound: Mail transport (§6, §4.5) ────────────────────────────────────

/// One registered delivery mechanism for notifications. Multiple
/// transports may be registered; the dispatcher delivers once per
/// transport that declares itself functional, and isolates one
/// transport's failure from the others (§4.5, §7).
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this transport is currently able to send mail (e.g. has
    /// valid credentials configured). A non-functional transport is
    /// skipped rather than attempted and failed.
    fn is_functional(&self) -> bool;

    fn send_mail(&self, to: &[String], cc: &[String], subject: &str, html_body: &str) -> JitResult<()>;
}

// ── Outbound: Clock (§6) ────────────────────────────────────────────────────

/// Injectable wall-clock source so state-machine and token validity tests
/// are deterministic (§6, §2a Supplemented Features).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// ── Inbound: Eligibility Analyzer (C1, §4.1) ───────────────────────────────

pub trait EligibilityAnalyzer: Send + Sync {
    fn find_projects_with_eligibilities(
        &self,
        user: &UserId,
        cancellation: &Cancellation,
    ) -> JitResult<BTreeSet<ProjectId>>;

    fn find_eligibilities(
        &self,
        user: &UserId,
        project: &ProjectId,
        types: &[ActivationType],
        statuses: &[EligibilityStatus],
        cancellation: &Cancellation,
    ) -> JitResult<EligibilitySet>;

    /// Peers who hold `activation_type` eligibility on `role_binding`,
    /// via the identity filter over `findPermissionedPrincipalsByResource`
    /// (§4.1 "Identity filter").
    fn find_reviewers(
        &self,
        role_binding: &RoleBinding,
        activation_type: ActivationType,
        cancellation: &Cancellation,
    ) -> JitResult<BTreeSet<UserId>>;
}

// ── Inbound: Role Catalog (C2, §4.2) ───────────────────────────────────────

pub trait RoleCatalog: Send + Sync {
    fn list_projects(&self, user: &UserId, cancellation: &Cancellation) -> JitResult<BTreeSet<ProjectId>>;

    fn list_eligibilities(
        &self,
        user: &UserId,
        project: &ProjectId,
        cancellation: &Cancellation,
    ) -> JitResult<EligibilitySet>;

    fn list_reviewers(
        &self,
        requesting_user: &UserId,
        eligibility: &Eligibility,
        cancellation: &Cancellation,
    ) -> JitResult<BTreeSet<UserId>>;

    /// Re-run eligibility discovery to confirm `user` still qualifies for
    /// every entitlement of `request`, under `request`'s activation type.
    fn verify_user_can_request(
        &self,
        user: &UserId,
        request: &ActivationRequest,
        cancellation: &Cancellation,
    ) -> JitResult<()>;

    /// Confirm `approver` holds the same peer-approval eligibility as the
    /// requester on `request`'s entitlement, and is listed as a reviewer.
    fn verify_user_can_approve(
        &self,
        approver: &UserId,
        request: &MpaRequest,
        cancellation: &Cancellation,
    ) -> JitResult<()>;
}

// ── Inbound: Token Service (C4, §4.4) ──────────────────────────────────────

pub trait TokenService: Send + Sync {
    /// Mint a signed token carrying `request`. Returns the compact JWT
    /// plus its `iat`/`exp`.
    fn sign_token(
        &self,
        request: &MpaRequest,
        cancellation: &Cancellation,
    ) -> JitResult<(String, DateTime<Utc>, DateTime<Utc>)>;

    /// Verify a token and reconstruct the `MpaRequest` it was minted
    /// from. Fails with `JitError::TokenInvalid` on any signature,
    /// algorithm, issuer/audience, or expiry problem (§4.4).
    fn verify_token(&self, token: &str, cancellation: &Cancellation) -> JitResult<MpaRequest>;
}

// ── Inbound: Notifier (C5, §4.5) ───────────────────────────────────────────

pub trait Notifier: Send + Sync {
    /// Render and dispatch `notification`. Never fails the caller —
    /// transport failures are isolated and logged (§7).
    fn dispatch(&self, notification: &Notification);
}

// ── Inbound: Provisioner (C6, §4.6) ────────────────────────────────────────

pub trait Provisioner: Send + Sync {
    /// Write a time-conditioned binding granting `member` the role in
    /// `role_binding` for `window`, with `description` embedded in the
    /// binding's condition (§4.3 "Provisioning contract").
    #[allow(clippy::too_many_arguments)]
    fn provision(
        &self,
        project: &ProjectId,
        role_binding: &RoleBinding,
        member: &str,
        window: (DateTime<Utc>, DateTime<Utc>),
        description: String,
        options: BindingOptions,
        cancellation: &Cancellation,
    ) -> JitResult<()>;
}
