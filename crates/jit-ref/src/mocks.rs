//! In-memory reference outbound clients: a policy-analysis client driven
//! by a fixed table of bindings, an etag-tracked IAM policy store, a local
//! RSA-backed credentials client, and a mail sink that records what it
//! would have sent. None of these are production adapters — they exist so
//! `scenarios` and `demo` can drive a complete `Activator` without a real
//! cloud backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use jsonwebtoken::jwk::{AlgorithmParameters, CommonParameters, Jwk, JwkSet, PublicKeyUse, RSAKeyParameters, RSAKeyType};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;

use jit_contracts::analysis::{AnalysisResponse, AnalysisResult, IamPolicy};
use jit_contracts::cancellation::Cancellation;
use jit_contracts::error::{JitError, JitResult};
use jit_contracts::ids::{ProjectId, ScopeId, UserId};
use chrono::{DateTime, Utc};
use jit_core::traits::{Clock, CredentialsClient, MailTransport, PolicyAnalysisClient, ResourceManagerClient};

/// A wall clock pinned to a fixed instant, so scenario outcomes (start/end
/// times, token `iat`/`exp`) are deterministic.
#[derive(Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Every `AnalysisResult` the mock returns for a given user, regardless of
/// the caller's resource/permission filter — `jit-analyzer` applies the
/// real filtering logic on top, so the mock only needs to hand back the
/// raw table.
#[derive(Default, Clone)]
pub struct FixedPolicyAnalysisClient {
    by_user: HashMap<String, Vec<AnalysisResult>>,
    principals_by_resource_role: HashMap<(String, String), Vec<String>>,
}

impl FixedPolicyAnalysisClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, user_email: impl Into<String>, results: Vec<AnalysisResult>) -> Self {
        self.by_user.entry(user_email.into()).or_default().extend(results);
        self
    }

    pub fn with_principals(mut self, resource: impl Into<String>, role: impl Into<String>, principals: Vec<String>) -> Self {
        self.principals_by_resource_role.insert((resource.into(), role.into()), principals);
        self
    }
}

impl PolicyAnalysisClient for FixedPolicyAnalysisClient {
    fn find_accessible_resources_by_user(
        &self,
        _scope: &ScopeId,
        user: &UserId,
        _permission_filter: Option<&str>,
        _resource_filter: Option<&str>,
        _expand: bool,
        _cancellation: &Cancellation,
    ) -> JitResult<AnalysisResponse> {
        let results = self.by_user.get(&user.email).cloned().unwrap_or_default();
        Ok(AnalysisResponse { results, warnings: vec![] })
    }

    fn find_permissioned_principals_by_resource(
        &self,
        _scope: &ScopeId,
        resource_full_name: &str,
        role: &str,
        _cancellation: &Cancellation,
    ) -> JitResult<Vec<String>> {
        Ok(self
            .principals_by_resource_role
            .get(&(resource_full_name.to_string(), role.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// An in-memory IAM policy store keyed by project id, with an
/// incrementing etag per write — enough to exercise `jit-provision`'s
/// optimistic-concurrency path.
#[derive(Clone, Default)]
pub struct InMemoryResourceManagerClient {
    policies: Arc<Mutex<HashMap<String, IamPolicy>>>,
}

impl InMemoryResourceManagerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy_for(&self, project: &ProjectId) -> IamPolicy {
        self.policies.lock().unwrap().get(&project.0).cloned().unwrap_or(IamPolicy { bindings: vec![], etag: "0".into() })
    }
}

impl ResourceManagerClient for InMemoryResourceManagerClient {
    fn get_iam_policy(&self, project: &ProjectId, _cancellation: &Cancellation) -> JitResult<IamPolicy> {
        Ok(self.policy_for(project))
    }

    fn set_iam_policy(&self, project: &ProjectId, policy: &IamPolicy, _cancellation: &Cancellation) -> JitResult<()> {
        let mut policies = self.policies.lock().unwrap();
        let current_etag = policies.get(&project.0).map(|p| p.etag.clone()).unwrap_or_else(|| "0".into());
        if policy.etag != current_etag {
            return Err(JitError::Conflict { reason: format!("etag mismatch on project {}", project.0) });
        }
        let next_etag = (current_etag.parse::<u64>().unwrap_or(0) + 1).to_string();
        policies.insert(project.0.clone(), IamPolicy { bindings: policy.bindings.clone(), etag: next_etag });
        Ok(())
    }

    fn search_project_ids(&self, query: &str, _cancellation: &Cancellation) -> JitResult<std::collections::BTreeSet<ProjectId>> {
        Ok(self.policies.lock().unwrap().keys().filter(|id| id.contains(query)).map(|id| ProjectId::new(id.clone())).collect())
    }
}

/// A local RSA keypair standing in for the cloud credentials service.
/// Stores the PEM rather than a built `EncodingKey` so the same keypair
/// can back multiple consumers (e.g. a signer and a verifier in the same
/// scenario) via `Clone`.
#[derive(Clone)]
pub struct LocalCredentialsClient {
    private_key_pem: String,
    jwks: JwkSet,
}

impl LocalCredentialsClient {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation");
        let pem = private_key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).expect("PEM encode").to_string();

        let public_key = private_key.to_public_key();
        let n = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, public_key.n().to_bytes_be());
        let e = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, public_key.e().to_bytes_be());

        let jwk = Jwk {
            common: CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_id: Some("jit-ref-key".to_string()),
                ..Default::default()
            },
            algorithm: AlgorithmParameters::RSA(RSAKeyParameters { key_type: RSAKeyType::RSA, n, e }),
        };

        Self { private_key_pem: pem, jwks: JwkSet { keys: vec![jwk] } }
    }
}

impl CredentialsClient for LocalCredentialsClient {
    fn sign_jwt(&self, _service_account: &str, claims: &serde_json::Value, _cancellation: &Cancellation) -> JitResult<String> {
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .map_err(|e| JitError::ConfigError { reason: format!("invalid signing key: {e}") })?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("jit-ref-key".to_string());
        encode(&header, claims, &encoding_key).map_err(|e| JitError::Transient { reason: e.to_string() })
    }

    fn fetch_jwks(&self, _service_account: &str, _cancellation: &Cancellation) -> JitResult<JwkSet> {
        Ok(self.jwks.clone())
    }
}

/// One piece of mail the sink would have sent.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Records every mail it is asked to send instead of delivering it.
#[derive(Clone, Default)]
pub struct InMemoryMailTransport {
    sent: Arc<Mutex<Vec<SentMail>>>,
}

impl InMemoryMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

impl MailTransport for InMemoryMailTransport {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn is_functional(&self) -> bool {
        true
    }

    fn send_mail(&self, to: &[String], cc: &[String], subject: &str, html_body: &str) -> JitResult<()> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_vec(),
            cc: cc.to_vec(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}
