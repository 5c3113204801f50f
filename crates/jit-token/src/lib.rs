//! # jit-token — Activation Token Service (C4, §4.4)
//!
//! Mints and verifies RS256 JWTs over the cloud-managed signing key. The
//! signing key itself never enters this process — `CredentialsClient`
//! delegates to the cloud credentials service; only verification needs a
//! local key, fetched as a JWKS document and cached (§5 "Resource
//! pooling").

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tracing::debug;

use jit_contracts::cancellation::Cancellation;
use jit_contracts::eligibility::ActivationType;
use jit_contracts::error::{JitError, JitResult};
use jit_contracts::ids::{RoleBinding, UserId};
use jit_contracts::request::{ActivationId, MpaRequest};
use jit_contracts::token::ActivationTokenClaims;
use jit_core::traits::{Clock, CredentialsClient, TokenService};

struct CachedJwks {
    jwks: JwkSet,
    fetched_at: DateTime<Utc>,
}

/// The production `TokenService` (C4).
pub struct JwtTokenService {
    credentials: Box<dyn CredentialsClient>,
    clock: Box<dyn Clock>,
    service_account: String,
    token_validity: Duration,
    jwks_refresh_interval: Duration,
    jwks_cache: Mutex<Option<CachedJwks>>,
}

impl JwtTokenService {
    pub fn new(
        credentials: Box<dyn CredentialsClient>,
        clock: Box<dyn Clock>,
        service_account: String,
        token_validity: Duration,
    ) -> Self {
        Self {
            credentials,
            clock,
            service_account,
            token_validity,
            jwks_refresh_interval: Duration::from_secs(3600),
            jwks_cache: Mutex::new(None),
        }
    }

    pub fn with_jwks_refresh_interval(mut self, interval: Duration) -> Self {
        self.jwks_refresh_interval = interval;
        self
    }

    fn jwks(&self, cancellation: &Cancellation) -> JitResult<JwkSet> {
        let now = self.clock.now();
        {
            let cache = self.jwks_cache.lock().unwrap();
            if let Some(cached) = cache.as_ref() {
                let age = now - cached.fetched_at;
                if age < chrono::Duration::from_std(self.jwks_refresh_interval).unwrap_or(chrono::Duration::zero()) {
                    return Ok(cached.jwks.clone());
                }
            }
        }

        let jwks = self.credentials.fetch_jwks(&self.service_account, cancellation)?;
        *self.jwks_cache.lock().unwrap() = Some(CachedJwks { jwks: jwks.clone(), fetched_at: now });
        Ok(jwks)
    }
}

impl TokenService for JwtTokenService {
    fn sign_token(
        &self,
        request: &MpaRequest,
        cancellation: &Cancellation,
    ) -> JitResult<(String, DateTime<Utc>, DateTime<Utc>)> {
        let iat = self.clock.now();
        let exp = iat
            + chrono::Duration::from_std(self.token_validity)
                .map_err(|e| JitError::ConfigError { reason: format!("invalid token validity: {e}") })?;
        let end = request.start_time
            + chrono::Duration::from_std(request.duration)
                .map_err(|e| JitError::InvalidArgument { reason: format!("invalid duration: {e}") })?;
        let entitlement = request.entitlement();

        let claims = ActivationTokenClaims {
            iss: self.service_account.clone(),
            aud: self.service_account.clone(),
            iat: iat.timestamp(),
            exp: exp.timestamp(),
            jti: request.id.to_string(),
            beneficiary: request.requesting_user.email.clone(),
            reviewers: request.reviewers.iter().map(|r| r.email.clone()).collect(),
            resource: entitlement.resource.clone(),
            role: entitlement.role.clone(),
            activation_type: ActivationType::PeerApproval,
            justification: request.justification.clone(),
            start: request.start_time.timestamp(),
            end: end.timestamp(),
        };

        let payload = serde_json::to_value(&claims)
            .map_err(|e| JitError::ConfigError { reason: format!("failed to encode token claims: {e}") })?;
        let jwt = self.credentials.sign_jwt(&self.service_account, &payload, cancellation)?;

        debug!(jti = %claims.jti, beneficiary = %claims.beneficiary, "signed activation token");
        Ok((jwt, iat, exp))
    }

    fn verify_token(&self, token: &str, cancellation: &Cancellation) -> JitResult<MpaRequest> {
        let header = decode_header(token).map_err(|e| JitError::TokenInvalid { reason: e.to_string() })?;
        if header.alg != Algorithm::RS256 {
            return Err(JitError::TokenInvalid { reason: format!("unexpected algorithm {:?}", header.alg) });
        }

        let jwks = self.jwks(cancellation)?;
        let jwk = match &header.kid {
            Some(kid) => jwks.find(kid),
            None => jwks.keys.first(),
        }
        .ok_or_else(|| JitError::TokenInvalid { reason: "no matching signing key in JWKS".into() })?;
        let decoding_key = DecodingKey::from_jwk(jwk).map_err(|e| JitError::TokenInvalid { reason: e.to_string() })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.service_account]);
        validation.set_issuer(&[&self.service_account]);

        let decoded = decode::<ActivationTokenClaims>(token, &decoding_key, &validation)
            .map_err(|e| JitError::TokenInvalid { reason: e.to_string() })?;
        let claims = decoded.claims;

        let id = ActivationId(claims.jti.clone());
        if id.activation_type() != Some(ActivationType::PeerApproval) {
            return Err(JitError::TokenInvalid { reason: "token id is not an MPA activation id".into() });
        }

        let start = DateTime::<Utc>::from_timestamp(claims.start, 0)
            .ok_or_else(|| JitError::TokenInvalid { reason: "invalid start claim".into() })?;
        let end = DateTime::<Utc>::from_timestamp(claims.end, 0)
            .ok_or_else(|| JitError::TokenInvalid { reason: "invalid end claim".into() })?;
        if end <= start {
            return Err(JitError::TokenInvalid { reason: "end claim is not after start claim".into() });
        }
        let duration = (end - start)
            .to_std()
            .map_err(|e| JitError::TokenInvalid { reason: format!("invalid window: {e}") })?;

        Ok(MpaRequest {
            id,
            requesting_user: UserId::new(claims.beneficiary.clone(), claims.beneficiary.clone()),
            entitlements: vec![RoleBinding::new(claims.resource.clone(), claims.role.clone())],
            reviewers: claims.reviewers.into_iter().map(|email| UserId::new(email.clone(), email)).collect(),
            justification: claims.justification,
            start_time: start,
            duration,
        })
    }
}
