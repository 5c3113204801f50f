//! Activation token claim set (§4.4). The JWT's payload, once verified,
//! reconstructs the `MpaRequest` it was minted from.

use serde::{Deserialize, Serialize};

use crate::eligibility::ActivationType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationTokenClaims {
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub beneficiary: String,
    pub reviewers: Vec<String>,
    pub resource: String,
    pub role: String,
    #[serde(rename = "type")]
    pub activation_type: ActivationType,
    pub justification: String,
    pub start: i64,
    pub end: i64,
}
