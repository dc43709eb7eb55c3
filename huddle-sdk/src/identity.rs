//! Identity resolution from the platform's bearer credential.
//!
//! The credential is a JWT-shaped token minted by the HR platform's auth
//! flow: three dot-separated base64url segments, the middle one a JSON
//! claims object. Cryptographic verification happens upstream (the broker
//! rejects forged tokens); this resolver only checks structure and fails
//! closed on missing claims so that a session is never opened for a
//! half-formed identity.

use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

/// Who this session speaks as. Derived once per session, immutable after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub tenant_id: String,
    pub member_id: u64,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    /// Not three segments, payload not base64url, or payload not JSON.
    #[error("credential is not a well-formed token")]
    Malformed,

    /// A required claim is absent, empty, or zero.
    #[error("credential is missing required claim `{0}`")]
    MissingClaim(&'static str),
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(rename = "tenantId", default)]
    tenant_id: Option<String>,
    #[serde(rename = "memberId", default)]
    member_id: Option<u64>,
}

/// Decode the claims segment of `credential` into an [`Identity`].
///
/// Pure and idempotent: same token in, same identity out, no I/O.
pub fn resolve(credential: &str) -> Result<Identity, CredentialError> {
    let mut segments = credential.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(CredentialError::Malformed);
    };

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| CredentialError::Malformed)?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|_| CredentialError::Malformed)?;

    let display_name = claims
        .display_name
        .filter(|s| !s.is_empty())
        .ok_or(CredentialError::MissingClaim("displayName"))?;
    let tenant_id = claims
        .tenant_id
        .filter(|s| !s.is_empty())
        .ok_or(CredentialError::MissingClaim("tenantId"))?;
    let member_id = claims
        .member_id
        .filter(|id| *id != 0)
        .ok_or(CredentialError::MissingClaim("memberId"))?;

    Ok(Identity {
        display_name,
        tenant_id,
        member_id,
    })
}
