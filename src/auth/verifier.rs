//! Bearer token verification against the identity provider's signing key.
//!
//! Key material is decoded once when the verifier is built. Each call then
//! only parses the token, checks the RS256 signature, and validates the
//! `exp`, `iss` and `aud` claims before handing back the `sub` claim.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::auth::Identity;
use crate::config::{AuthConfig, KeySource};
use crate::error::AuthError;

/// Claims this service reads from a verified token.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Verifies compact JWTs issued by the trusted identity provider.
pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for IdentityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityVerifier")
            .field("issuer", &self.validation.iss)
            .field("audience", &self.validation.aud)
            .finish_non_exhaustive()
    }
}

impl IdentityVerifier {
    /// Build a verifier from static identity provider settings.
    ///
    /// Fails if the configured key material cannot be decoded.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let key = match &config.key {
            KeySource::PemBase64(encoded) => {
                let pem = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| AuthError::InvalidKey(format!("base64: {}", e)))?;
                DecodingKey::from_rsa_pem(&pem)
                    .map_err(|e| AuthError::InvalidKey(format!("pem: {}", e)))?
            }
            KeySource::RsaComponents { n, e } => DecodingKey::from_rsa_components(n, e)
                .map_err(|err| AuthError::InvalidKey(format!("rsa components: {}", err)))?,
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Ok(Self { key, validation })
    }

    /// Verify a token and return the identity named by its subject.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::EmptySubject);
        }
        Ok(Identity::new(data.claims.sub))
    }
}
