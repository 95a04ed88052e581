use crate::domain::{DomainError, DomainResult, TokenClaims};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// `type` claim value of application (as opposed to user) tokens
pub const APPLICATION_TOKEN_TYPE: i32 = 2;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    #[serde(default)]
    iss: String,
    #[serde(default)]
    sub: String,
    #[serde(default, rename = "type")]
    kind: i32,
}

/// Reads the token owner's e-mail from JWT claims.
///
/// The signature is not checked here; the identity service that issued the
/// token validates it on every proxied call.
#[derive(Debug, Clone, Default)]
pub struct JwtTokenClaims;

impl JwtTokenClaims {
    pub fn new() -> Self {
        Self
    }

    fn unverified() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation
    }
}

impl TokenClaims for JwtTokenClaims {
    fn get_email(&self, token: &str) -> DomainResult<String> {
        let token = token.strip_prefix(BEARER_PREFIX).unwrap_or(token);

        let data = decode::<IdentityClaims>(token, &DecodingKey::from_secret(&[]), &Self::unverified())
            .map_err(|e| DomainError::InvalidToken(format!("failed to parse authorization token: {e}")))?;

        let claims = data.claims;
        if claims.kind == APPLICATION_TOKEN_TYPE {
            Ok(claims.iss)
        } else {
            Ok(claims.sub)
        }
    }
}
