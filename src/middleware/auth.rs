use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtKey;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Validates bearer tokens issued by the identity service.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_config(key: &JwtKey) -> Result<Self, AppError> {
        let (key, algorithm) = match key {
            JwtKey::Secret(secret) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            JwtKey::PublicKeyPem(pem) => (
                DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| AppError::Config(format!("invalid JWT public key: {e}")))?,
                Algorithm::RS256,
            ),
        };
        let mut validation = Validation::new(algorithm);
        validation.leeway = 30;
        Ok(Self { key, validation })
    }

    /// Returns the authenticated user id (`sub`).
    pub fn verify(&self, token: &str) -> Result<Uuid, AppError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AppError::Unauthorized
        })?;
        Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::Unauthorized)
    }
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "unit-test-secret-that-is-long-enough-32b";

    fn token(sub: &str, exp_offset: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as usize;
        encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                sub: sub.to_string(),
                exp,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_user_id() {
        let verifier = JwtVerifier::from_config(&JwtKey::Secret(SECRET.into())).unwrap();
        let user = Uuid::new_v4();
        assert_eq!(verifier.verify(&token(&user.to_string(), 3600)).unwrap(), user);
    }

    #[test]
    fn test_rejects_expired_and_malformed() {
        let verifier = JwtVerifier::from_config(&JwtKey::Secret(SECRET.into())).unwrap();
        assert!(verifier
            .verify(&token(&Uuid::new_v4().to_string(), -3600))
            .is_err());
        assert!(verifier.verify(&token("not-a-uuid", 3600)).is_err());
        assert!(verifier.verify("garbage").is_err());
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(Some("Bearer  ")), None);
        assert_eq!(bearer_token(None), None);
    }
}
