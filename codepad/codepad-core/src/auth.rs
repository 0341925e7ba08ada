//! Requester identity from bearer tokens.
//!
//! Token issuance lives outside this crate; only verification is modelled.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Claims>;
}

pub struct Hs256Verifier {
    key: DecodingKey,
}

impl Hs256Verifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl TokenVerifier for Hs256Verifier {
    async fn verify(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        let claims = decode::<Claims>(token, &self.key, &validation)
            .ok()
            .map(|d| d.claims)?;
        if let Some(exp) = claims.exp {
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            if exp <= now {
                return None;
            }
        }
        Some(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, claims: &Claims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn hs256_accepts_valid_signature() {
        let verifier = Hs256Verifier::new("s3cret");
        let claims = Claims {
            sub: "alice".to_string(),
            exp: None,
        };
        let verified = verifier.verify(&token("s3cret", &claims)).await.unwrap();
        assert_eq!(verified.sub, "alice");
        assert!(verifier.verify(&token("other", &claims)).await.is_none());
        assert!(verifier.verify("not-a-token").await.is_none());
    }

    #[tokio::test]
    async fn hs256_rejects_expired_tokens() {
        let verifier = Hs256Verifier::new("s3cret");
        let claims = Claims {
            sub: "alice".to_string(),
            exp: Some(1),
        };
        assert!(verifier.verify(&token("s3cret", &claims)).await.is_none());
    }
}
