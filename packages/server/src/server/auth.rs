//! Bearer tokens issued by the identity provider.

use anyhow::Result;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{Actor, UserId};

/// JWT claims carried by every request token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl Claims {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: UserId::from_uuid(self.sub),
            is_admin: self.is_admin,
        }
    }
}

/// Signs and verifies HS256 tokens for one issuer.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        }
    }

    /// Issue a token valid for 24 hours. Used by tests and local tooling;
    /// production tokens come from the identity provider.
    pub fn create_token(&self, user_id: UserId, is_admin: bool) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id.into_uuid(),
            is_admin,
            exp: (now + chrono::Duration::hours(24)).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Returns claims when the signature, expiry and issuer all check out.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}
