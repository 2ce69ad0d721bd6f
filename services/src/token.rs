//! Session token issuance. Every trust flow that succeeds (passkey login,
//! recovery code redemption, approved device pairing) ends here.

use chrono::{Duration, Utc};
use db::models::user;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign session token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: String,
    pub exp: usize,
}

/// Signs short-lived session tokens with a fixed secret and lifetime.
/// Carried explicitly rather than read from global config so tests can
/// construct one directly.
#[derive(Clone)]
pub struct SessionSigner {
    secret: String,
    duration_minutes: i64,
}

impl SessionSigner {
    pub fn new(secret: impl Into<String>, duration_minutes: i64) -> Self {
        Self {
            secret: secret.into(),
            duration_minutes,
        }
    }

    pub fn from_config() -> Self {
        let config = common::Config::get();
        Self::new(config.jwt_secret.clone(), config.jwt_duration_minutes)
    }

    pub fn issue(&self, user: &user::Model) -> Result<String, TokenError> {
        let expiration = Utc::now() + Duration::minutes(self.duration_minutes);
        let claims = Claims {
            sub: user.id,
            role: user.role.to_string(),
            exp: expiration.timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::user::Role;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn issued_token_round_trips_claims() {
        let signer = SessionSigner::new("test-secret", 15);
        let user = user::Model {
            id: 42,
            username: "t.moyo".to_string(),
            email: "t.moyo@example.edu".to_string(),
            full_name: "T Moyo".to_string(),
            role: Role::Teacher,
            school_class_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let token = signer.issue(&user).unwrap();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, 42);
        assert_eq!(decoded.claims.role, "teacher");
    }

    #[test]
    fn wrong_secret_fails_validation() {
        let signer = SessionSigner::new("right-secret", 15);
        let user = user::Model {
            id: 1,
            username: "a".to_string(),
            email: "a@example.edu".to_string(),
            full_name: "A".to_string(),
            role: Role::Student,
            school_class_id: Some(3),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let token = signer.issue(&user).unwrap();
        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"wrong-secret"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }
}
