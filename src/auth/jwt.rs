use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Access token payload. Validation is signature and expiry only; there is
/// no per-request database lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user id
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// HS256 keys derived once from the process-wide secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: Uuid, ttl: Duration) -> Result<(String, Claims), AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))?;
        Ok((token, claims))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::InvalidAccessToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_issue_and_verify() {
        let keys = JwtKeys::new(SECRET);
        let user_id = Uuid::now_v7();
        let (token, issued) = keys.issue(user_id, Duration::minutes(30)).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp, issued.exp);
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = JwtKeys::new(SECRET);
        let (token, _) = keys.issue(Uuid::now_v7(), Duration::minutes(-5)).unwrap();
        assert!(matches!(keys.verify(&token), Err(AppError::InvalidAccessToken)));
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let (token, _) = JwtKeys::new(SECRET)
            .issue(Uuid::now_v7(), Duration::minutes(5))
            .unwrap();
        let other = JwtKeys::new("fedcba9876543210fedcba9876543210");
        assert!(other.verify(&token).is_err());
        assert!(other.verify("not-a-jwt").is_err());
    }

    #[test]
    fn test_each_token_has_unique_jti() {
        let keys = JwtKeys::new(SECRET);
        let user_id = Uuid::now_v7();
        let (_, a) = keys.issue(user_id, Duration::minutes(5)).unwrap();
        let (_, b) = keys.issue(user_id, Duration::minutes(5)).unwrap();
        assert_ne!(a.jti, b.jti);
    }
}
