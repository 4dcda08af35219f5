use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims carried by a staff access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Staff account ID (subject).
    pub sub: i32,
    pub tenant_id: i32,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token has expired")]
    ExpiredToken,
    #[error("token generation failed: {0}")]
    GenerationFailed(String),
}

pub fn issue(
    staff_id: i32,
    tenant_id: i32,
    role: &str,
    secret: &str,
    ttl_minutes: i64,
) -> Result<String, JwtError> {
    let now = Utc::now();
    let claims = Claims {
        sub: staff_id,
        tenant_id,
        role: role.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(ttl_minutes)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| JwtError::GenerationFailed(err.to_string()))
}

pub fn verify(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "iat"]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
        _ => JwtError::InvalidToken(err.to_string()),
    })?;

    Ok(token_data.claims)
}

pub fn extract_from_header(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-which-is-long-enough-0000";

    #[test]
    fn test_issue_and_verify_round_trip() {
        let token = issue(7, 3, "veterinarian", SECRET, 60).expect("Failed to issue token");
        let claims = verify(&token, SECRET).expect("Failed to verify token");

        assert_eq!(claims.sub, 7);
        assert_eq!(claims.tenant_id, 3);
        assert_eq!(claims.role, "veterinarian");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = issue(7, 3, "admin", SECRET, 60).expect("Failed to issue token");
        assert!(verify(&token, "another-secret-which-is-also-long").is_err());
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let token = issue(7, 3, "admin", SECRET, -5).expect("Failed to issue token");
        match verify(&token, SECRET) {
            Err(JwtError::ExpiredToken) => {}
            other => panic!("Expected ExpiredToken, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_from_header() {
        assert_eq!(extract_from_header("Bearer abc"), Some("abc"));
        assert_eq!(extract_from_header("Basic abc"), None);
    }
}
