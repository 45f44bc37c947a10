//! JWT Authentication
//!
//! Binds a connection to a wallet address. Tokens come from an external
//! sign-in-with-wallet provider; the server only validates them and requires
//! the `sub` claim to be the address the client plays as. Without an auth
//! provider configured the claimed address is trusted (development mode).

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::core::address::PlayerAddress;
use crate::network::protocol::{AuthRequest, ErrorCode};

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format (preferred for external providers).
    pub public_key_pem: Option<String>,
    /// HS256 secret (fallback for simple setups).
    pub secret: Option<String>,
    /// Whether to skip expiry validation (for testing only).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Check if authentication is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// JWT claims we expect from the wallet sign-in provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject - the wallet address.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer (auth provider).
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// The wallet address in the subject claim.
    pub fn address(&self) -> Result<PlayerAddress, AuthError> {
        self.sub.parse().map_err(|_| AuthError::InvalidSubject)
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authentication configured on server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Claimed address is malformed.
    #[error("invalid address")]
    InvalidAddress,
    /// Auth is configured but no token was sent.
    #[error("token required")]
    MissingToken,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match expected value.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Subject is not a wallet address.
    #[error("subject is not a wallet address")]
    InvalidSubject,
    /// Token belongs to a different address than the one claimed.
    #[error("token does not match claimed address")]
    AddressMismatch,
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
}

impl AuthError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::InvalidAddress => ErrorCode::InvalidAddress,
            AuthError::Expired => ErrorCode::TokenExpired,
            AuthError::InvalidFormat
            | AuthError::InvalidSignature
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::MissingClaim(_)
            | AuthError::InvalidSubject
            | AuthError::DecodeError(_) => ErrorCode::InvalidToken,
            AuthError::NotConfigured | AuthError::MissingToken | AuthError::AddressMismatch => {
                ErrorCode::AuthFailed
            }
        }
    }
}

/// Resolve the address an auth request may play as.
pub fn authenticate(request: &AuthRequest, config: &AuthConfig) -> Result<PlayerAddress, AuthError> {
    let claimed: PlayerAddress = request
        .address
        .parse()
        .map_err(|_| AuthError::InvalidAddress)?;

    if !config.is_configured() {
        return Ok(claimed);
    }

    let token = request.token.as_deref().ok_or(AuthError::MissingToken)?;
    let claims = validate_token(token, config)?;
    if claims.address()? != claimed {
        return Err(AuthError::AddressMismatch);
    }

    Ok(claimed)
}

/// Validate a JWT token and extract claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    // Determine algorithm based on config
    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else {
        Algorithm::HS256
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = if let Some(ref pem) = config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else if let Some(ref secret) = config.secret {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else {
        return Err(AuthError::NotConfigured);
    };

    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // Manual expiry check (in case validation was skipped)
    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key-256-bits-long!!";
    const WALLET: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";

    fn create_test_token(claims: &TokenClaims, secret: &str) -> String {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&header, claims, &key).unwrap()
    }

    fn test_claims() -> TokenClaims {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        TokenClaims {
            sub: WALLET.into(),
            exp: now + 3600,
            iat: now,
            iss: Some("test-issuer".into()),
            aud: Some(serde_json::json!("test-audience")),
        }
    }

    fn secret_config() -> AuthConfig {
        AuthConfig {
            secret: Some(SECRET.into()),
            ..Default::default()
        }
    }

    fn request(address: &str, token: Option<String>) -> AuthRequest {
        AuthRequest {
            address: address.into(),
            token,
            client_version: "test".into(),
        }
    }

    #[test]
    fn test_valid_token_validation() {
        let token = create_test_token(&test_claims(), SECRET);
        let claims = validate_token(&token, &secret_config()).unwrap();
        assert_eq!(claims.address().unwrap().to_string(), WALLET);
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = test_claims();
        claims.exp = 1;
        let token = create_test_token(&claims, SECRET);

        let result = validate_token(&token, &secret_config());
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let token = create_test_token(&test_claims(), "correct-secret-key-here!!!!!");
        let config = AuthConfig {
            secret: Some("wrong-secret-key-here!!!!!!".into()),
            ..Default::default()
        };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_issuer_validation() {
        let token = create_test_token(&test_claims(), SECRET);
        let config = AuthConfig {
            issuer: Some("wrong-issuer".into()),
            ..secret_config()
        };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidIssuer)));
    }

    #[test]
    fn test_not_configured_error() {
        let result = validate_token("some.jwt.token", &AuthConfig::default());
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn test_dev_mode_trusts_claimed_address() {
        let req = request("0x7E5F4552091A69125D5DFCB7B8C2659029395BDF", None);
        let address = authenticate(&req, &AuthConfig::default()).unwrap();
        assert_eq!(address.to_string(), WALLET);
    }

    #[test]
    fn test_bad_address_rejected() {
        let req = request("not-an-address", None);
        let err = authenticate(&req, &AuthConfig::default()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidAddress));
        assert_eq!(err.code(), ErrorCode::InvalidAddress);
    }

    #[test]
    fn test_token_required_when_configured() {
        let req = request(WALLET, None);
        let err = authenticate(&req, &secret_config()).unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
    }

    #[test]
    fn test_token_must_match_address() {
        let token = create_test_token(&test_claims(), SECRET);

        let ok = authenticate(&request(WALLET, Some(token.clone())), &secret_config());
        assert!(ok.is_ok());

        let other = "0x2b5ad5c4795c026514f8317c7a215e218dccd6cf";
        let err = authenticate(&request(other, Some(token)), &secret_config()).unwrap_err();
        assert!(matches!(err, AuthError::AddressMismatch));
    }

    #[test]
    fn test_non_address_subject_rejected() {
        let mut claims = test_claims();
        claims.sub = "user123".into();
        let token = create_test_token(&claims, SECRET);

        let err = authenticate(&request(WALLET, Some(token)), &secret_config()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidSubject));
    }
}
