// ABOUTME: Auth collaborator resolving socket and request credentials to user ids
// ABOUTME: HS256 JWT verification with a token issuing helper for tooling and tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{Duration, Utc};
use fitpro_core::errors::AuthError;
use fitpro_core::models::UserId;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

/// Resolves a presented credential to the authenticated user
pub trait Authenticator: Send + Sync {
    /// Verify `credential` and return the user it belongs to
    ///
    /// # Errors
    ///
    /// Returns `AuthError` when the credential is missing, invalid, or expired
    fn authenticate(&self, credential: &str) -> Result<UserId, AuthError>;
}

/// JWT claims carried by client tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Expiry, seconds since the epoch
    pub exp: i64,
    /// Issued at, seconds since the epoch
    pub iat: i64,
}

/// HS256 JWT authenticator
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    /// Create an authenticator for the shared secret
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Issue a token for `user_id` valid for `ttl`
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if signing fails
    pub fn issue_token(&self, user_id: &UserId, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            AuthError::InvalidToken {
                reason: e.to_string(),
            }
        })
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, credential: &str) -> Result<UserId, AuthError> {
        let token = credential.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken {
                    reason: e.to_string(),
                },
            }
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken {
                reason: "empty subject".into(),
            });
        }
        Ok(UserId::new(data.claims.sub))
    }
}
