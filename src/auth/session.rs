//! Session authentication for inbound WebSocket connections.
//!
//! The marketplace API issues HS256 session tokens; this server only
//! verifies them against the shared secret supplied by configuration.
//! Verification happens before the upgrade is accepted, so no connection
//! is ever registered unauthenticated.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Account classes of the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Pressing,
    Admin,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "client" => Some(Self::Client),
            "pressing" => Some(Self::Pressing),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Pressing => "pressing",
            Self::Admin => "admin",
        }
    }
}

/// JWT claims carried by the session token.
/// Claims: sub=user_id, role, iat, exp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Decoded identity of an authenticated socket client.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("session token expired")]
    Expired,
    #[error("invalid session token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("unknown role in session token: {0}")]
    UnknownRole(String),
}

/// Validate a session token and return the identity it carries.
pub fn authenticate(secret: &[u8], token: &str) -> Result<Identity, AuthenticationError> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthenticationError::Expired,
            _ => AuthenticationError::Invalid(e),
        })?;

    let role = Role::from_str(&token_data.claims.role)
        .ok_or_else(|| AuthenticationError::UnknownRole(token_data.claims.role.clone()))?;

    Ok(Identity {
        user_id: token_data.claims.sub,
        role,
    })
}
