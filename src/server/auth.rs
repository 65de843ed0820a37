//! Dashboard session tokens.
//!
//! The web dashboard authenticates account owners with HS256 JWTs carried as
//! `Authorization: Bearer <token>`. The subject is the account email. Tokens
//! are minted by [`SessionTokens::issue`] (the `fitflow_server session`
//! subcommand uses it) and checked by the [`Session`] extractor.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fitflow::server::auth::Session;
//!
//! async fn devices(session: Session) -> impl IntoResponse {
//!     format!("Hello, {}!", session.email)
//! }
//! ```
//!
//! # Configuration
//!
//! - `FITFLOW_SESSION_SECRET` - Required HS256 secret (`env:VAR` indirection allowed)
//! - `auth.session_issuer` - Expected issuer claim (default: "fitflow")
//! - `auth.session_audience` - Expected audience claim (default: "fitflow-dashboard")
//! - `auth.session_ttl_secs` - Token lifetime (default: 7 days)

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{resolve_secret, AuthConfig};
use crate::errors::{LicenseError, LicenseResult};
use crate::server::api_error::{ApiError, ErrorCode};

/// Session token claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Account email
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}

/// Session token failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing Authorization header
    MissingToken,
    /// Authorization header is not `Bearer <token>`
    InvalidHeader,
    /// Token validation failed
    InvalidToken(String),
    TokenExpired,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing session token"),
            AuthError::InvalidHeader => write!(f, "invalid authorization header format"),
            AuthError::InvalidToken(msg) => write!(f, "invalid session token: {msg}"),
            AuthError::TokenExpired => write!(f, "session token has expired"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => ApiError::new(ErrorCode::MissingToken),
            // Clients treat a malformed header like any other bad credential.
            AuthError::InvalidHeader => ApiError::with_message(
                ErrorCode::InvalidToken,
                "Authorization header must be 'Bearer <token>'",
            ),
            AuthError::InvalidToken(_) => ApiError::new(ErrorCode::InvalidToken),
            AuthError::TokenExpired => ApiError::new(ErrorCode::TokenExpired),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Issues and validates dashboard session tokens.
#[derive(Clone)]
pub struct SessionTokens {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl_secs: u64,
}

impl SessionTokens {
    pub fn new(secret: &[u8], issuer: &str, audience: &str, ttl_secs: u64) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.validate_exp = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            encoding_key: EncodingKey::from_secret(secret),
            validation,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            ttl_secs,
        }
    }

    /// Build from `[auth]`; fails when no session secret is configured.
    pub fn from_config(config: &AuthConfig) -> LicenseResult<Self> {
        let secret = resolve_secret(&config.session_secret, "auth.session_secret")?;
        Ok(Self::new(
            secret.as_bytes(),
            &config.session_issuer,
            &config.session_audience,
            config.session_ttl_secs,
        ))
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }

    /// Mint a session token for `email`.
    pub fn issue(&self, email: &str) -> LicenseResult<String> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| LicenseError::ServerError(format!("system time error: {e}")))?
            .as_secs();

        let claims = Claims {
            sub: email.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| LicenseError::ServerError(format!("failed to create session token: {e}")))
    }

    /// Validate the `Authorization` header of a request.
    pub fn authenticate(&self, parts: &Parts) -> Result<Session, AuthError> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidHeader)?;

        let claims = self.validate(token)?;
        Ok(Session {
            email: claims.sub.clone(),
            claims,
        })
    }
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

/// An authenticated dashboard session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Account email from the token subject
    pub email: String,
    pub claims: Claims,
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    Arc<SessionTokens>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = Arc::<SessionTokens>::from_ref(state);
        tokens.authenticate(parts)
    }
}

/// Session if a valid one was presented, `None` otherwise.
///
/// Used by endpoints that accept either a license key or a session.
#[derive(Debug, Clone)]
pub struct OptionalSession(pub Option<Session>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalSession
where
    S: Send + Sync,
    Arc<SessionTokens>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalSession(
            Session::from_request_parts(parts, state).await.ok(),
        ))
    }
}
