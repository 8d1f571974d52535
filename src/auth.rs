use std::collections::BTreeSet;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Claims
///
/// The typed payload carried inside every bearer token. Decoding fails when the
/// token's JSON does not have exactly this shape, so downstream code never sees a
/// partially populated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's UUID.
    pub id: Uuid,
    /// Role name the permissions were resolved from.
    pub role: String,
    /// Permission codes granted to the subject.
    pub permissions: BTreeSet<String>,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds). Always validated.
    pub exp: i64,
}

impl Claims {
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.contains(code)
    }
}

/// Returns the token carried by an `Authorization` header value: everything after
/// the first space. `None` when the header is absent, not UTF-8, or empty after
/// the scheme.
pub fn bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
}

/// TokenVerifier
///
/// HS256 verifier built from the shared secret handed in by configuration.
/// Signature and expiry are checked on every call; there is no caching.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key material stays out of logs
        f.debug_struct("TokenVerifier")
            .field("validation", &self.validation)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verifies a raw token and returns its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!(error = %e, kind = ?e.kind(), "access token verification failed");
                AppError::AuthenticationInvalid
            })
    }

    /// Full header-to-claims path: missing credential and bad credential are
    /// reported as distinct errors.
    pub fn verify_header(&self, value: Option<&HeaderValue>) -> Result<Claims, AppError> {
        let token = bearer_token(value).ok_or(AppError::AuthenticationMissing)?;
        self.verify(token)
    }
}

/// TokenIssuer
///
/// Signs claims for the login endpoint with the same shared secret the verifier
/// uses.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn issue<I>(&self, id: Uuid, role: &str, permissions: I) -> Result<(String, Claims), AppError>
    where
        I: IntoIterator<Item = String>,
    {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            id,
            role: role.to_string(),
            permissions: permissions.into_iter().collect(),
            iat,
            exp: iat + self.ttl_secs,
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "failed to sign access token");
            AppError::Internal
        })
    }
}

/// authenticate
///
/// Middleware guarding every protected route. Extracts the bearer token, verifies
/// it, and stores the decoded `Claims` in the request extensions for the
/// permission gate and the `AuthUser` extractor.
pub async fn authenticate(
    State(verifier): State<TokenVerifier>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = verifier.verify_header(request.headers().get(header::AUTHORIZATION))?;

    tracing::debug!(user_id = %claims.id, role = %claims.role, "request authenticated");
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// AuthUser
///
/// The resolved identity of an authenticated request, as seen by handlers.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
    pub permissions: BTreeSet<String>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            role: claims.role,
            permissions: claims.permissions,
        }
    }
}

/// Reads the claims left by `authenticate`. A handler reached without them is
/// mounted outside the authenticated tree and gets `NotAuthenticated`.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser::from)
            .ok_or(AppError::NotAuthenticated)
    }
}
