//! Bearer-token authentication for the subscription endpoints.
//!
//! The calculator endpoints stay public; only subscription state is
//! per-user. Tokens are issued by the identity provider with the shared
//! HS256 secret.

use anyhow::anyhow;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use service_core::error::AppError;

use crate::services::jwt::AccessTokenClaims;
use crate::AppState;

/// Require a valid access token and stash its claims in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError(anyhow!("Missing or invalid Authorization header")))?;

    let claims = state
        .jwt
        .validate_access_token(token)
        .map_err(|_| AppError::AuthError(anyhow!("Invalid or expired token")))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Authenticated user as seen by handlers.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<AccessTokenClaims>()
            .cloned()
            .ok_or_else(|| AppError::AuthError(anyhow!("Missing authentication claims")))?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::AuthError(anyhow!("Token subject is not a valid user id")))?;

        Ok(AuthUser {
            user_id,
            email: claims.email,
        })
    }
}
