use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::error::AppError;
use service_core::utils::signature::constant_time_eq;

use crate::startup::AppState;

pub const TOKEN_HEADER: &str = "token";
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Api-Key";

/// Storefront session token claims. Tokens are issued by the user service.
#[derive(Debug, Clone, Deserialize)]
pub struct UserClaims {
    pub id: String,
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Authenticated storefront user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl AuthUser {
    /// Reject a body that names a different user than the token.
    pub fn ensure_matches(&self, body_user_id: Option<&str>) -> Result<(), AppError> {
        match body_user_id {
            Some(id) if !id.is_empty() && id != self.user_id => {
                tracing::warn!(
                    token_user = %self.user_id,
                    body_user = %id,
                    "Request body user does not match token"
                );
                Err(AppError::Forbidden(anyhow::anyhow!(
                    "Not authorized for this user"
                )))
            }
            _ => Ok(()),
        }
    }
}

fn bearer_or_token(parts: &Parts) -> Option<&str> {
    if let Some(token) = parts
        .headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(token);
    }

    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub fn decode_user_token(token: &str, secret: &str) -> Result<UserClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();

    let data = decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;

    if data.claims.id.is_empty() {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Not authorized, login again"
        )));
    }
    Ok(data.claims)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_or_token(parts).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Not authorized, login again"))
        })?;

        let claims = decode_user_token(token, state.config.auth.jwt_secret.expose_secret())?;

        tracing::Span::current().record("user_id", claims.id.as_str());
        Ok(AuthUser { user_id: claims.id })
    }
}

/// Caller holding the admin API key.
#[derive(Debug, Clone)]
pub struct AdminUser;

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if provided.is_empty()
            || !constant_time_eq(state.config.auth.admin_api_key.expose_secret(), provided)
        {
            tracing::warn!("Failed admin authentication attempt");
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Unauthorized: Invalid or missing admin API key"
            )));
        }

        Ok(AdminUser)
    }
}
