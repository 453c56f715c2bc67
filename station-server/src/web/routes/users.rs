//! Registration and the caller's own profile.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
};
use tracing::info;

use crate::auth::{AllowAny, Authenticated, hash_password, validate_password};
use crate::web::dto::{UserRequest, UserResponse};
use crate::web::error::{AppError, field_map};
use crate::web::extract::{Access, parse_json};
use crate::web::state::AppState;

/// Hash a new password after checking it against the password rules.
async fn new_password_hash(password: &str) -> Result<String, AppError> {
    validate_password(password).map_err(|errors| {
        AppError::Invalid(field_map(
            errors.iter().map(|e| ("password", e.to_string())),
        ))
    })?;
    Ok(hash_password(password).await?)
}

pub async fn register(
    _: Access<AllowAny>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let (profile, password) = parse_json::<UserRequest>(&body)?.validate(None)?;
    let password = password.ok_or_else(|| AppError::field("password", "This field is required."))?;
    let hash = new_password_hash(&password).await?;

    let user = state.store.insert_user(profile, hash, false).await?;
    info!(user = %user.id, "registered user");
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn me(access: Access<Authenticated>) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(access.user()?.clone().into()))
}

/// `PUT` replaces the profile; `PATCH` only the fields given. A new
/// password is hashed and never echoed.
pub async fn update_me(
    access: Access<Authenticated>,
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<Json<UserResponse>, AppError> {
    let current = access.user()?;
    let base = (method == Method::PATCH).then_some(current);
    let (profile, password) = parse_json::<UserRequest>(&body)?.validate(base)?;
    let hash = match password.filter(|p| !p.is_empty()) {
        Some(p) => Some(new_password_hash(&p).await?),
        None => None,
    };

    let user = state.store.update_user(current.id, profile, hash).await?;
    info!(user = %user.id, "updated profile");
    Ok(Json(user.into()))
}
