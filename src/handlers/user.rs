use bcrypt::{hash, verify};
use crate::dtos::user::{RegisterUserRequest, UserResponse, LoginRequest, LoginResponse};
use crate::auth::jwt::sign_token;
use crate::error::AppError;
use crate::models::user::NewUser;
use axum::{extract::State, Json};
use crate::state::AppState;
use crate::middleware::auth::AuthContext;
use axum::extract::Extension;
use tracing::{info, instrument};

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>
) -> Result<(axum::http::StatusCode, Json<UserResponse>), AppError> {
    // Basic validation
    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("Valid email required"));
    }
    if payload.business_name.trim().is_empty() {
        return Err(AppError::validation("Business name required"));
    }
    if payload.password.len() < 8 {
        return Err(AppError::validation("Password too short"));
    }

    let password_hash = hash(&payload.password, state.config.bcrypt_cost)
        .map_err(|e| AppError::internal(format!("Hash error: {e}")))?;

    let user = state.store.create_user(NewUser {
        email: email.to_string(),
        password_hash,
        business_name: payload.business_name.trim().to_string(),
    })
    .await?;

    info!(user_id = user.id, "Registered new account");

    Ok((axum::http::StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>
) -> Result<Json<LoginResponse>, AppError> {
    if payload.email.trim().is_empty() {
        return Err(AppError::validation("Email required"));
    }
    if payload.password.is_empty() {
        return Err(AppError::validation("Password required"));
    }

    let user = state.store
        .find_user_by_email(payload.email.trim())
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

    if !user.is_active {
        return Err(AppError::forbidden("User inactive"));
    }

    let ok = verify(&payload.password, &user.password_hash)
        .map_err(|e| AppError::internal(format!("Password verify error: {e}")))?;

    if !ok {
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let ttl_hours = state.config.token_ttl_hours;
    let token = sign_token(user.id, &user.email, &state.config.jwt_secret, ttl_hours)?;

    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in_seconds: ttl_hours * 60 * 60,
    }))
}

// Authenticated endpoint: returns the account behind the token
#[instrument(skip(state, auth), fields(email = %auth.email))]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>
) -> Result<Json<UserResponse>, AppError> {
    let user = state.store
        .find_user(auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(UserResponse::from(user)))
}
