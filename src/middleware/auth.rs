use axum::{response::{Response, IntoResponse}};
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::Next;
use crate::auth::jwt::verify_token;
use crate::state::AppState;
use serde::Serialize;

#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: i64,
    pub email: String,
}

#[derive(Serialize)]
struct ErrorBody { error: String, code: &'static str }

use axum::http::Request;

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let auth_header = match req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok()) {
        Some(h) => h,
        None => return unauthorized("Missing Authorization header"),
    };

    // Expect "Bearer <token>"
    let token = match auth_header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return unauthorized("Invalid Authorization format"),
    };

    let claims = match verify_token(token, &state.config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return unauthorized("Invalid or expired token"),
    };

    // Attach context
    req.extensions_mut().insert(AuthContext {
        user_id: claims.sub,
        email: claims.email,
    });

    next.run(req).await
}

fn unauthorized(msg: &str) -> Response {
    let body = axum::Json(ErrorBody { error: msg.to_string(), code: "unauthorized" });
    (StatusCode::UNAUTHORIZED, body).into_response()
}
