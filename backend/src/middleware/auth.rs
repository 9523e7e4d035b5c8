use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, models::Actor, state::AppState, utils::jwt::verify_access_token};

/// Resolves the caller's identity from a bearer token when one is present and
/// valid. Never rejects; admin routes enforce identity with [`require_staff`].
pub async fn identify(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(actor) = bearer_actor(request.headers(), &state.config.jwt_secret) {
        request.extensions_mut().insert(actor);
    }
    next.run(request).await
}

/// 401 without an identity, 403 for non-staff identities.
pub async fn require_staff(request: Request, next: Next) -> Result<Response, AppError> {
    match request.extensions().get::<Actor>() {
        None => Err(AppError::Unauthorized(
            "Authentication credentials were not provided".into(),
        )),
        Some(actor) if !actor.is_staff => Err(AppError::Forbidden("Forbidden".into())),
        Some(_) => Ok(next.run(request).await),
    }
}

fn bearer_actor(headers: &HeaderMap, secret: &str) -> Option<Actor> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = parse_bearer_token(header)?;
    match verify_access_token(token, secret) {
        Ok(claims) => claims.into_actor(),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring invalid bearer token");
            None
        }
    }
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(rest.trim()).filter(|token| !token.is_empty())
    } else {
        None
    }
}
