use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::{
    models::audit_event::EventType,
    services::{EventDescriptor, RequestContext},
    state::AppState,
};

const API_PATH_PREFIX: &str = "/api/";

/// Records every error response on an API path: 401 as UNAUTHORIZED_ACCESS,
/// anything else from 400 up as SUSPICIOUS_ACTIVITY. The recorded event goes
/// through correlation like any other.
pub async fn audit_error_responses(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let context = RequestContext::from_parts(&parts);
    let response = next.run(Request::from_parts(parts, body)).await;

    let status = response.status();
    let Some(descriptor) = describe(&context, status) else {
        return response;
    };
    if let Err(err) = state.monitor.record(descriptor).await {
        tracing::error!(
            error = %err,
            status = status.as_u16(),
            path = ?context.path,
            "failed to record error response"
        );
    }
    response
}

fn describe(context: &RequestContext, status: StatusCode) -> Option<EventDescriptor> {
    let path = context.path.as_deref()?;
    if !path.starts_with(API_PATH_PREFIX) || status.as_u16() < 400 {
        return None;
    }
    let event_type = if status == StatusCode::UNAUTHORIZED {
        EventType::UnauthorizedAccess
    } else {
        EventType::SuspiciousActivity
    };
    Some(
        EventDescriptor::new(event_type, format!("HTTP {} on {}", status.as_u16(), path))
            .context(context.clone())
            .status_code(status.as_u16()),
    )
}
