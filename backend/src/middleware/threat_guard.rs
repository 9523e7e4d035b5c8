//! Guards run before any handler: the deny-list check, then signature
//! inspection. Each guard either passes the request on or ends it with a
//! terminal response. Guard infrastructure failures let the request through
//! and are recorded as SUSPICIOUS_ACTIVITY.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use http_body::{Body as HttpBody, Frame};
use http_body_util::BodyExt;
use serde_json::json;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::{
    models::audit_event::EventType,
    services::{
        pattern_matcher::{self, ThreatCategory},
        EventDescriptor, RequestContext,
    },
    state::AppState,
};

const MAX_BUFFERED_BODY_BYTES: usize = 64 * 1024;

enum Verdict {
    Pass,
    Reject(Response),
}

pub async fn threat_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let context = RequestContext::from_parts(&parts);

    if let Verdict::Reject(response) = blocklist_guard(&state, &context).await {
        return response;
    }

    let (request, inspected) = if pattern_matcher::carries_body(&parts.method) {
        buffer_request_body(Request::from_parts(parts, body)).await
    } else {
        (Request::from_parts(parts, body), InspectedBody::default())
    };

    let text = pattern_matcher::request_text(
        request.uri().path(),
        request.uri().query(),
        request.method(),
        Some(&inspected.bytes[..]),
    );
    if let Verdict::Reject(response) =
        signature_guard(&state, &context, &text, inspected.complete).await
    {
        return response;
    }

    next.run(request).await
}

async fn blocklist_guard(state: &AppState, context: &RequestContext) -> Verdict {
    let Some(ip) = context.ip.as_deref() else {
        return Verdict::Pass;
    };
    match state.blocks.check(ip).await {
        Ok(false) => Verdict::Pass,
        Ok(true) => {
            record(
                state,
                EventDescriptor::new(
                    EventType::UnauthorizedAccess,
                    format!("Blocked IP attempted access: {}", ip),
                )
                .context(context.clone()),
            )
            .await;
            Verdict::Reject(
                (StatusCode::FORBIDDEN, Json(json!({ "error": "Access denied" }))).into_response(),
            )
        }
        Err(err) => {
            tracing::warn!(error = %err, ip_address = %ip, "block list lookup failed, allowing request");
            record(
                state,
                EventDescriptor::new(
                    EventType::SuspiciousActivity,
                    format!("Block list unavailable; request from {} allowed unchecked", ip),
                )
                .context(context.clone())
                .extra("guard", "blocklist")
                .extra("error", err.to_string()),
            )
            .await;
            Verdict::Pass
        }
    }
}

async fn signature_guard(
    state: &AppState,
    context: &RequestContext,
    text: &str,
    body_complete: bool,
) -> Verdict {
    let source = context.ip.as_deref().unwrap_or("unknown");
    if !body_complete {
        // The inspected prefix is still matched below.
        record(
            state,
            EventDescriptor::new(
                EventType::SuspiciousActivity,
                format!("Request body from {} could not be fully inspected", source),
            )
            .context(context.clone())
            .extra("guard", "signature")
            .extra("max_inspected_bytes", MAX_BUFFERED_BODY_BYTES),
        )
        .await;
    }

    let descriptor = match state.matcher.inspect(text) {
        ThreatCategory::None => return Verdict::Pass,
        ThreatCategory::Sql => EventDescriptor::new(
            EventType::SqlInjectionAttempt,
            format!("SQL injection pattern from {}", source),
        )
        .extra("preview", pattern_matcher::preview(text)),
        ThreatCategory::Xss => EventDescriptor::new(
            EventType::XssAttempt,
            format!("XSS pattern from {}", source),
        ),
    };
    record(state, descriptor.context(context.clone())).await;
    Verdict::Reject(
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Malicious request detected" })),
        )
            .into_response(),
    )
}

async fn record(state: &AppState, descriptor: EventDescriptor) {
    let event_type = descriptor.event_type.clone();
    if let Err(err) = state.monitor.record(descriptor).await {
        tracing::error!(error = %err, event_type = %event_type, "failed to record guard event");
    }
}

struct BufferedBody {
    buffered: VecDeque<Frame<Bytes>>,
    inner: Body,
    pending_error: Option<axum::Error>,
}

impl BufferedBody {
    fn new(
        buffered: VecDeque<Frame<Bytes>>,
        inner: Body,
        pending_error: Option<axum::Error>,
    ) -> Self {
        Self {
            buffered,
            inner,
            pending_error,
        }
    }

    fn buffered_len(&self) -> u64 {
        self.buffered
            .iter()
            .filter_map(|frame| frame.data_ref().map(|data| data.len() as u64))
            .sum()
    }
}

impl HttpBody for BufferedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(frame) = this.buffered.pop_front() {
            return Poll::Ready(Some(Ok(frame)));
        }
        if let Some(err) = this.pending_error.take() {
            this.inner = Body::empty();
            return Poll::Ready(Some(Err(err)));
        }
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn size_hint(&self) -> http_body::SizeHint {
        let buffered_len = self.buffered_len();
        let mut hint = self.inner.size_hint();
        hint.set_lower(hint.lower().saturating_add(buffered_len));
        if let Some(upper) = hint.upper() {
            hint.set_upper(upper.saturating_add(buffered_len));
        }
        hint
    }

    fn is_end_stream(&self) -> bool {
        if !self.buffered.is_empty() || self.pending_error.is_some() {
            return false;
        }
        self.inner.is_end_stream()
    }
}

/// Bytes of a request body available to the signature guard.
struct InspectedBody {
    /// At most `MAX_BUFFERED_BODY_BYTES` from the start of the body.
    bytes: Bytes,
    /// False when the body ran past the limit or failed mid-stream.
    complete: bool,
}

impl Default for InspectedBody {
    fn default() -> Self {
        Self {
            bytes: Bytes::new(),
            complete: true,
        }
    }
}

/// Reads up to 64 KiB of the body for inspection and rebuilds the request so
/// the handler still sees every byte. A body larger than the limit, or one
/// that fails mid-stream, yields the prefix read so far.
async fn buffer_request_body(request: Request) -> (Request, InspectedBody) {
    let (parts, mut body) = request.into_parts();
    let mut buffered_frames = VecDeque::new();
    let mut buffered_bytes = Vec::new();
    let mut overflowed = false;
    let mut pending_error = None;

    while let Some(frame_result) = body.frame().await {
        match frame_result {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    let room = MAX_BUFFERED_BODY_BYTES - buffered_bytes.len();
                    if data.len() > room {
                        buffered_bytes.extend_from_slice(&data[..room]);
                        overflowed = true;
                    } else {
                        buffered_bytes.extend_from_slice(data);
                    }
                }
                buffered_frames.push_back(frame);
                if overflowed {
                    break;
                }
            }
            Err(err) => {
                pending_error = Some(err);
                break;
            }
        }
    }

    let inspected = InspectedBody {
        bytes: Bytes::from(buffered_bytes),
        complete: !overflowed && pending_error.is_none(),
    };
    let replay_body = BufferedBody::new(buffered_frames, body, pending_error);
    (Request::from_parts(parts, Body::new(replay_body)), inspected)
}
