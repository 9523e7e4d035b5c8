use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Identifier tying together the events recorded for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = inbound_id(req.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    response
}

/// Caller-supplied id, if it is short printable ASCII. Anything else is
/// replaced so it cannot smuggle content into stored events.
fn inbound_id(headers: &HeaderMap) -> Option<String> {
    [REQUEST_ID_HEADER, CORRELATION_ID_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| {
            !value.is_empty()
                && value.len() <= MAX_REQUEST_ID_LEN
                && value.bytes().all(|b| b.is_ascii_graphic())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "abc-123".parse().unwrap());
        headers.insert(CORRELATION_ID_HEADER, "corr-1".parse().unwrap());
        assert_eq!(inbound_id(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn correlation_header_is_a_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, "corr-1".parse().unwrap());
        assert_eq!(inbound_id(&headers).as_deref(), Some("corr-1"));
    }

    #[test]
    fn oversized_or_spaced_ids_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "a".repeat(200).parse().unwrap());
        assert_eq!(inbound_id(&headers), None);

        headers.insert(REQUEST_ID_HEADER, "has space".parse().unwrap());
        assert_eq!(inbound_id(&headers), None);
    }
}
