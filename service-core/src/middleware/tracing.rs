use axum::http::{HeaderMap, HeaderValue};
use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the admin identity asserted by the upstream gateway.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Read the trusted actor identity from request headers, if present and non-blank.
pub fn actor_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    let actor_id = actor_id_from_headers(req.headers()).unwrap_or_else(|| "-".to_string());
    let span = tracing::info_span!("request", request_id = %request_id, actor_id = %actor_id);

    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_actor_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(actor_id_from_headers(&headers), None);

        headers.insert(ACTOR_ID_HEADER, HeaderValue::from_static(" admin-7 "));
        assert_eq!(actor_id_from_headers(&headers).as_deref(), Some("admin-7"));
    }
}
