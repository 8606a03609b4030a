use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use service_core::middleware::actor_id_from_headers;

/// Admin identity asserted by the gateway in the `X-Actor-ID` header.
///
/// The service does not authenticate; it records this id on every audit
/// entry and payment it writes.
#[derive(Debug, Clone)]
pub struct ActorId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor_id = actor_id_from_headers(&parts.headers).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing X-Actor-ID header"))
        })?;

        tracing::Span::current().record("actor_id", actor_id.as_str());

        Ok(ActorId(actor_id))
    }
}
