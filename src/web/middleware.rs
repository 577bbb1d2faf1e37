use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::constants::UNKNOWN_CLIENT_KEY;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Who a request counts against for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClientKey(pub(crate) String);

impl ClientKey {
    fn from_headers(headers: &HeaderMap) -> Self {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next());
        let real_ip = headers
            .get(X_REAL_IP)
            .and_then(|value| value.to_str().ok());

        let key = [forwarded, real_ip]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_CLIENT_KEY);

        Self(key.to_string())
    }
}

impl<S> FromRequestParts<S> for ClientKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let key = Self::from_headers(&parts.headers);
        async move { Ok(key) }
    }
}
