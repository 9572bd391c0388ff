//! Request gating by origin country.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use tracing::debug;

/// Header set by the edge network with the caller's ISO country code.
pub const COUNTRY_HEADER: &str = "x-vercel-ip-country";

pub fn request_country(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(COUNTRY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|c| !c.is_empty())
}

/// Lets every request through, recording its origin country.
pub async fn geo_gate(req: Request, next: Next) -> Response {
    let country = request_country(req.headers()).unwrap_or("unknown");
    debug!(%country, path = %req.uri().path(), "Inbound request");
    next.run(req).await
}
