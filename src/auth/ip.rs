//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::request::Parts};

/// Header set by a fronting proxy with the original client address.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Key used when no client address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// With `trust_real_ip` the `X-Real-IP` header wins when present and non-empty.
/// Otherwise the socket address from `ConnectInfo` is used, and `"unknown"`
/// when the server was not started with connect info.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(source: &T, trust_real_ip: bool) -> String {
    if trust_real_ip {
        let header = source
            .headers()
            .get(REAL_IP_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(ip) = header {
            return ip.to_string();
        }
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
