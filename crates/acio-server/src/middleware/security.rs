//! Security response headers

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'; \
     script-src 'self'; object-src 'none'; upgrade-insecure-requests";

/// Baseline hardening headers
const BASELINE_HEADERS: [(&str, &str); 9] = [
    ("content-security-policy", CONTENT_SECURITY_POLICY),
    ("strict-transport-security", "max-age=31536000; includeSubDomains; preload"),
    ("referrer-policy", "no-referrer"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-permitted-cross-domain-policies", "none"),
];

/// Path fragments whose responses must never be cached
const NO_CACHE_PATH_FRAGMENTS: [&str; 2] = ["/api/auth", "/api/user"];

/// Whether `path` is auth- or user-scoped. A plain substring test.
pub fn is_cache_sensitive(path: &str) -> bool {
    NO_CACHE_PATH_FRAGMENTS
        .iter()
        .any(|fragment| path.contains(fragment))
}

/// Set the security headers on every response
///
/// Always sets `X-Frame-Options: DENY`, `X-Content-Type-Options: nosniff` and
/// `X-XSS-Protection: 1; mode=block` on top of the baseline set. Auth- and
/// user-scoped paths additionally get cache-prevention headers.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let sensitive = is_cache_sensitive(request.uri().path());
    let mut response = next.run(request).await;
    apply(response.headers_mut(), sensitive);
    response
}

fn apply(headers: &mut HeaderMap, sensitive: bool) {
    for (name, value) in BASELINE_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );

    if sensitive {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_sensitive_paths() {
        assert!(is_cache_sensitive("/api/auth/login"));
        assert!(is_cache_sensitive("/api/users"));
        assert!(is_cache_sensitive("/v2/api/user/profile"));
        assert!(!is_cache_sensitive("/api/v1/auth"));
        assert!(!is_cache_sensitive("/health"));
    }

    #[test]
    fn test_every_response_gets_fixed_headers() {
        let mut headers = HeaderMap::new();
        apply(&mut headers, false);

        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_XSS_PROTECTION], "1; mode=block");
        assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
        assert!(!headers.contains_key(header::CACHE_CONTROL));
        assert!(!headers.contains_key(header::PRAGMA));
    }

    #[test]
    fn test_sensitive_paths_get_cache_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        apply(&mut headers, true);

        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate, private"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
    }
}
