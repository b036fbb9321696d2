//! Client identity extraction for rate limiting.

use axum::http::HeaderMap;

/// Identity used when no client address header is present
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Set by the CDN edge; clients cannot spoof it past the edge.
const CONNECTING_IP: &str = "cf-connecting-ip";
/// Set by enterprise edge proxies.
const TRUE_CLIENT_IP: &str = "true-client-ip";
const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Derive the rate-limit identity from request headers.
///
/// Edge-injected headers are trusted before client-controllable ones, so a
/// forged `X-Forwarded-For` can never override the edge's view of the peer.
pub fn client_identity(headers: &HeaderMap) -> String {
    header_value(headers, CONNECTING_IP)
        .or_else(|| header_value(headers, TRUE_CLIENT_IP))
        .or_else(|| {
            header_value(headers, FORWARDED_FOR)
                .and_then(|chain| chain.split(',').next())
                .map(str::trim)
                .filter(|first| !first.is_empty())
        })
        .or_else(|| header_value(headers, REAL_IP))
        .map_or_else(|| UNKNOWN_IDENTITY.to_string(), normalize_ip)
}

/// Strip the IPv4-mapped IPv6 prefix (`::ffff:1.2.3.4` -> `1.2.3.4`).
pub fn normalize_ip(ip: &str) -> String {
    let ip = ip.trim();
    match ip.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("::ffff:") && ip[7..].contains('.') => {
            ip[7..].to_string()
        }
        _ => ip.to_string(),
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use fake::Fake;
    use fake::faker::internet::en::IPv4;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_edge_header_beats_forwarded_for() {
        let h = headers(&[("cf-connecting-ip", "1.2.3.4"), ("x-forwarded-for", "9.9.9.9")]);
        assert_eq!(client_identity(&h), "1.2.3.4");
    }

    #[test]
    fn test_priority_order() {
        let h = headers(&[
            ("true-client-ip", "2.2.2.2"),
            ("x-forwarded-for", "3.3.3.3"),
            ("x-real-ip", "4.4.4.4"),
        ]);
        assert_eq!(client_identity(&h), "2.2.2.2");

        let h = headers(&[("x-forwarded-for", "3.3.3.3, 10.0.0.1"), ("x-real-ip", "4.4.4.4")]);
        assert_eq!(client_identity(&h), "3.3.3.3");

        let h = headers(&[("x-real-ip", "4.4.4.4")]);
        assert_eq!(client_identity(&h), "4.4.4.4");
    }

    #[test]
    fn test_no_headers_is_unknown() {
        assert_eq!(client_identity(&HeaderMap::new()), UNKNOWN_IDENTITY);
    }

    #[test]
    fn test_empty_headers_are_skipped() {
        let h = headers(&[("cf-connecting-ip", " "), ("x-forwarded-for", ", 5.5.5.5"), ("x-real-ip", "6.6.6.6")]);
        assert_eq!(client_identity(&h), "6.6.6.6");
    }

    #[test]
    fn test_mapped_ipv4_is_normalized() {
        assert_eq!(normalize_ip("::ffff:127.0.0.1"), "127.0.0.1");
        assert_eq!(normalize_ip("::FFFF:10.1.2.3"), "10.1.2.3");
        assert_eq!(normalize_ip("::ffff:abcd"), "::ffff:abcd");
        assert_eq!(normalize_ip("2001:db8::1"), "2001:db8::1");

        let h = headers(&[("x-forwarded-for", "::ffff:127.0.0.1")]);
        assert_eq!(client_identity(&h), "127.0.0.1");
    }

    #[test]
    fn test_random_addresses_pass_through() {
        for _ in 0..32 {
            let ip: String = IPv4().fake();
            let chain = format!("{ip}, 198.51.100.1");
            let h = headers(&[("x-forwarded-for", chain.as_str())]);
            assert_eq!(client_identity(&h), ip);
            assert_eq!(normalize_ip(&format!("::ffff:{ip}")), ip);
        }
    }
}
