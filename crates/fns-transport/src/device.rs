//! Device identity/IP extraction for the application middleware (spec
//! §4.11): `X-Fns-Device-Id` from header or `deviceId` query param;
//! `X-Fns-Device-Ip` from header, common proxy headers, or the socket
//! address, with IPv6 canonicalized to its `/64`.

use std::net::IpAddr;

use axum::http::HeaderMap;

const PROXY_IP_HEADERS: &[&str] = &["x-forwarded-for", "x-real-ip"];

pub fn extract_device_id(headers: &HeaderMap, query: &str) -> Option<String> {
    if let Some(value) = headers
        .get("x-fns-device-id")
        .and_then(|v| v.to_str().ok())
    {
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    query_param(query, "deviceId")
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

/// Resolves the caller's IP: explicit header, then common proxy headers,
/// then the socket's remote address, canonicalizing any IPv6 address down
/// to its `/64` prefix so per-subscriber rate limiting isn't defeated by
/// privacy-extension address rotation within the same `/64`.
pub fn extract_device_ip(headers: &HeaderMap, remote_addr: Option<IpAddr>) -> Option<String> {
    if let Some(value) = headers
        .get("x-fns-device-ip")
        .and_then(|v| v.to_str().ok())
    {
        if !value.is_empty() {
            return Some(canonicalize(value));
        }
    }

    for name in PROXY_IP_HEADERS {
        if let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) {
            if let Some(first) = value.split(',').next().map(str::trim) {
                if !first.is_empty() {
                    return Some(canonicalize(first));
                }
            }
        }
    }

    remote_addr.map(|addr| canonicalize(&addr.to_string()))
}

fn canonicalize(raw: &str) -> String {
    match raw.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => {
            let segments = v6.segments();
            format!(
                "{:x}:{:x}:{:x}:{:x}::/64",
                segments[0], segments[1], segments[2], segments[3]
            )
        }
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv6_address_is_canonicalized_to_its_slash_64() {
        assert_eq!(
            canonicalize("2001:db8:85a3:0:0:8a2e:370:7334"),
            "2001:db8:85a3:0::/64"
        );
    }

    #[test]
    fn ipv4_address_passes_through_unchanged() {
        assert_eq!(canonicalize("203.0.113.7"), "203.0.113.7");
    }

    #[test]
    fn device_id_falls_back_to_query_param() {
        let headers = HeaderMap::new();
        assert_eq!(
            extract_device_id(&headers, "deviceId=dev-1&other=x"),
            Some("dev-1".to_string())
        );
    }
}
