//! Response-building helpers shared by the middleware chain and the
//! handlers (spec §6: "every non-2xx response carries a JSON body decodable
//! into CodeError").

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use fns_core::{CodeError, CodeErrorBody};

pub fn error_response(err: &CodeError) -> Response {
    let status =
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = CodeErrorBody::from(err);
    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(err.id()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-fns-request-id"), value);
    }
    response
}

/// One segment of a `/{service}/{fn}` path.
pub fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

/// Whether `path` addresses a `/{service}/{fn}` dispatch target rather than
/// one of the reserved `application`/`services`/`signatures`/`cluster`
/// namespaces (spec §6: "bit-exact" reserved paths).
pub fn is_service_fn_path(path: &str) -> bool {
    let trimmed = path.trim_start_matches('/');
    let mut segments = trimmed.split('/');
    let (Some(service), Some(fn_name), None) =
        (segments.next(), segments.next(), segments.next())
    else {
        return false;
    };
    if service.is_empty() || fn_name.is_empty() {
        return false;
    }
    !matches!(service, "application" | "services" | "signatures" | "cluster")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_namespaces_are_not_service_fn_paths() {
        assert!(!is_service_fn_path("/application/health"));
        assert!(!is_service_fn_path("/services/documents"));
        assert!(!is_service_fn_path("/signatures/exchange_key"));
        assert!(!is_service_fn_path("/cluster/nodes"));
    }

    #[test]
    fn two_segment_paths_are_service_fn_paths() {
        assert!(is_service_fn_path("/billing/charge"));
        assert!(!is_service_fn_path("/billing"));
        assert!(!is_service_fn_path("/billing/charge/extra"));
    }
}
