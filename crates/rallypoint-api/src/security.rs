use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::auth::CSRF_COOKIE_NAME;
use crate::rpc::AuthUser;
use crate::state::AppState;

const CSRF_HEADER_NAME: &str = "x-csrf-token";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn json_error(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        axum::Json(ErrorBody {
            message: message.into(),
        }),
    )
        .into_response()
}

/// Per-request correlation id, generated at the edge and echoed in responses,
/// audit events, and API error payloads.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub request_id: String,
}

pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestMeta {
        request_id: id.clone(),
    });

    let mut resp = next.run(req).await;
    if let Ok(value) = axum::http::HeaderValue::from_str(&id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    resp
}

fn is_unsafe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn parse_allowed_origins() -> Vec<String> {
    // Dev-friendly defaults. Production should set `RP_ALLOWED_ORIGINS` explicitly.
    //
    // Examples:
    // - RP_ALLOWED_ORIGINS=http://localhost:5173
    // - RP_ALLOWED_ORIGINS=https://map.example.com,https://admin.example.com
    let raw = std::env::var("RP_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:5173,http://127.0.0.1:5173".to_string());
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn origin_is_allowed(headers: &HeaderMap) -> bool {
    // Treat missing Origin as a non-browser client (curl, service-to-service).
    // For browsers, Origin should be present for unsafe methods.
    let origin = match headers.get(axum::http::header::ORIGIN) {
        Some(v) => match v.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        },
        None => return true,
    };

    let allowed = parse_allowed_origins();
    allowed.iter().any(|a| a == origin)
}

fn request_has_cookie_header(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

fn csrf_is_valid(headers: &HeaderMap) -> bool {
    let jar = CookieJar::from_headers(headers);
    let cookie = match jar.get(CSRF_COOKIE_NAME) {
        Some(c) => c,
        None => return false,
    };

    let header = match headers.get(CSRF_HEADER_NAME).and_then(|v| v.to_str().ok()) {
        Some(v) => v,
        None => return false,
    };

    cookie.value() == header
}

// Middleware: double-submit CSRF + Origin allowlist.
//
// Apply this to state-changing routes (e.g. /auth/* POSTs). It intentionally does
// not try to distinguish which handlers are "mutations".
pub async fn csrf_and_origin(req: Request<Body>, next: Next) -> Response {
    if !is_unsafe_method(req.method()) {
        return next.run(req).await;
    }

    let headers = req.headers();
    if !origin_is_allowed(headers) {
        return json_error(StatusCode::FORBIDDEN, "origin not allowed");
    }

    // Only enforce CSRF when cookies are present; this keeps non-browser and
    // service-to-service clients workable without forcing CSRF headers.
    if request_has_cookie_header(headers) && !csrf_is_valid(headers) {
        return json_error(StatusCode::FORBIDDEN, "csrf invalid");
    }

    next.run(req).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Procedures reachable without a session: the public map feed, read-only
/// directory queries, ping, and update-request submission.
fn is_public_procedure(path: &str) -> bool {
    let key = path.rsplit('/').next().unwrap_or(path);
    key == "request.submit"
        || ["control.", "map.", "org.", "location.", "event."]
            .iter()
            .any(|p| key.starts_with(p))
}

// Guard for /rspc: a valid access-JWT cookie or a live API key gets its
// identity attached as a request extension; everything else may only reach
// the public procedures.
pub async fn rspc_auth_guard(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let headers = req.headers();

    let user = CookieJar::from_headers(headers)
        .get(crate::auth::ACCESS_COOKIE_NAME)
        .and_then(|c| crate::auth::validate_access_jwt(c.value()).ok())
        .map(|me| AuthUser {
            user_id: me.user_id,
            f3_name: me.f3_name,
            is_admin: me.is_admin,
        });

    let api_key = if user.is_none() {
        match bearer_token(headers) {
            Some(raw) => match crate::apikeys::authenticate(&state.db, raw).await {
                Ok(identity) => identity,
                Err(err) => {
                    tracing::warn!(%err, "api key lookup failed");
                    return json_error(StatusCode::INTERNAL_SERVER_ERROR, "api key lookup failed");
                }
            },
            None => None,
        }
    } else {
        None
    };

    if user.is_none() && api_key.is_none() && !is_public_procedure(req.uri().path()) {
        return json_error(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    if let Some(u) = user {
        req.extensions_mut().insert(u);
    }
    if let Some(k) = api_key {
        req.extensions_mut().insert(k);
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_procedure_allowlist() {
        assert!(is_public_procedure("/rspc/control.ping"));
        assert!(is_public_procedure("/rspc/map.data"));
        assert!(is_public_procedure("/rspc/org.list"));
        assert!(is_public_procedure("/rspc/location.list"));
        assert!(is_public_procedure("/rspc/event.list"));
        assert!(is_public_procedure("/rspc/request.submit"));

        assert!(!is_public_procedure("/rspc/request.approve"));
        assert!(!is_public_procedure("/rspc/request.list"));
        assert!(!is_public_procedure("/rspc/apiKey.create"));
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer rpk_abc".parse().unwrap(),
        );
        assert_eq!(bearer_token(&headers), Some("rpk_abc"));

        headers.insert(axum::http::header::AUTHORIZATION, "Basic xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn csrf_double_submit() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            format!("{CSRF_COOKIE_NAME}=tok123").parse().unwrap(),
        );
        assert!(!csrf_is_valid(&headers));

        headers.insert(CSRF_HEADER_NAME, "tok123".parse().unwrap());
        assert!(csrf_is_valid(&headers));

        headers.insert(CSRF_HEADER_NAME, "other".parse().unwrap());
        assert!(!csrf_is_valid(&headers));
    }
}
