//! Bearer/Basic authentication middleware. On failure, responds 401 with a
//! `WWW-Authenticate` header naming both accepted schemes, matching §7.

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use batchelor_shared::auth::{parse_authorization_header, AuthError, Credential, Role, SecurityContext};

use crate::http::routes::AppState;

fn role_from_str(s: &str) -> Option<Role> {
    match s {
        "read-only" => Some(Role::ReadOnly),
        "execute" => Some(Role::Execute),
        "worker" => Some(Role::Worker),
        _ => None,
    }
}

fn unauthorized(realm: &str) -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    let header_value = format!("Basic realm=\"{realm}\", Bearer realm=\"{realm}\"");
    if let Ok(value) = HeaderValue::from_str(&header_value) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

pub async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: axum::extract::Request,
    next: Next,
) -> Response {
    let realm = state.config.auth.realm.clone();

    let Some(raw) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return unauthorized(&realm);
    };

    let credential = match parse_authorization_header(raw) {
        Ok(credential) => credential,
        Err(AuthError::Malformed) => return StatusCode::BAD_REQUEST.into_response(),
        Err(_) => return unauthorized(&realm),
    };

    let security_context = match credential {
        Credential::Bearer(token) => state.config.auth.api_keys.get(&token).and_then(|role| role_from_str(role)).map(|role| SecurityContext {
            role,
            principal: "api-key".to_string(),
        }),
        Credential::Basic { user, password } => state
            .config
            .auth
            .basic_users
            .iter()
            .find(|u| u.user == user && u.password == password)
            .and_then(|u| role_from_str(&u.role))
            .map(|role| SecurityContext { role, principal: user }),
    };

    match security_context {
        Some(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        None => unauthorized(&realm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_from_str_known_values() {
        assert_eq!(role_from_str("read-only"), Some(Role::ReadOnly));
        assert_eq!(role_from_str("execute"), Some(Role::Execute));
        assert_eq!(role_from_str("worker"), Some(Role::Worker));
        assert_eq!(role_from_str("admin"), None);
    }
}
