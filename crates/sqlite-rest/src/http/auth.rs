use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::AppError;
use crate::http::AppState;

/// HTTP Basic Auth gate in front of both route tables. A missing credential
/// pair in the configuration disables the check entirely.
pub async fn basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(creds) = state.config.auth.as_ref() else {
        return next.run(request).await;
    };

    let supplied = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_header);

    match supplied {
        Some((user, pass)) if creds.matches(&user, &pass) => next.run(request).await,
        _ => AppError::Unauthorized.into_response(),
    }
}

fn parse_basic_header(value: &str) -> Option<(String, String)> {
    let (scheme, payload) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
