use anyhow::anyhow;
use axum::{
    body::{Body, to_bytes},
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header, request::Parts},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use keystone_core::AppError;
use tracing::{debug, warn};

use crate::middleware::auth::bearer_token;
use crate::security::csrf::{CsrfSession, FORM_FIELD, HEADER_NAME, SESSION_COOKIE};
use crate::state::AppState;

/// Largest form body buffered to look for the `csrf_token` field.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// The anti-forgery token of the current request's session, for embedding
/// in rendered forms. Extracting it is what stores a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl FromRequestParts<AppState> for CsrfToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<CsrfSession>()
            .ok_or_else(|| AppError::internal(anyhow!("CSRF token requested outside csrf_middleware")))?;

        let token = state.csrf.persist(session).await?;
        Ok(CsrfToken(token))
    }
}

fn is_unsafe(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// Pulls the submitted token from the header, or else from a form body.
/// A buffered body is put back so the handler still sees it.
async fn submitted_token(req: Request) -> Result<(Option<String>, Request), Response> {
    if let Some(token) = req.headers().get(HEADER_NAME).and_then(|v| v.to_str().ok()) {
        let token = token.to_string();
        return Ok((Some(token), req));
    }

    if !is_form(req.headers()) {
        return Ok((None, req));
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES).await.map_err(|_| {
        AppError::new(StatusCode::PAYLOAD_TOO_LARGE, anyhow!("Request body too large")).into_response()
    })?;

    let token = url::form_urlencoded::parse(&bytes)
        .find(|(key, _)| key == FORM_FIELD)
        .map(|(_, value)| value.into_owned());

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

fn rejection(path: &str) -> Response {
    if path.starts_with("/v1/") {
        return AppError::forbidden(anyhow!("Invalid CSRF token")).into_response();
    }

    (
        StatusCode::FORBIDDEN,
        Html(
            "<!DOCTYPE html>\n<html><head><title>Forbidden</title></head>\
             <body><h1>403 Forbidden</h1>\
             <p>The form you submitted has expired or was not sent from this site. \
             Go back, reload the page and try again.</p></body></html>",
        ),
    )
        .into_response()
}

fn set_session_cookie(state: &AppState, session: &CsrfSession, response: &mut Response) {
    if !session.is_new {
        return;
    }

    let cookie = state.csrf.session_cookie(&session.session_id);
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "Could not encode CSRF session cookie"),
    }
}

/// Double-submit check for browser sessions.
///
/// Every request is bound to a `csrf_session` cookie, which is issued on
/// first contact; the session itself is stored only once a handler extracts
/// [`CsrfToken`]. POST, PUT, PATCH and DELETE must echo the session's token
/// back, otherwise the request is refused with 403 before any handler
/// runs. Bearer-authenticated requests without a session cookie are
/// exempt when configured.
pub async fn csrf_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let cookie = CookieJar::from_headers(req.headers())
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string());
    let unsafe_method = is_unsafe(req.method());

    if unsafe_method
        && cookie.is_none()
        && state.csrf.config().exempt_bearer
        && bearer_token(req.headers()).is_some()
    {
        debug!("Skipping CSRF check for bearer request");
        return next.run(req).await;
    }

    let session = match state.csrf.resolve(cookie.as_deref()).await {
        Ok(session) => session,
        Err(e) => return AppError::internal(e).into_response(),
    };

    let mut req = req;
    if unsafe_method {
        let (submitted, restored) = match submitted_token(req).await {
            Ok(found) => found,
            Err(response) => return response,
        };
        req = restored;

        if !state.csrf.verify(&session, submitted.as_deref()) {
            warn!(
                method = %req.method(),
                path = %req.uri().path(),
                submitted = submitted.is_some(),
                "CSRF check failed"
            );
            let mut response = rejection(req.uri().path());
            set_session_cookie(&state, &session, &mut response);
            return response;
        }
    }

    req.extensions_mut().insert(session.clone());

    let mut response = next.run(req).await;
    set_session_cookie(&state, &session, &mut response);
    response
}
