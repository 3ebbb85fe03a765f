//! Digest guard middleware.
//!
//! Every request behind the guard is checked by the [`DigestAuthenticator`].
//! Authenticated requests continue with an [`AuthenticatedUser`] extension;
//! everything else gets a `401` carrying a fresh challenge.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::audit::{authorization_params, AuditEntry, AuditResult};
use crate::auth::{ResponseVerifier, Verdict};
use crate::protocol::{AuthRequest, Challenge};

use super::state::AppState;

/// Identity attached to requests that passed the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
}

/// Run the digest engine in front of the wrapped routes.
pub async fn digest_guard(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4();
    let _active = state.metrics.begin();

    let remote = remote_addr(&req);
    let auth_request = auth_request(&req);

    if !state.rate_limiter.check_and_record(remote.ip()) {
        warn!(
            request_id = %request_id,
            remote = %remote,
            "Rate limit exceeded"
        );
        state.metrics.record(false);
        audit(&state, &auth_request, remote, request_id, None, AuditResult::RateLimited, started);
        return (StatusCode::TOO_MANY_REQUESTS, "429 Too Many Requests\n").into_response();
    }

    let verdict = match state.authenticator.authenticate(&auth_request) {
        Ok(verdict) => verdict,
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Failed to issue challenge");
            state.metrics.record(false);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    debug!(
        request_id = %request_id,
        remote = %remote,
        state = ?verdict.state(),
        reason = verdict.reason().map(|r| r.code()).unwrap_or("-"),
        "Authentication decided"
    );

    state.metrics.record_verdict(&verdict);
    let claimed = auth_request
        .authorization
        .as_deref()
        .and_then(|h| ResponseVerifier::parse(h).ok())
        .map(|r| r.username);
    audit(
        &state,
        &auth_request,
        remote,
        request_id,
        verdict.username().map(str::to_string).or(claimed),
        AuditResult::from(&verdict),
        started,
    );

    match verdict {
        Verdict::Authenticated {
            username,
            authentication_info,
        } => {
            req.extensions_mut().insert(AuthenticatedUser { username });
            let mut response = next.run(req).await;
            if let Some(info) = authentication_info {
                match HeaderValue::from_str(&info.header_value()) {
                    Ok(value) => {
                        response.headers_mut().insert("authentication-info", value);
                    }
                    Err(e) => warn!(error = %e, "Invalid Authentication-Info value"),
                }
            }
            response
        }
        Verdict::Challenged { challenge } | Verdict::Rejected { challenge, .. } => {
            unauthorized(&challenge, auth_request.authorization.as_deref(), state.diagnostic_echo)
        }
    }
}

/// Build the `401` answer for `challenge`.
pub fn unauthorized(challenge: &Challenge, authorization: Option<&str>, echo: bool) -> Response {
    let www_authenticate = challenge.header_value();
    let value = match HeaderValue::from_str(&www_authenticate) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "Challenge is not a valid header value");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut body = String::from("401 Unauthorized\n");
    if echo {
        body.push_str("\nrequest auth header: ");
        body.push_str(authorization.unwrap_or(""));
        body.push_str("\nresponse auth header: ");
        body.push_str(&www_authenticate);
    }

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Enforce the per-request timeout on everything below this layer.
pub async fn request_timeout(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match tokio::time::timeout(state.request_timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(
                timeout_secs = state.request_timeout.as_secs(),
                "Request timed out"
            );
            StatusCode::REQUEST_TIMEOUT.into_response()
        }
    }
}

fn auth_request(req: &Request) -> AuthRequest {
    let uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut auth_request = AuthRequest::new(req.method().as_str(), uri);
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        auth_request = auth_request.with_authorization(String::from_utf8_lossy(value.as_bytes()));
    }
    auth_request
}

fn remote_addr(req: &Request) -> SocketAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 0))
}

fn audit(
    state: &AppState,
    request: &AuthRequest,
    remote: SocketAddr,
    request_id: Uuid,
    username: Option<String>,
    result: AuditResult,
    started: Instant,
) {
    let entry = AuditEntry {
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        request_id,
        method: request.method.clone(),
        uri: request.uri.clone(),
        remote_addr: remote.to_string(),
        username,
        params: authorization_params(request.authorization.as_deref()),
        result,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    if let Err(e) = state.audit.log(&entry) {
        warn!(request_id = %request_id, error = %e, "Failed to write audit entry");
    }
}
