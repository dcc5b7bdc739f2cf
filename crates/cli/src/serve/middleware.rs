//! Actor extraction from trusted proxy headers.
//!
//! The engine never authenticates; the fronting proxy does and forwards
//! the result in `x-docket-*` headers. Requests without an identity are
//! rejected before routing. `/health` stays open for probes.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use docket_core::labels;
use docket_core::Actor;

use super::json_error;

pub(crate) async fn resolve_actor(mut request: Request<Body>, next: Next) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }
    let Some(actor) = actor_from_headers(request.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "identity headers missing");
    };
    request.extensions_mut().insert(actor);
    next.run(request).await
}

fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let username = header_str(headers, "x-docket-user")?.to_string();
    let role = header_str(headers, "x-docket-role")
        .unwrap_or(labels::ROLE_DEFAULT)
        .to_string();
    let service_id = header_str(headers, "x-docket-service").map(str::to_string);
    // Raw Authorization value; the legacy ACL lookup forwards it verbatim.
    let token = header_str(headers, "authorization").map(str::to_string);
    // Work item addressing is by service id; the caller's service is its
    // group.
    let groups = service_id.iter().cloned().collect();
    Some(Actor {
        username,
        role,
        service_id,
        groups,
        token,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
