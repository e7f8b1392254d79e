use std::sync::Arc;

use axum::{middleware::Next, response::Response};
use tracing::debug;

use crate::common::Actor;
use crate::server::auth::JwtService;

/// JWT authentication middleware
///
/// Verifies the bearer token and adds the [`Actor`] to request extensions.
/// Requests without a valid token continue anonymously; handlers decide
/// whether that is acceptable.
pub async fn jwt_auth_middleware(
    jwt_service: Arc<JwtService>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match extract_actor(&request, &jwt_service) {
        Some(actor) => {
            debug!(user_id = %actor.user_id, is_admin = actor.is_admin, "authenticated request");
            request.extensions_mut().insert(actor);
        }
        None => debug!("no valid authentication token"),
    }

    next.run(request).await
}

fn extract_actor(
    request: &axum::http::Request<axum::body::Body>,
    jwt_service: &JwtService,
) -> Option<Actor> {
    let header = request.headers().get(axum::http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value);

    jwt_service.verify_token(token).ok().map(|claims| claims.actor())
}
