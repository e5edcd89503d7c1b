//! Caller identity from request headers.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{Role, UserId};
use domain::Actor;

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The authenticated caller of a request.
///
/// Only `user` and `admin` can be claimed; the system role exists only
/// inside the payment hook.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl CurrentActor {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let id: UserId = header(headers, ACTOR_ID_HEADER)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing or invalid x-actor-id header.".to_string()))?;

        let role = match header(headers, ACTOR_ROLE_HEADER) {
            None => Role::User,
            Some(raw) => match raw.parse::<Role>() {
                Ok(role @ (Role::User | Role::Admin)) => role,
                _ => {
                    return Err(ApiError::Unauthorized(
                        "Invalid x-actor-role header.".to_string(),
                    ));
                }
            },
        };

        let name = header(headers, ACTOR_NAME_HEADER).unwrap_or("Anonymous");

        Ok(CurrentActor(Actor::new(id, name, role)))
    }
}

impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        CurrentActor::from_headers(&parts.headers)
    }
}
