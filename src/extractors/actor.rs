//! Extract the acting principal from headers set by the auth gateway.

use crate::actor::Actor;
use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";
pub const ACTOR_NAME_HEADER: &str = "X-Actor-Name";
/// Comma-separated role names.
pub const ACTOR_ROLES_HEADER: &str = "X-Actor-Roles";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)
            .ok_or_else(|| AppError::Unauthenticated("no actor on request".into()))?
            .parse::<i64>()
            .map_err(|_| AppError::Unauthenticated("malformed actor id".into()))?;
        let name = header(parts, ACTOR_NAME_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| format!("actor {}", id));
        let roles = header(parts, ACTOR_ROLES_HEADER)
            .map(|s| {
                s.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Actor::new(id, name, roles))
    }
}
