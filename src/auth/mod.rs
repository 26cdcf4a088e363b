//! Caller identity.
//!
//! Token issuance lives outside this service; an upstream gateway
//! authenticates the caller and forwards the identity in `x-actor-*`
//! headers, which the [`Actor`] extractor reads.

use crate::errors::ServiceError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            other => Err(ServiceError::Unauthorized(format!("Unknown role '{}'", other))),
        }
    }
}

/// The authenticated caller of a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
    pub name: String,
}

impl Actor {
    pub fn customer(id: Uuid, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Customer,
            email: email.into(),
            name: name.into(),
        }
    }

    pub fn admin(id: Uuid, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Admin,
            email: email.into(),
            name: name.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with `Forbidden` unless the actor is an admin.
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "This operation requires the admin role".to_string(),
            ))
        }
    }

    /// Owners and admins may read a record.
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.is_admin() || self.id == owner_id
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized("Missing actor identity".to_string()))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| ServiceError::Unauthorized("Malformed actor identity".to_string()))?;

        let role = header(parts, ACTOR_ROLE_HEADER)
            .map(Role::from_str)
            .transpose()?
            .unwrap_or(Role::Customer);

        let email = header(parts, ACTOR_EMAIL_HEADER).unwrap_or_default().to_string();
        let name = header(parts, ACTOR_NAME_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| email.clone());

        Ok(Actor {
            id,
            role,
            email,
            name,
        })
    }
}
