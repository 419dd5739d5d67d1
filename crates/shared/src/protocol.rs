use serde::{Deserialize, Serialize};

use crate::domain::{EntityId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub display_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub uid: UserId,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntityResponse {
    pub id: EntityId,
}

/// Route segments, appended to the backend's base path one by one.
pub const LOGIN_ROUTE: [&str; 2] = ["auth", "login"];
pub const REGISTER_ROUTE: [&str; 2] = ["auth", "register"];

pub fn collection_route(collection: &str) -> [&str; 2] {
    ["collections", collection]
}

pub fn entity_route<'a>(collection: &'a str, id: &'a EntityId) -> [&'a str; 3] {
    ["collections", collection, id.as_str()]
}
