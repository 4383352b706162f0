//! API models for the authenticated user.

use serde::{Deserialize, Serialize};

/// The user behind an authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUser {
    pub username: String,
    pub email: String,
    pub is_superuser: bool,
}
