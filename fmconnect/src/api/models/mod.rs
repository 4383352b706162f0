//! Request/response data structures shared by the API handlers.

pub mod users;
