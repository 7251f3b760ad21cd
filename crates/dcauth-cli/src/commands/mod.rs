//! CLI command implementations

pub mod check;
pub mod serve;
pub mod verify_token;
