//! HTTP route handlers

pub mod events;
pub mod status;
pub mod tuning;
