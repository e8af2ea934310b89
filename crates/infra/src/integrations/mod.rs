//! External service integrations

pub mod x;
