//! API handlers module

pub mod health;
pub mod narrative;
pub mod sessions;
