//! Domain layer
//!
//! Contains the core business logic and domain models.

pub mod caller;
pub mod course;
pub mod knowledge;
