//! `userstream-core`: foundation building blocks.
//!
//! Strongly-typed identifiers and the domain error model.
//! This crate has no infrastructure concerns.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{EventId, UserId};
