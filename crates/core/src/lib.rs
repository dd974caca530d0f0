//! `motodesk-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the dealership
//! modules (no IO, no HTTP, no storage).

pub mod error;
pub mod id;
pub mod value_object;

pub use error::{DomainError, DomainResult};
pub use id::{OutboxId, OutboxIdGenerator, file_safe};
pub use value_object::{MobileNumber, ValueObject};
