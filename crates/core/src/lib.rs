//! `journal-core`: shared building blocks for the journal access layer.
//!
//! Identifiers, the domain error model and the aggregate/event contracts.
//! Nothing in here performs IO.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, DomainEvent, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{RoleId, UserId};
