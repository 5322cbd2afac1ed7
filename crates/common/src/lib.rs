//! Common types, protocol definitions, and errors shared across `campus-entry` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
pub use protocol::Role;
