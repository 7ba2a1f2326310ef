//! Domain types and invariants for signature submissions.

pub mod error;
pub mod layout;
pub mod signature;
