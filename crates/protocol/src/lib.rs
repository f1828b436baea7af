//! Wire types for the tether session service.
//!
//! This crate contains the serde-serializable types exchanged with the
//! service's auth endpoints: credentials, token kinds, and the error
//! payload with its failure classification. These types represent the
//! "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond (de)serialization, validation, and
//!   failure classification
//! * Stable: Changes only when the wire protocol changes
//!
//! The session layer itself (credential lifecycle, connection recovery,
//! login retry) is built on top of these types in `tether-core`.

pub mod credential;
pub mod error;

pub use credential::*;
pub use error::*;
