//! Core types and utilities for slowfall.
//!
//! This crate provides the foundational types shared by the authentication
//! and gateway crates:
//!
//! - **Identifiers**: Strongly-typed subjects, group identifiers and key IDs
//! - **Authorities**: The normalized strings authorization decisions are made on
//! - **Redaction**: Helpers for logging secrets without leaking them
//!
//! # Example
//!
//! ```
//! use slowfall_core::{Authority, GroupId, Subject};
//!
//! let subject = Subject::new("alice").unwrap();
//! let group = GroupId::new("1dea5e51-d15e-4081-9722-46da3bfdee79").unwrap();
//!
//! let authority = Authority::from_group(&group);
//! assert_eq!(authority.as_str(), "GROUP_1dea5e51-d15e-4081-9722-46da3bfdee79");
//! assert_eq!(subject.masked(), "al***");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod authority;
pub mod error;
pub mod ids;
pub mod redact;

pub use authority::Authority;
pub use error::{IdError, Result};
pub use ids::{GroupId, KeyId, Subject};
