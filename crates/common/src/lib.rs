//! Shared types, error definitions, and update accessors used across all switchboard crates.

pub mod error;
pub mod keys;
pub mod update;

#[cfg(any(test, feature = "testing"))]
pub mod fixtures;

pub use {
    error::{Error, Result},
    keys::{RecipientKey, SessionKey},
};
