//! Shared utilities.
//!
//! Hashing, atomic directory replacement and test helpers.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
