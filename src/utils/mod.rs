//! The `utils` module provides the error type and logging setup shared by the
//! rest of the crate.

pub mod error;
pub mod logging;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;
