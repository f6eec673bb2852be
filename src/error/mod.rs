//! Error handling
//!
//! Defines error types for every layer of the broker and the mappings
//! from filesystem errors onto protocol reply codes.

pub mod handlers;
pub mod types;

pub use types::*;
