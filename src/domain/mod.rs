//! Domain layer for the citriage classification pipeline.
//!
//! This module contains the core models, the pure pipeline state machine,
//! and the port traits that adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
