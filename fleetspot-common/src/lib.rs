//! # Fleetspot Common Library
//!
//! Shared code for the fleetspot services including:
//! - Database schema initialization and row models
//! - Configuration loading and root folder resolution
//! - Error types
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
