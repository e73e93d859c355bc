//! Core functionality module
//!
//! # Submodules
//!
//! - `config` - Configuration loading, saving, and management
//! - `error` - Error types and result aliases
//! - `observer` - Progress reporting and cooperative cancellation

pub mod config;
pub mod error;
pub mod observer;
