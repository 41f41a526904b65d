//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the sync engine and its hosts:
//! - Logging and tracing infrastructure
//! - Configuration loaded from a builder or the environment
//! - Event bus for run and transfer progress

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
