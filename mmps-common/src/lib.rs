//! # MMPS Common Library
//!
//! Shared code for the MMPS workspace:
//! - Common error type
//! - TOML configuration model and file resolution
//! - Session audit-log naming

pub mod audit;
pub mod config;
pub mod error;

pub use error::{Error, Result};
