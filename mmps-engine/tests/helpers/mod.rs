//! Test Helper Utilities
//!
//! Shared utilities for testing mmps-engine

#![allow(dead_code)]

pub mod log_capture;
pub mod stub_client;

pub use log_capture::{capture_logs, LogCapture};
pub use stub_client::{default_settings, instance_for_temperature, is_scoring_request, StubClient};
