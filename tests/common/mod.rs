//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Graph-shaped fixtures and a reference tenant
//! - An in-memory tenant implementing the data sources
//! - API test client

#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;
pub mod test_app;

pub use fixtures::*;
pub use mocks::*;
pub use test_app::*;
