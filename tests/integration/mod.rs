//! Integration tests for the Intune Assignment Checker
//!
//! API tests drive the real router over an in-memory tenant; Graph client
//! tests run against a mock HTTP server.

mod api_tests;
mod compare_tests;
