//! Step definitions for Cucumber scenarios

pub mod common_steps;
pub mod compare_steps;
pub mod policy_steps;
pub mod subject_steps;
