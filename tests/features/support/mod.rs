//! Shared scenario state

mod world;

pub use world::*;
