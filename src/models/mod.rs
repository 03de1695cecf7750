//! Data models

mod comparison;
mod config_item;
mod insights;
mod membership;
mod policy;
mod presence;
mod raw;
mod subject;

pub use comparison::*;
pub use config_item::*;
pub use insights::*;
pub use membership::*;
pub use policy::*;
pub use presence::*;
pub use raw::*;
pub use subject::*;
