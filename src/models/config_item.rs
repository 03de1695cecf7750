//! Flattened policy configuration entries

use serde::{Deserialize, Serialize};

/// One human-readable `name = value` pair from a policy's configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    pub value: String,
}

impl ConfigItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Literal used wherever a setting has no value
pub const NOT_CONFIGURED: &str = "Not configured";
