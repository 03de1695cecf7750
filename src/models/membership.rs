//! Group membership sets

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A group reference as returned by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl GroupRef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: Some(display_name.into()),
        }
    }
}

/// Transitive group memberships of a user or device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSet {
    pub group_ids: HashSet<String>,
    /// Group id to display name, for groups whose name is known
    pub names: HashMap<String, String>,
}

impl MembershipSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.group_ids.contains(group_id)
    }

    pub fn name_of(&self, group_id: &str) -> Option<&str> {
        self.names.get(group_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.group_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group_ids.is_empty()
    }
}

impl FromIterator<GroupRef> for MembershipSet {
    fn from_iter<I: IntoIterator<Item = GroupRef>>(iter: I) -> Self {
        let mut set = MembershipSet::default();
        for group in iter {
            if let Some(name) = group.display_name.filter(|n| !n.trim().is_empty()) {
                set.names.insert(group.id.clone(), name);
            }
            set.group_ids.insert(group.id);
        }
        set
    }
}
