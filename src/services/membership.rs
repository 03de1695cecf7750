//! Group membership resolver

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::models::{GroupRef, MembershipSet, Subject, SubjectType};
use crate::services::sources::DirectorySource;
use crate::utils::AppResult;

/// Resolves the transitive group memberships of a subject.
///
/// Nested groups are expanded server-side; this never walks group graphs itself.
#[derive(Clone)]
pub struct MembershipResolver {
    directory: Arc<dyn DirectorySource>,
}

impl MembershipResolver {
    pub fn new(directory: Arc<dyn DirectorySource>) -> Self {
        Self { directory }
    }

    /// Memberships for one subject.
    ///
    /// Directory failures propagate: an unknown membership must never read as
    /// "member of nothing". The one soft case is a device without a directory
    /// identity, which yields an empty set.
    #[instrument(skip(self, subject), fields(subject = %subject.key()))]
    pub async fn resolve(&self, subject: &Subject) -> AppResult<MembershipSet> {
        let groups = match subject.subject_type {
            SubjectType::User => self.directory.user_groups(&subject.id).await?,
            SubjectType::Device => {
                match self.directory.device_directory_id(&subject.id).await? {
                    Some(directory_id) => self.directory.device_groups(&directory_id).await?,
                    None => {
                        warn!(device_id = %subject.id, "Device has no directory identity; treating as member of no groups");
                        Vec::new()
                    }
                }
            }
            // A group is its own matching key
            SubjectType::Group => vec![GroupRef::new(subject.id.clone(), subject.display_label())],
        };

        let set: MembershipSet = groups.into_iter().collect();
        debug!(groups = set.len(), "Resolved memberships");
        Ok(set)
    }
}
