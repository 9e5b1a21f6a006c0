pub mod change_set;
pub mod list_entities;
pub mod newly_released;
pub mod previous_version;
pub mod recent_changes;

pub use change_set::{ChangeSetError, ChangeSetQuery, ChangeSetResponse};
pub use list_entities::{ListEntityTypesQuery, ListEntityTypesResponse};
pub use newly_released::{GeneReleaseStatus, NewlyReleasedError, NewlyReleasedQuery};
pub use previous_version::{PreviousVersionError, PreviousVersionQuery, PreviousVersionResponse};
pub use recent_changes::{RecentChangesError, RecentChangesQuery, RecentChangesResponse};
