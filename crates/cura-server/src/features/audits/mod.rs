pub mod commands;
pub mod queries;
pub mod routes;
pub mod types;

pub use commands::{RecordCommitCommand, RecordCommitError, RecordCommitResponse};

pub use queries::{
    ChangeSetError, ChangeSetQuery, ChangeSetResponse, GeneReleaseStatus, ListEntityTypesQuery,
    ListEntityTypesResponse, NewlyReleasedError, NewlyReleasedQuery, PreviousVersionError,
    PreviousVersionQuery, PreviousVersionResponse, RecentChangesError, RecentChangesQuery,
    RecentChangesResponse,
};

pub use routes::audits_routes;
pub use types::{CommitMetadata, EntityAuditEvent};
