pub mod record_commit;

pub use record_commit::{RecordCommitCommand, RecordCommitError, RecordCommitResponse};
