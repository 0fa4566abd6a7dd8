//! Filesystem moves that never lose a file: staged move with rollback,
//! bounded retry for transient errors, and empty-directory cleanup.

mod cleanup;
mod recovery;
mod retry;
mod staged;

pub use cleanup::{cleanup_empty_ancestors, is_ignorable_file_name, IGNORABLE_FILE_NAMES};
pub use recovery::{recover_orphaned_temps, TempRecovery};
pub use retry::{with_retry, RetryPolicy, TransientKind};
pub use staged::{temp_path_for, FileMover, MoveState, StagedMove, TEMP_SUFFIX};
