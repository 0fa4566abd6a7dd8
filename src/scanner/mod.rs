pub mod diff;
pub mod walk;

pub use diff::{diff_library, record_key, ScanOutcome};
pub use walk::{list_library_files, FileListing, IgnoreRules, LibraryFile};
