use super::walk::{FileListing, LibraryFile};
use crate::storage::models::{AdditionalFile, BookRecord, TrackedFile};
use crate::utils::path::full_path_key;
use std::collections::{HashMap, HashSet};

/// Differences between a library listing and its persisted records.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Live records whose file is gone.
    pub deleted_candidates: Vec<TrackedFile>,
    /// Soft-deleted books whose file is back.
    pub restorable: Vec<BookRecord>,
    /// Files no live record accounts for.
    pub new_paths: Vec<LibraryFile>,
    /// The listing the diff was computed from.
    pub listing: FileListing,
}

impl ScanOutcome {
    pub fn is_empty(&self) -> bool {
        self.deleted_candidates.is_empty() && self.restorable.is_empty() && self.new_paths.is_empty()
    }
}

/// Full-path key of a record, or `None` if its library path is unknown
/// (such a record cannot be on disk as far as this library is concerned).
pub fn record_key(
    roots: &HashMap<i64, String>,
    library_path_id: i64,
    sub_path: &str,
    file_name: &str,
) -> Option<String> {
    roots
        .get(&library_path_id)
        .map(|root| full_path_key(root, sub_path, file_name))
}

/// Classifies every record against `listing`. Pure: touches neither disk nor
/// database.
///
/// Only live records claim a listed file. A soft-deleted book whose path
/// reappeared is restorable, and its file is still offered as a new path;
/// callers that restore it must not also import it.
pub fn diff_library(
    listing: FileListing,
    roots: &HashMap<i64, String>,
    books: Vec<BookRecord>,
    additional_files: Vec<AdditionalFile>,
) -> ScanOutcome {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut deleted_candidates = Vec::new();
    let mut restorable = Vec::new();

    for book in books {
        let key = record_key(roots, book.library_path_id, &book.sub_path, &book.file_name);
        let present = key.as_deref().map(|k| listing.contains(k)).unwrap_or(false);
        match (book.deleted, present) {
            (false, true) => {
                claimed.extend(key);
            }
            (false, false) => deleted_candidates.push(TrackedFile::Book(book)),
            (true, true) => restorable.push(book),
            (true, false) => {}
        }
    }

    for file in additional_files {
        let key = record_key(roots, file.library_path_id, &file.sub_path, &file.file_name);
        match key {
            Some(key) if listing.contains(&key) => {
                claimed.insert(key);
            }
            _ => deleted_candidates.push(TrackedFile::Additional(file)),
        }
    }

    let new_paths = listing
        .files()
        .iter()
        .filter(|file| !claimed.contains(&file.key))
        .cloned()
        .collect();

    ScanOutcome {
        deleted_candidates,
        restorable,
        new_paths,
        listing,
    }
}
