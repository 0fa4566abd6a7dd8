use super::check_cancelled;
use crate::error::Error;
use crate::notification::{publish_quietly, Notification, NotificationSink, Topic};
use crate::scanner::diff::record_key;
use crate::scanner::FileListing;
use crate::storage::models::{AdditionalFile, AdditionalFileKind, BookFileType, BookRecord, TrackedFile};
use crate::storage::Database;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The book keeps its id and now points at a former alternative format.
    Promoted {
        book: BookRecord,
        additional_file_id: i64,
    },
    Removed(RemovalReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    NoAlternativeFormat,
    AlternativesMissing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub promoted: usize,
    pub removed: usize,
    pub additional_removed: usize,
    pub failed: usize,
}

/// Decides the fate of a book whose primary file disappeared.
///
/// The first alternative-format file (in collection order) that is still on
/// disk and has a book extension takes over as the primary file.
pub fn plan_book_resolution(
    book: &BookRecord,
    additional_files: &[AdditionalFile],
    listing: &FileListing,
    roots: &HashMap<i64, String>,
) -> Resolution {
    let mut alternatives = additional_files
        .iter()
        .filter(|f| f.book_id == book.id && f.kind == AdditionalFileKind::AlternativeFormat)
        .peekable();

    if alternatives.peek().is_none() {
        return Resolution::Removed(RemovalReason::NoAlternativeFormat);
    }

    let candidate = alternatives.find_map(|file| {
        let book_type = BookFileType::from_file_name(&file.file_name)?;
        let key = record_key(roots, file.library_path_id, &file.sub_path, &file.file_name)?;
        listing.contains(&key).then_some((file, book_type))
    });

    match candidate {
        Some((file, book_type)) => {
            let mut promoted = book.clone();
            promoted.library_path_id = file.library_path_id;
            promoted.sub_path = file.sub_path.clone();
            promoted.file_name = file.file_name.clone();
            promoted.book_type = book_type;
            promoted.file_size_kb = file.file_size_kb;
            promoted.initial_hash = file.initial_hash.clone();
            promoted.current_hash = file.current_hash.clone();
            Resolution::Promoted {
                book: promoted,
                additional_file_id: file.id,
            }
        }
        None => Resolution::Removed(RemovalReason::AlternativesMissing),
    }
}

/// Per-book artifact directories outside the library (`<root>/<book id>`).
#[derive(Debug, Clone, Default)]
pub struct ArtifactDirs {
    pub image_cache_dir: Option<PathBuf>,
    pub metadata_backup_dir: Option<PathBuf>,
}

impl ArtifactDirs {
    /// Best effort; failures are logged and never stop the removal.
    pub fn remove_for(&self, book_id: i64) {
        for root in [&self.image_cache_dir, &self.metadata_backup_dir]
            .into_iter()
            .flatten()
        {
            let dir = root.join(book_id.to_string());
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!("Removed {}", dir.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
            }
        }
    }
}

/// Promotes or removes each candidate. One failing record never aborts the
/// batch; only cancellation does.
pub fn resolve_deletions(
    db: &Database,
    sink: &dyn NotificationSink,
    artifacts: &ArtifactDirs,
    candidates: &[TrackedFile],
    listing: &FileListing,
    roots: &HashMap<i64, String>,
    cancel: &AtomicBool,
) -> Result<DeletionReport, Error> {
    let mut report = DeletionReport::default();

    for candidate in candidates {
        check_cancelled(cancel)?;
        let outcome = match candidate {
            TrackedFile::Book(book) => {
                resolve_book(db, sink, artifacts, book, listing, roots, &mut report)
            }
            TrackedFile::Additional(file) => db
                .delete_additional_file(file.id)
                .map(|()| {
                    debug!("Removed vanished additional file {} ({})", file.id, file.file_name);
                    report.additional_removed += 1;
                })
                .map_err(Error::from),
        };
        if let Err(e) = outcome {
            error!(record_id = candidate.id(), "Failed to resolve deletion: {}", e);
            report.failed += 1;
        }
    }

    info!(
        "Deletions resolved: {} promoted, {} removed, {} additional files removed, {} failed",
        report.promoted, report.removed, report.additional_removed, report.failed
    );
    Ok(report)
}

fn resolve_book(
    db: &Database,
    sink: &dyn NotificationSink,
    artifacts: &ArtifactDirs,
    book: &BookRecord,
    listing: &FileListing,
    roots: &HashMap<i64, String>,
    report: &mut DeletionReport,
) -> Result<(), Error> {
    let additional_files = db.get_additional_files_for_book(book.id)?;

    match plan_book_resolution(book, &additional_files, listing, roots) {
        Resolution::Promoted {
            book: promoted,
            additional_file_id,
        } => {
            db.promote_additional_file(&promoted, additional_file_id)?;
            info!(
                "Book {} lost {}, promoted {}",
                book.id, book.file_name, promoted.file_name
            );
            report.promoted += 1;
            publish_quietly(sink, notification(Topic::BookUpdated, &promoted));
        }
        Resolution::Removed(reason) => {
            artifacts.remove_for(book.id);
            let now = chrono::Utc::now().to_rfc3339();
            db.soft_delete_book(book.id, &now)?;
            info!("Book {} ({}) removed: {:?}", book.id, book.file_name, reason);
            report.removed += 1;
            publish_quietly(sink, notification(Topic::BookRemoved, book));
        }
    }
    Ok(())
}

pub(crate) fn notification(topic: Topic, book: &BookRecord) -> Notification {
    Notification {
        topic,
        book_id: book.id,
        library_id: book.library_id,
        file_name: book.file_name.clone(),
        sub_path: book.sub_path.clone(),
    }
}
