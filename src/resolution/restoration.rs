use super::check_cancelled;
use super::deletion::notification;
use crate::error::Error;
use crate::notification::{publish_quietly, NotificationSink, Topic};
use crate::storage::models::BookRecord;
use crate::storage::Database;
use std::sync::atomic::AtomicBool;
use tracing::{error, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestorationReport {
    pub restored: usize,
    pub failed: usize,
}

/// Un-deletes books whose file reappeared. `added_on` is reset so the book
/// surfaces as recently added.
pub fn resolve_restorations(
    db: &Database,
    sink: &dyn NotificationSink,
    books: &[BookRecord],
    cancel: &AtomicBool,
) -> Result<RestorationReport, Error> {
    let mut report = RestorationReport::default();

    for book in books {
        check_cancelled(cancel)?;
        let now = chrono::Utc::now().to_rfc3339();
        match db.restore_book(book.id, &now) {
            Ok(()) => {
                info!("Restored book {} ({})", book.id, book.file_name);
                report.restored += 1;
                publish_quietly(sink, notification(Topic::BookAdded, book));
            }
            Err(e) => {
                error!(book_id = book.id, "Failed to restore book: {}", e);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Notification, PublishError};
    use crate::storage::models::{BookFileType, NewBook};
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<Notification>>);

    impl NotificationSink for RecordingSink {
        fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn deleted_book(db: &Database) -> BookRecord {
        let library_id = db.insert_library("Books", None, false).unwrap();
        let path_id = db.insert_library_path(library_id, "/lib").unwrap();
        let id = db
            .insert_book(&NewBook {
                library_id,
                library_path_id: path_id,
                sub_path: String::new(),
                file_name: "a.epub".to_string(),
                book_type: BookFileType::Epub,
                file_size_kb: Some(1),
                hash: Some("h".to_string()),
                metadata: Default::default(),
            })
            .unwrap();
        db.soft_delete_book(id, "2020-01-01T00:00:00+00:00").unwrap();
        db.get_book(id).unwrap().unwrap()
    }

    #[test]
    fn test_restores_and_notifies() {
        let db = Database::open_in_memory().unwrap();
        let book = deleted_book(&db);
        let sink = RecordingSink::default();

        let report = resolve_restorations(&db, &sink, &[book.clone()], &AtomicBool::new(false)).unwrap();

        assert_eq!(report, RestorationReport { restored: 1, failed: 0 });
        let restored = db.get_book(book.id).unwrap().unwrap();
        assert!(!restored.deleted);
        assert!(restored.deleted_at.is_none());
        assert!(restored.added_on.is_some());
        let sent = sink.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, Topic::BookAdded);
    }

    #[test]
    fn test_missing_record_counts_as_failure() {
        let db = Database::open_in_memory().unwrap();
        let mut book = deleted_book(&db);
        book.id = 999;

        let report =
            resolve_restorations(&db, &RecordingSink::default(), &[book], &AtomicBool::new(false)).unwrap();
        assert_eq!(report, RestorationReport { restored: 0, failed: 1 });
    }

    #[test]
    fn test_cancellation_stops_the_batch() {
        let db = Database::open_in_memory().unwrap();
        let book = deleted_book(&db);
        let cancel = AtomicBool::new(false);
        cancel.store(true, Ordering::Relaxed);

        let result = resolve_restorations(&db, &RecordingSink::default(), &[book], &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
