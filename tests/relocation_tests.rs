use shelfkeeper::relocation::MoveRequest;
use shelfkeeper::storage::models::*;
use shelfkeeper::storage::Database;
use shelfkeeper::watch::{WatchController, WatchRegistry};
use shelfkeeper::{AppConfig, Error, LibraryEngine};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Watch controller that records every call in order.
#[derive(Default)]
struct RecordingWatch {
    calls: Mutex<Vec<String>>,
}

impl RecordingWatch {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl WatchController for RecordingWatch {
    fn is_watched(&self, _library_id: i64) -> bool {
        true
    }

    fn pause(&self, library_id: i64) {
        self.calls.lock().unwrap().push(format!("pause {}", library_id));
    }

    fn resume(&self, library_id: i64) {
        self.calls.lock().unwrap().push(format!("resume {}", library_id));
    }

    fn paths_for(&self, _library_ids: &[i64]) -> HashSet<PathBuf> {
        HashSet::new()
    }

    fn drain_events(&self, _paths: &HashSet<PathBuf>, _timeout: Duration) {
        self.calls.lock().unwrap().push("drain".to_string());
    }
}

struct TestLibrary {
    id: i64,
    path_id: i64,
    root: PathBuf,
}

struct Fixture {
    _dir: TempDir,
    engine: LibraryEngine,
    main: TestLibrary,
    other: TestLibrary,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retry.delay_ms = 5;
    config.drain_timeout_ms = 20;
    config
}

fn add_library(db: &Database, dir: &TempDir, name: &str, pattern: Option<&str>) -> TestLibrary {
    let root = dir.path().join(name);
    fs::create_dir_all(&root).unwrap();
    let id = db.insert_library(name, pattern, true).unwrap();
    let path_id = db.insert_library_path(id, root.to_str().unwrap()).unwrap();
    TestLibrary { id, path_id, root }
}

impl Fixture {
    fn new(pattern: Option<&str>, watch: Arc<dyn WatchController>) -> Self {
        Self::build(pattern, Some(watch))
    }

    /// Engine with the watch registry it builds from the database.
    fn with_default_watch(pattern: Option<&str>) -> Self {
        Self::build(pattern, None)
    }

    fn build(pattern: Option<&str>, watch: Option<Arc<dyn WatchController>>) -> Self {
        let dir = tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let main = add_library(&db, &dir, "main", pattern);
        let other = add_library(&db, &dir, "other", Some("{authors}/{title}"));
        let mut engine = LibraryEngine::new(test_config(), db);
        if let Some(watch) = watch {
            engine = engine.with_watch_controller(watch);
        }
        Self {
            _dir: dir,
            engine,
            main,
            other,
        }
    }

    fn db(&self) -> &Database {
        self.engine.database()
    }

    fn add_book(&self, sub_path: &str, file_name: &str, title: &str, authors: &str) -> i64 {
        let dir = self.main.root.join(sub_path);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file_name), format!("contents of {}", title).repeat(200)).unwrap();
        self.db()
            .insert_book(&NewBook {
                library_id: self.main.id,
                library_path_id: self.main.path_id,
                sub_path: sub_path.to_string(),
                file_name: file_name.to_string(),
                book_type: BookFileType::from_file_name(file_name).unwrap(),
                file_size_kb: Some(1),
                hash: None,
                metadata: BookMetadata {
                    title: Some(title.to_string()),
                    authors: Some(authors.to_string()),
                    ..BookMetadata::default()
                },
            })
            .unwrap()
    }

    fn set_pattern(&self, pattern: &str) {
        self.db().set_naming_pattern(self.main.id, Some(pattern)).unwrap();
    }
}

// ── Single relocation ────────────────────────────────────────────────────────

#[test]
fn test_relocate_round_trip_keeps_content() {
    let fx = Fixture::new(Some("{authors}/{title}"), Arc::new(WatchRegistry::new()));
    let book_id = fx.add_book("", "Dune.epub", "Dune", "Frank Herbert");
    let original = fx.main.root.join("Dune.epub");
    let before = shelfkeeper::hasher::fingerprint(&original).unwrap();

    let outcome = fx.engine.relocate(book_id).unwrap();
    assert!(outcome.moved);
    assert_eq!(outcome.new_sub_path.as_deref(), Some("Frank Herbert"));
    assert_eq!(outcome.new_file_name.as_deref(), Some("Dune.epub"));
    assert!(!original.exists());
    assert!(fx.main.root.join("Frank Herbert/Dune.epub").exists());

    fx.set_pattern("{title}");
    let back = fx.engine.relocate(book_id).unwrap();
    assert!(back.moved);

    let book = fx.db().get_book(book_id).unwrap().unwrap();
    assert_eq!(book.sub_path, "");
    assert_eq!(book.file_name, "Dune.epub");
    assert_eq!(shelfkeeper::hasher::fingerprint(&original).unwrap(), before);
    assert!(!fx.main.root.join("Frank Herbert").exists());
    assert!(fx.main.root.is_dir());
}

#[test]
fn test_relocate_in_place_is_a_no_op() {
    let watch = Arc::new(RecordingWatch::default());
    let fx = Fixture::new(None, watch.clone());
    let book_id = fx.add_book("Shelf", "a.epub", "A", "Someone");

    let outcome = fx.engine.relocate(book_id).unwrap();

    assert!(!outcome.moved);
    assert!(outcome.new_file_name.is_none());
    assert!(fx.main.root.join("Shelf/a.epub").exists());
    assert!(watch.calls().is_empty());
}

#[test]
fn test_failed_commit_leaves_file_and_reports_inconsistency() {
    let fx = Fixture::new(Some("{title}/{currentFilename}"), Arc::new(WatchRegistry::new()));
    let book_id = fx.add_book("", "a.epub", "blocker", "Someone");
    fs::write(fx.main.root.join("blocker"), b"a file where a directory should go").unwrap();

    let result = fx.engine.relocate(book_id);

    match result {
        Err(Error::Inconsistent {
            record_id,
            restored,
            target,
            ..
        }) => {
            assert_eq!(record_id, book_id);
            assert!(restored);
            assert_eq!(target, fx.main.root.join("blocker/a.epub"));
        }
        other => panic!("Expected an inconsistency, got {:?}", other),
    }
    assert!(fx.main.root.join("a.epub").exists());
    assert!(!fx.main.root.join("a.epub.tmp_move").exists());

    let book = fx.db().get_book(book_id).unwrap().unwrap();
    assert_eq!(book.sub_path, "blocker");
    assert_eq!(book.file_name, "a.epub");
}

#[test]
fn test_existing_target_is_never_overwritten() {
    let fx = Fixture::new(Some("{title}"), Arc::new(WatchRegistry::new()));
    let book_id = fx.add_book("in", "a.epub", "b", "Someone");
    fs::write(fx.main.root.join("b.epub"), b"someone else's book").unwrap();

    let result = fx.engine.relocate(book_id);

    assert!(matches!(result, Err(Error::TargetExists(_))));
    assert_eq!(fs::read(fx.main.root.join("b.epub")).unwrap(), b"someone else's book");
    assert!(fx.main.root.join("in/a.epub").exists());
    let book = fx.db().get_book(book_id).unwrap().unwrap();
    assert_eq!(book.sub_path, "in");
}

#[test]
fn test_missing_source_fails_without_touching_record() {
    let fx = Fixture::new(Some("{title}"), Arc::new(WatchRegistry::new()));
    let book_id = fx.add_book("in", "a.epub", "moved", "Someone");
    fs::remove_file(fx.main.root.join("in/a.epub")).unwrap();

    assert!(matches!(fx.engine.relocate(book_id), Err(Error::NotAccessible(_))));
    let book = fx.db().get_book(book_id).unwrap().unwrap();
    assert_eq!(book.file_name, "a.epub");
}

#[test]
fn test_unknown_book() {
    let fx = Fixture::new(None, Arc::new(WatchRegistry::new()));
    assert!(matches!(fx.engine.relocate(42), Err(Error::RecordNotFound(42))));
}

// ── Watcher coordination ─────────────────────────────────────────────────────

#[test]
fn test_watching_paused_around_move() {
    let watch = Arc::new(RecordingWatch::default());
    let fx = Fixture::new(Some("{authors}/{title}"), watch.clone());
    let book_id = fx.add_book("", "a.epub", "A", "Someone");

    fx.engine.relocate(book_id).unwrap();

    let id = fx.main.id;
    assert_eq!(
        watch.calls(),
        vec![format!("pause {}", id), "drain".to_string(), format!("resume {}", id)]
    );
}

#[test]
fn test_watching_resumed_after_failure() {
    let registry = Arc::new(WatchRegistry::new());
    let fx = Fixture::new(Some("{title}"), registry.clone());
    registry.register(fx.main.id, vec![fx.main.root.clone()]);
    let book_id = fx.add_book("in", "a.epub", "b", "Someone");
    fs::write(fx.main.root.join("b.epub"), b"taken").unwrap();

    assert!(fx.engine.relocate(book_id).is_err());
    assert!(!registry.is_paused(fx.main.id));
    assert!(registry.is_watched(fx.main.id));
}

#[test]
fn test_default_engine_watches_flagged_libraries() {
    let fx = Fixture::with_default_watch(Some("{title}"));
    let quiet = fx.db().insert_library("quiet", None, false).unwrap();
    let watch = fx.engine.watch_controller();

    assert!(watch.is_watched(fx.main.id));
    assert!(watch.is_watched(fx.other.id));
    assert!(!watch.is_watched(quiet));
    assert_eq!(watch.paths_for(&[fx.main.id]), HashSet::from([fx.main.root.clone()]));

    let book_id = fx.add_book("in", "a.epub", "b", "Someone");
    assert!(fx.engine.relocate(book_id).unwrap().moved);
    assert!(fx.main.root.join("b.epub").exists());
    assert!(fx.engine.watch_controller().is_watched(fx.main.id));
}

#[test]
fn test_relocation_drains_events_of_registered_library() {
    let registry = Arc::new(WatchRegistry::new());
    let fx = Fixture::new(Some("{title}"), registry.clone());
    assert_eq!(registry.register_watched_libraries(fx.db()).unwrap(), 2);
    let book_id = fx.add_book("in", "a.epub", "b", "Someone");
    assert!(registry.begin_event(&fx.main.root.join("in/a.epub")));

    let started = Instant::now();
    fx.engine.relocate(book_id).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(20));
    assert!(registry.is_watched(fx.main.id));
}

// ── Bulk moves ───────────────────────────────────────────────────────────────

#[test]
fn test_bulk_move_isolates_failures() {
    let watch = Arc::new(RecordingWatch::default());
    let fx = Fixture::new(None, watch.clone());
    let first = fx.add_book("", "first.epub", "First", "Ann");
    let blocked = fx.add_book("", "blocked.epub", "Blocked", "Ann");
    let last = fx.add_book("", "last.pdf", "Last", "Bob");
    fs::create_dir_all(fx.other.root.join("Ann")).unwrap();
    fs::write(fx.other.root.join("Ann/Blocked.epub"), b"taken").unwrap();

    let to_other = |book_id| MoveRequest {
        book_id,
        target_library_id: fx.other.id,
        target_library_path_id: fx.other.path_id,
    };
    let report = fx
        .engine
        .relocate_all(&[to_other(first), to_other(999), to_other(blocked), to_other(last)])
        .unwrap();

    assert_eq!(report.moved(), 2);
    let failed: Vec<i64> = report.failed.iter().map(|(id, _)| *id).collect();
    assert_eq!(failed, vec![999, blocked]);

    assert!(fx.other.root.join("Ann/First.epub").exists());
    assert!(fx.other.root.join("Bob/Last.pdf").exists());
    assert!(fx.main.root.join("blocked.epub").exists());

    let moved = fx.db().get_book(last).unwrap().unwrap();
    assert_eq!(moved.library_id, fx.other.id);
    assert_eq!(moved.library_path_id, fx.other.path_id);
    assert_eq!(moved.sub_path, "Bob");

    let calls = watch.calls();
    assert_eq!(calls.iter().filter(|c| *c == "drain").count(), 1);
    for id in [fx.main.id, fx.other.id] {
        assert!(calls.contains(&format!("pause {}", id)));
        assert!(calls.contains(&format!("resume {}", id)));
    }
}

#[test]
fn test_bulk_move_rejects_path_of_another_library() {
    let fx = Fixture::new(None, Arc::new(WatchRegistry::new()));
    let book_id = fx.add_book("", "a.epub", "A", "Ann");

    let report = fx
        .engine
        .relocate_all(&[MoveRequest {
            book_id,
            target_library_id: fx.other.id,
            target_library_path_id: fx.main.path_id,
        }])
        .unwrap();

    assert_eq!(report.moved(), 0);
    assert!(matches!(report.failed[0].1, Error::LibraryPathNotFound(_)));
    assert!(fx.main.root.join("a.epub").exists());
}

#[test]
fn test_bulk_move_honours_cancellation() {
    let fx = Fixture::new(None, Arc::new(WatchRegistry::new()));
    let book_id = fx.add_book("", "a.epub", "A", "Ann");
    fx.engine.cancel_token().store(true, Ordering::Relaxed);

    let result = fx.engine.relocate_all(&[MoveRequest {
        book_id,
        target_library_id: fx.other.id,
        target_library_path_id: fx.other.path_id,
    }]);

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(fx.main.root.join("a.epub").exists());
}
