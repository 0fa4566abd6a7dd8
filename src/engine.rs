use crate::config::AppConfig;
use crate::error::Error;
use crate::fs_ops::{self, FileMover, TempRecovery};
use crate::hasher;
use crate::naming::{PathResolver, PatternResolver};
use crate::notification::{NotificationSink, TracingSink};
use crate::progress::ScanReporter;
use crate::relocation::{BulkMoveReport, MoveRequest, RelocationOutcome, Relocator};
use crate::resolution::{self, ArtifactDirs, DeletionReport, RestorationReport};
use crate::scanner::{self, FileListing, IgnoreRules, ScanOutcome};
use crate::storage::models::{BookRecord, Library, LibraryPath, TrackedFile};
use crate::storage::Database;
use crate::utils::path::full_path;
use crate::watch::{WatchController, WatchRegistry};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counts of one reconciliation pass over a library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Untracked files found; handing them to file processors is the caller's job.
    pub new: usize,
    pub deleted: usize,
    pub promoted: usize,
    pub restored: usize,
    pub failed: usize,
}

/// Entry point tying the database, the watcher and the filesystem together.
pub struct LibraryEngine {
    config: AppConfig,
    db: Database,
    watch: Arc<dyn WatchController>,
    resolver: Box<dyn PathResolver>,
    sink: Arc<dyn NotificationSink>,
    cancel: Arc<AtomicBool>,
}

impl LibraryEngine {
    /// Starts with every library flagged `watched` registered for pausing.
    pub fn new(config: AppConfig, db: Database) -> Self {
        let registry = WatchRegistry::new();
        match registry.register_watched_libraries(&db) {
            Ok(count) => debug!("Registered {} watched libraries", count),
            Err(e) => warn!("Cannot load watched libraries: {}", e),
        }
        Self {
            config,
            db,
            watch: Arc::new(registry),
            resolver: Box::new(PatternResolver),
            sink: Arc::new(TracingSink),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Opens the database named by `config.db_path`.
    pub fn open(config: AppConfig) -> Result<Self, Error> {
        let db = Database::open(&config.db_path)?;
        Ok(Self::new(config, db))
    }

    pub fn with_watch_controller(mut self, watch: Arc<dyn WatchController>) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn PathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Setting the flag stops batch loops at their next record.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn watch_controller(&self) -> &dyn WatchController {
        self.watch.as_ref()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Lists the library and diffs the listing against its records. Changes
    /// nothing; an unreadable root fails the whole scan.
    pub fn scan(&self, library_id: i64) -> Result<ScanOutcome, Error> {
        let (library, paths) = self.library(library_id)?;
        info!("Scanning library {} ({})", library.name, library.id);

        let ignore = IgnoreRules::new(&self.config.ignore_patterns);
        let listing = scanner::list_library_files(&paths, &ignore)?;
        let books = self.db.get_books_for_library(library_id)?;
        let additional_files = self.db.get_additional_files_for_library(library_id)?;

        let outcome = scanner::diff_library(listing, &roots_by_id(&paths), books, additional_files);
        debug!(
            "Library {}: {} deleted candidates, {} restorable, {} new",
            library.id,
            outcome.deleted_candidates.len(),
            outcome.restorable.len(),
            outcome.new_paths.len()
        );
        Ok(outcome)
    }

    /// Promotes or removes each candidate against `listing`.
    pub fn resolve_deletions(
        &self,
        candidates: &[TrackedFile],
        listing: &FileListing,
    ) -> Result<DeletionReport, Error> {
        let mut roots = HashMap::new();
        let mut seen = Vec::new();
        for candidate in candidates {
            if let TrackedFile::Book(book) = candidate {
                if !seen.contains(&book.library_id) {
                    seen.push(book.library_id);
                    roots.extend(roots_by_id(&self.db.get_library_paths(book.library_id)?));
                }
            }
        }

        resolution::resolve_deletions(
            &self.db,
            self.sink.as_ref(),
            &self.artifact_dirs(),
            candidates,
            listing,
            &roots,
            &self.cancel,
        )
    }

    pub fn resolve_restorations(&self, books: &[BookRecord]) -> Result<RestorationReport, Error> {
        resolution::resolve_restorations(&self.db, self.sink.as_ref(), books, &self.cancel)
    }

    /// Scan, then resolve deletions and restorations in one pass.
    pub fn reconcile(
        &self,
        library_id: i64,
        reporter: &dyn ScanReporter,
    ) -> Result<ScanSummary, Error> {
        let (library, paths) = self.library(library_id)?;
        let roots = roots_by_id(&paths);
        reporter.on_scan_start(&library.name);
        let started = Instant::now();
        let outcome = self.scan(library_id)?;
        reporter.on_scan_complete(outcome.listing.len(), started.elapsed().as_secs_f64());

        let total = outcome.deleted_candidates.len() + outcome.restorable.len();
        reporter.on_resolve_start(total);
        let deletions = self.resolve_deletions(&outcome.deleted_candidates, &outcome.listing)?;
        reporter.on_resolve_progress(outcome.deleted_candidates.len(), total);
        let restorations = self.resolve_restorations(&outcome.restorable)?;
        reporter.on_resolve_progress(total, total);

        // A restored book owns its reappeared file, so it is not new.
        let restored_keys: HashSet<String> = outcome
            .restorable
            .iter()
            .filter_map(|b| scanner::record_key(&roots, b.library_path_id, &b.sub_path, &b.file_name))
            .collect();
        let new = outcome
            .new_paths
            .iter()
            .filter(|file| !restored_keys.contains(&file.key))
            .count();

        let summary = ScanSummary {
            new,
            deleted: deletions.removed,
            promoted: deletions.promoted,
            restored: restorations.restored,
            failed: deletions.failed + restorations.failed,
        };
        info!(
            "Library {} reconciled: {} new, {} deleted, {} promoted, {} restored, {} failed",
            library.name,
            summary.new,
            summary.deleted,
            summary.promoted,
            summary.restored,
            summary.failed
        );
        reporter.on_resolve_complete(&summary);
        Ok(summary)
    }

    pub fn relocate(&self, book_id: i64) -> Result<RelocationOutcome, Error> {
        self.relocator().relocate(book_id)
    }

    pub fn relocate_all(&self, requests: &[MoveRequest]) -> Result<BulkMoveReport, Error> {
        self.relocator().relocate_all(requests)
    }

    /// Recomputes the fingerprint of every live book and stores the ones that
    /// changed as `current_hash`. Returns how many were updated.
    pub fn refresh_fingerprints(&self, library_id: i64) -> Result<usize, Error> {
        let (_, paths) = self.library(library_id)?;
        let roots = roots_by_id(&paths);
        let books: Vec<BookRecord> = self
            .db
            .get_books_for_library(library_id)?
            .into_iter()
            .filter(|book| !book.deleted)
            .collect();

        let fresh: Vec<(i64, String)> = books
            .par_iter()
            .filter_map(|book| {
                let root = roots.get(&book.library_path_id)?;
                let path = full_path(root, &book.sub_path, &book.file_name);
                match hasher::fingerprint(&path) {
                    Ok(hash) if book.current_hash.as_deref() != Some(hash.as_str()) => {
                        Some((book.id, hash))
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Cannot fingerprint {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();

        let mut updated = 0;
        for (book_id, hash) in fresh {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            self.db.update_book_hash(book_id, &hash)?;
            updated += 1;
        }
        info!("Refreshed {} fingerprints in library {}", updated, library_id);
        Ok(updated)
    }

    /// Puts staging files left by an interrupted move back in place.
    pub fn recover_orphaned_temps(&self, library_id: i64) -> Result<TempRecovery, Error> {
        let (_, paths) = self.library(library_id)?;
        let roots: Vec<PathBuf> = paths.iter().map(|p| PathBuf::from(&p.path)).collect();
        Ok(fs_ops::recover_orphaned_temps(&roots))
    }

    fn relocator(&self) -> Relocator<'_> {
        Relocator {
            db: &self.db,
            watch: self.watch.as_ref(),
            resolver: self.resolver.as_ref(),
            sink: self.sink.as_ref(),
            mover: FileMover::new(self.config.retry_policy()),
            drain_timeout: self.config.drain_timeout(),
            cancel: &self.cancel,
        }
    }

    fn artifact_dirs(&self) -> ArtifactDirs {
        ArtifactDirs {
            image_cache_dir: self.config.image_cache_dir.clone(),
            metadata_backup_dir: self.config.metadata_backup_dir.clone(),
        }
    }

    fn library(&self, library_id: i64) -> Result<(Library, Vec<LibraryPath>), Error> {
        let library = self
            .db
            .get_library(library_id)?
            .ok_or(Error::LibraryNotFound(library_id))?;
        let paths = self.db.get_library_paths(library_id)?;
        Ok((library, paths))
    }
}

fn roots_by_id(paths: &[LibraryPath]) -> HashMap<i64, String> {
    paths.iter().map(|p| (p.id, p.path.clone())).collect()
}
