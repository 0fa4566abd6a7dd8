//! Moving books to where their library's naming pattern says they belong.
//!
//! A relocation pauses the watcher for every library it touches, stages the
//! file next to itself, rewrites the record, then commits the staged file to
//! its new home. The database write sits between stage and commit so that any
//! failure before the commit can still be undone on disk.

use crate::error::Error;
use crate::fs_ops::{cleanup_empty_ancestors, FileMover, MoveState, StagedMove};
use crate::naming::PathResolver;
use crate::notification::{publish_quietly, NotificationSink, Topic};
use crate::resolution::deletion::notification;
use crate::storage::models::{BookRecord, Library, LibraryPath};
use crate::storage::Database;
use crate::utils::path::{full_path, split_relative};
use crate::watch::{PauseGuard, WatchController};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// One entry of a bulk move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub book_id: i64,
    pub target_library_id: i64,
    pub target_library_path_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationOutcome {
    pub book_id: i64,
    pub moved: bool,
    pub new_file_name: Option<String>,
    pub new_sub_path: Option<String>,
}

impl RelocationOutcome {
    fn not_moved(book_id: i64) -> Self {
        Self {
            book_id,
            moved: false,
            new_file_name: None,
            new_sub_path: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct BulkMoveReport {
    pub outcomes: Vec<RelocationOutcome>,
    pub failed: Vec<(i64, Error)>,
}

impl BulkMoveReport {
    pub fn moved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.moved).count()
    }
}

/// Borrowed view of the collaborators a relocation needs.
pub struct Relocator<'a> {
    pub db: &'a Database,
    pub watch: &'a dyn WatchController,
    pub resolver: &'a dyn PathResolver,
    pub sink: &'a dyn NotificationSink,
    pub mover: FileMover,
    pub drain_timeout: Duration,
    pub cancel: &'a AtomicBool,
}

/// Resolved source and destination of one move.
struct MovePlan {
    book: BookRecord,
    target_library: Library,
    target_path: LibraryPath,
    source: PathBuf,
    target: PathBuf,
    new_sub_path: String,
    new_file_name: String,
    /// Roots of the library the file leaves; cleanup never goes above them.
    source_roots: Vec<PathBuf>,
}

impl<'a> Relocator<'a> {
    /// Moves a book within its library to the path the naming pattern gives.
    pub fn relocate(&self, book_id: i64) -> Result<RelocationOutcome, Error> {
        let book = self.book(book_id)?;
        let request = MoveRequest {
            book_id,
            target_library_id: book.library_id,
            target_library_path_id: book.library_path_id,
        };
        let plan = self.plan(book, &request)?;
        if plan.source == plan.target {
            return Ok(RelocationOutcome::not_moved(book_id));
        }

        let outcome = {
            let _guard = PauseGuard::acquire(
                self.watch,
                &[plan.book.library_id, plan.target_library.id],
                self.drain_timeout,
            );
            self.execute(&plan)?
        };
        self.announce(book_id);
        Ok(outcome)
    }

    /// Moves every request in order, pausing all touched libraries once.
    /// A failed move is recorded and the batch carries on.
    pub fn relocate_all(&self, requests: &[MoveRequest]) -> Result<BulkMoveReport, Error> {
        let mut report = BulkMoveReport::default();
        let mut plans = Vec::with_capacity(requests.len());
        let mut touched = Vec::new();

        for request in requests {
            match self.book(request.book_id).and_then(|book| self.plan(book, request)) {
                Ok(plan) => {
                    touched.push(plan.book.library_id);
                    touched.push(plan.target_library.id);
                    plans.push(plan);
                }
                Err(e) => {
                    warn!(book_id = request.book_id, "Cannot plan move: {}", e);
                    report.failed.push((request.book_id, e));
                }
            }
        }

        let mut moved_ids = Vec::new();
        let mut cancelled = false;
        {
            let _guard = PauseGuard::acquire(self.watch, &touched, self.drain_timeout);
            for plan in &plans {
                if self.cancel.load(Ordering::Relaxed) {
                    warn!("Bulk move cancelled after {} items", report.outcomes.len());
                    cancelled = true;
                    break;
                }
                if plan.source == plan.target {
                    report.outcomes.push(RelocationOutcome::not_moved(plan.book.id));
                    continue;
                }
                match self.execute(plan) {
                    Ok(outcome) => {
                        moved_ids.push(plan.book.id);
                        report.outcomes.push(outcome);
                    }
                    Err(e) => {
                        error!(book_id = plan.book.id, "Move failed: {}", e);
                        report.failed.push((plan.book.id, e));
                    }
                }
            }
        }

        for book_id in moved_ids {
            self.announce(book_id);
        }
        if cancelled {
            return Err(Error::Cancelled);
        }
        info!(
            "Bulk move finished: {} moved, {} failed",
            report.moved(),
            report.failed.len()
        );
        Ok(report)
    }

    fn book(&self, book_id: i64) -> Result<BookRecord, Error> {
        self.db
            .get_book(book_id)?
            .filter(|book| !book.deleted)
            .ok_or(Error::RecordNotFound(book_id))
    }

    fn plan(&self, book: BookRecord, request: &MoveRequest) -> Result<MovePlan, Error> {
        let source_path = self
            .db
            .get_library_path(book.library_path_id)?
            .ok_or(Error::LibraryPathNotFound(book.library_path_id))?;
        let target_library = self
            .db
            .get_library(request.target_library_id)?
            .ok_or(Error::LibraryNotFound(request.target_library_id))?;
        let target_path = self
            .db
            .get_library_path(request.target_library_path_id)?
            .filter(|path| path.library_id == target_library.id)
            .ok_or(Error::LibraryPathNotFound(request.target_library_path_id))?;
        let source_roots = self
            .db
            .get_library_paths(book.library_id)?
            .into_iter()
            .map(|path| PathBuf::from(path.path))
            .collect();

        let pattern = target_library.naming_pattern.as_deref().unwrap_or_default();
        let relative = self.resolver.resolve_path(&book, pattern);
        let (new_sub_path, new_file_name) = split_relative(&relative);

        Ok(MovePlan {
            source: full_path(&source_path.path, &book.sub_path, &book.file_name),
            target: full_path(&target_path.path, &new_sub_path, &new_file_name),
            book,
            target_library,
            target_path,
            new_sub_path,
            new_file_name,
            source_roots,
        })
    }

    /// Stage, rewrite the record, commit, clean up. Watching must already be
    /// paused by the caller.
    fn execute(&self, plan: &MovePlan) -> Result<RelocationOutcome, Error> {
        if plan.target.exists() {
            return Err(Error::TargetExists(plan.target.clone()));
        }

        let mut staged = StagedMove::new(&self.mover, plan.source.clone(), plan.target.clone());
        staged.stage()?;

        if let Err(e) = self.db.update_book_location(
            plan.book.id,
            plan.target_library.id,
            plan.target_path.id,
            &plan.new_sub_path,
            &plan.new_file_name,
        ) {
            error!(book_id = plan.book.id, "Record update failed, rolling back: {}", e);
            staged.roll_back();
            return Err(e.into());
        }

        if let Err(e) = staged.commit() {
            let temp_path = staged.temp_path().map(PathBuf::from).unwrap_or_default();
            let restored = staged.roll_back() == MoveState::RolledBack;
            staged.mark_inconsistent();
            error!(
                book_id = plan.book.id,
                temp = %temp_path.display(),
                target = %plan.target.display(),
                restored,
                "Commit failed after the record was updated: {}",
                e
            );
            return Err(Error::Inconsistent {
                record_id: plan.book.id,
                temp_path,
                target: plan.target.clone(),
                restored,
            });
        }

        if let Some(vacated) = plan.source.parent() {
            cleanup_empty_ancestors(vacated, &plan.source_roots);
        }

        info!(
            "Moved book {}: {} -> {}",
            plan.book.id,
            plan.source.display(),
            plan.target.display()
        );
        Ok(RelocationOutcome {
            book_id: plan.book.id,
            moved: true,
            new_file_name: Some(plan.new_file_name.clone()),
            new_sub_path: Some(plan.new_sub_path.clone()),
        })
    }

    /// Re-reads the record so subscribers see what was persisted.
    fn announce(&self, book_id: i64) {
        match self.db.get_book(book_id) {
            Ok(Some(book)) => publish_quietly(self.sink, notification(Topic::BookUpdated, &book)),
            Ok(None) => warn!(book_id, "Moved book vanished before notification"),
            Err(e) => warn!(book_id, "Cannot re-read moved book: {}", e),
        }
    }
}
