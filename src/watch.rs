//! Pause/resume control over the filesystem watcher, keyed by library id.
//!
//! The watcher itself lives outside this crate. It asks [`WatchRegistry`]
//! whether an event should be dispatched and reports when it is done with it,
//! which is what lets a relocation drain in-flight events before it moves
//! anything.

use crate::error::Error;
use crate::storage::Database;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub trait WatchController: Send + Sync {
    /// Registered and not paused.
    fn is_watched(&self, library_id: i64) -> bool;
    fn pause(&self, library_id: i64);
    fn resume(&self, library_id: i64);
    fn paths_for(&self, library_ids: &[i64]) -> HashSet<PathBuf>;
    /// Waits at most `timeout` for in-flight events under `paths`.
    fn drain_events(&self, paths: &HashSet<PathBuf>, timeout: Duration);
}

/// Pauses every watched library on acquire and resumes exactly those on drop,
/// so the previous watch state survives any exit path.
pub struct PauseGuard<'a> {
    controller: &'a dyn WatchController,
    paused: Vec<i64>,
}

impl<'a> PauseGuard<'a> {
    pub fn acquire(
        controller: &'a dyn WatchController,
        library_ids: &[i64],
        drain_timeout: Duration,
    ) -> Self {
        let mut ids = library_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let paused: Vec<i64> = ids
            .into_iter()
            .filter(|id| controller.is_watched(*id))
            .collect();
        for id in &paused {
            controller.pause(*id);
        }
        if !paused.is_empty() {
            debug!("Paused watching for libraries {:?}", paused);
            let paths = controller.paths_for(&paused);
            controller.drain_events(&paths, drain_timeout);
        }

        Self { controller, paused }
    }

    pub fn paused_libraries(&self) -> &[i64] {
        &self.paused
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        for id in &self.paused {
            self.controller.resume(*id);
        }
        if !self.paused.is_empty() {
            debug!("Resumed watching for libraries {:?}", self.paused);
        }
    }
}

#[derive(Debug, Default)]
struct WatchedLibrary {
    roots: Vec<PathBuf>,
    paused: bool,
    in_flight: usize,
}

/// In-process watch state shared between the watcher and the engine.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    libraries: Mutex<HashMap<i64, WatchedLibrary>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, WatchedLibrary>> {
        self.libraries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, library_id: i64, roots: Vec<PathBuf>) {
        let mut libraries = self.lock();
        let entry = libraries.entry(library_id).or_default();
        entry.roots = roots;
        entry.paused = false;
    }

    /// Registers every library flagged `watched` in `db` under its roots.
    /// Returns how many were registered.
    pub fn register_watched_libraries(&self, db: &Database) -> Result<usize, Error> {
        let mut count = 0;
        for library in db.list_libraries()?.into_iter().filter(|l| l.watched) {
            let roots = db
                .get_library_paths(library.id)?
                .into_iter()
                .map(|p| PathBuf::from(p.path))
                .collect();
            self.register(library.id, roots);
            count += 1;
        }
        Ok(count)
    }

    pub fn unregister(&self, library_id: i64) {
        self.lock().remove(&library_id);
    }

    pub fn is_paused(&self, library_id: i64) -> bool {
        self.lock().get(&library_id).map(|l| l.paused).unwrap_or(false)
    }

    /// Called by the watcher for each raw event. Returns false when the event
    /// belongs to a paused or unknown library and must be dropped; otherwise
    /// the event counts as in flight until [`finish_event`](Self::finish_event).
    pub fn begin_event(&self, path: &Path) -> bool {
        let mut libraries = self.lock();
        match owning_library(&mut libraries, path) {
            Some(library) if !library.paused => {
                library.in_flight += 1;
                true
            }
            _ => false,
        }
    }

    pub fn finish_event(&self, path: &Path) {
        let mut libraries = self.lock();
        if let Some(library) = owning_library(&mut libraries, path) {
            library.in_flight = library.in_flight.saturating_sub(1);
        }
    }

    fn in_flight_under(&self, paths: &HashSet<PathBuf>) -> usize {
        self.lock()
            .values()
            .filter(|l| l.roots.iter().any(|r| paths.contains(r)))
            .map(|l| l.in_flight)
            .sum()
    }
}

fn owning_library<'m>(
    libraries: &'m mut HashMap<i64, WatchedLibrary>,
    path: &Path,
) -> Option<&'m mut WatchedLibrary> {
    libraries
        .values_mut()
        .find(|l| l.roots.iter().any(|root| path.starts_with(root)))
}

impl WatchController for WatchRegistry {
    fn is_watched(&self, library_id: i64) -> bool {
        self.lock()
            .get(&library_id)
            .map(|l| !l.paused)
            .unwrap_or(false)
    }

    fn pause(&self, library_id: i64) {
        if let Some(library) = self.lock().get_mut(&library_id) {
            library.paused = true;
        }
    }

    fn resume(&self, library_id: i64) {
        if let Some(library) = self.lock().get_mut(&library_id) {
            library.paused = false;
        }
    }

    fn paths_for(&self, library_ids: &[i64]) -> HashSet<PathBuf> {
        let libraries = self.lock();
        library_ids
            .iter()
            .filter_map(|id| libraries.get(id))
            .flat_map(|l| l.roots.iter().cloned())
            .collect()
    }

    fn drain_events(&self, paths: &HashSet<PathBuf>, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self.in_flight_under(paths);
            if pending == 0 {
                return;
            }
            if Instant::now() >= deadline {
                warn!(
                    "{} watch events still in flight after {:?}, continuing",
                    pending, timeout
                );
                return;
            }
            thread::sleep(DRAIN_POLL_INTERVAL);
        }
    }
}
