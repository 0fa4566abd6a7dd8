//! Acting on a scan: deletion candidates are promoted or removed, reappeared
//! books are restored.

pub mod deletion;
pub mod restoration;

pub use deletion::{
    plan_book_resolution, resolve_deletions, ArtifactDirs, DeletionReport, RemovalReason,
    Resolution,
};
pub use restoration::{resolve_restorations, RestorationReport};

use crate::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) fn check_cancelled(cancel: &AtomicBool) -> Result<(), Error> {
    if cancel.load(Ordering::Relaxed) {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
