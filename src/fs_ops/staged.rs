use super::retry::{with_retry, RetryPolicy, TransientKind};
use crate::error::Error;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, error, info, warn};

pub const TEMP_SUFFIX: &str = ".tmp_move";

/// Sibling staging path: `book.epub` -> `book.epub.tmp_move`.
pub fn temp_path_for(source: &Path) -> PathBuf {
    let mut name = source
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    source.with_file_name(name)
}

/// Single-file move primitives with retry.
#[derive(Debug, Clone, Default)]
pub struct FileMover {
    policy: RetryPolicy,
}

impl FileMover {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Polls until `path` exists and can be opened for reading.
    pub fn wait_until_accessible(&self, path: &Path) -> bool {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            if path.is_file() && File::open(path).is_ok() {
                return true;
            }
            if attempt < attempts {
                debug!(
                    "{} not accessible yet (attempt {}/{})",
                    path.display(),
                    attempt,
                    attempts
                );
                thread::sleep(self.policy.delay);
            }
        }
        false
    }

    /// Moves `source` aside to its `.tmp_move` sibling. A sibling left by an
    /// earlier interrupted move is never replaced.
    pub fn stage_move(&self, source: &Path) -> Result<PathBuf, Error> {
        if !self.wait_until_accessible(source) {
            return Err(Error::NotAccessible(source.to_path_buf()));
        }
        let temp = temp_path_for(source);
        if temp.exists() {
            error!(
                temp = %temp.display(),
                "Orphaned temp file is in the way, refusing to stage"
            );
            return Err(Error::TargetExists(temp));
        }
        with_retry(&self.policy, source, || move_path(source, &temp))?;
        debug!("Staged {} -> {}", source.display(), temp.display());
        Ok(temp)
    }

    /// Fails with `TargetExists` rather than replace a file that appeared at
    /// `target` after the move was planned.
    pub fn commit_move(&self, temp: &Path, target: &Path) -> Result<(), Error> {
        if target.exists() {
            return Err(Error::TargetExists(target.to_path_buf()));
        }
        if let Some(parent) = target.parent() {
            with_retry(&self.policy, parent, || fs::create_dir_all(parent))?;
        }
        with_retry(&self.policy, temp, || move_path(temp, target))?;
        debug!("Committed {} -> {}", temp.display(), target.display());
        Ok(())
    }

    /// Best effort: puts the staged file back. Returns false, after logging the
    /// orphan for manual recovery, if every attempt failed.
    pub fn rollback(&self, temp: &Path, original: &Path) -> bool {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match move_path(temp, original) {
                Ok(()) => {
                    info!("Rolled back {} -> {}", temp.display(), original.display());
                    return true;
                }
                Err(e) => {
                    warn!(
                        "Rollback of {} failed (attempt {}/{}): {}",
                        temp.display(),
                        attempt,
                        attempts,
                        e
                    );
                    if attempt < attempts {
                        thread::sleep(self.policy.delay);
                    }
                }
            }
        }
        error!(
            temp = %temp.display(),
            original = %original.display(),
            "Orphaned temp file needs manual recovery"
        );
        false
    }

    /// One-step move, no staging.
    pub fn direct_move(&self, source: &Path, target: &Path) -> Result<(), Error> {
        if !self.wait_until_accessible(source) {
            return Err(Error::NotAccessible(source.to_path_buf()));
        }
        if target.exists() {
            return Err(Error::TargetExists(target.to_path_buf()));
        }
        if let Some(parent) = target.parent() {
            with_retry(&self.policy, parent, || fs::create_dir_all(parent))?;
        }
        with_retry(&self.policy, source, || move_path(source, target))
    }
}

/// Rename, falling back to copy + remove when rename fails for a
/// non-transient reason (e.g. crossing devices).
pub(crate) fn move_path(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if TransientKind::classify(&e).is_some() => Err(e),
        Err(e) => {
            warn!(
                "Rename {} -> {} failed ({}), falling back to copy+remove",
                source.display(),
                target.display(),
                e
            );
            if let Err(copy_err) = fs::copy(source, target) {
                let _ = fs::remove_file(target);
                return Err(copy_err);
            }
            fs::remove_file(source)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    Idle,
    Staged,
    Committed,
    RolledBack,
    Inconsistent,
}

/// One source -> target move driven through stage, commit or rollback.
#[derive(Debug)]
pub struct StagedMove<'a> {
    mover: &'a FileMover,
    source: PathBuf,
    target: PathBuf,
    temp: Option<PathBuf>,
    state: MoveState,
}

impl<'a> StagedMove<'a> {
    pub fn new(mover: &'a FileMover, source: PathBuf, target: PathBuf) -> Self {
        Self {
            mover,
            source,
            target,
            temp: None,
            state: MoveState::Idle,
        }
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn temp_path(&self) -> Option<&Path> {
        self.temp.as_deref()
    }

    pub fn stage(&mut self) -> Result<(), Error> {
        if self.state != MoveState::Idle {
            return Err(Error::Other(format!(
                "cannot stage {} from state {:?}",
                self.source.display(),
                self.state
            )));
        }
        let temp = self.mover.stage_move(&self.source)?;
        self.temp = Some(temp);
        self.state = MoveState::Staged;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        let temp = match (&self.temp, self.state) {
            (Some(temp), MoveState::Staged) => temp.clone(),
            _ => {
                return Err(Error::Other(format!(
                    "cannot commit {} from state {:?}",
                    self.source.display(),
                    self.state
                )))
            }
        };
        self.mover.commit_move(&temp, &self.target)?;
        self.state = MoveState::Committed;
        Ok(())
    }

    /// Restores the source from the staged copy. A no-op unless staged.
    pub fn roll_back(&mut self) -> MoveState {
        if let (Some(temp), MoveState::Staged) = (&self.temp, self.state) {
            if self.mover.rollback(temp, &self.source) {
                self.state = MoveState::RolledBack;
            }
        }
        self.state
    }

    /// The database now disagrees with the filesystem.
    pub fn mark_inconsistent(&mut self) {
        self.state = MoveState::Inconsistent;
    }
}
