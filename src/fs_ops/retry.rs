use crate::error::Error;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// I/O failures worth retrying. Everything else propagates on first sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    NotFound,
    AccessDenied,
    Busy,
    DirectoryNotEmpty,
}

impl TransientKind {
    pub fn classify(err: &io::Error) -> Option<Self> {
        match err.kind() {
            io::ErrorKind::NotFound => return Some(TransientKind::NotFound),
            io::ErrorKind::PermissionDenied => return Some(TransientKind::AccessDenied),
            io::ErrorKind::ResourceBusy => return Some(TransientKind::Busy),
            io::ErrorKind::DirectoryNotEmpty => return Some(TransientKind::DirectoryNotEmpty),
            _ => {}
        }
        classify_os_code(err.raw_os_error()?)
    }
}

#[cfg(windows)]
fn classify_os_code(code: i32) -> Option<TransientKind> {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION, ERROR_DIR_NOT_EMPTY
    match code {
        32 | 33 => Some(TransientKind::Busy),
        145 => Some(TransientKind::DirectoryNotEmpty),
        _ => None,
    }
}

#[cfg(not(windows))]
fn classify_os_code(code: i32) -> Option<TransientKind> {
    // EBUSY, ETXTBSY
    match code {
        16 | 26 => Some(TransientKind::Busy),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent.
pub fn with_retry<T, F>(policy: &RetryPolicy, path: &Path, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> io::Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => match TransientKind::classify(&err) {
                Some(kind) if attempt < max_attempts => {
                    debug!(
                        "Transient {:?} on {} (attempt {}/{}): {}",
                        kind,
                        path.display(),
                        attempt,
                        max_attempts,
                        err
                    );
                    thread::sleep(policy.delay);
                    attempt += 1;
                }
                Some(kind) => {
                    return Err(Error::Transient {
                        kind,
                        path: path.to_path_buf(),
                        source: err,
                    })
                }
                None => {
                    return Err(Error::HardIo {
                        path: path.to_path_buf(),
                        source: err,
                    })
                }
            },
        }
    }
}
