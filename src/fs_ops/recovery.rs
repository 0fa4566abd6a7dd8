use super::staged::{move_path, TEMP_SUFFIX};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TempRecovery {
    pub restored: Vec<PathBuf>,
    /// Temp files whose original name is taken again; left for an operator.
    pub reported: Vec<PathBuf>,
}

/// Finds staging files left behind by an interrupted move and puts each one
/// back at its original name when that name is free.
pub fn recover_orphaned_temps(roots: &[PathBuf]) -> TempRecovery {
    let mut recovery = TempRecovery::default();

    for root in roots {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(original) = original_path_for(entry.path()) else {
                continue;
            };

            if original.exists() {
                error!(
                    temp = %entry.path().display(),
                    original = %original.display(),
                    "Orphaned temp file cannot be restored, original name is taken"
                );
                recovery.reported.push(entry.path().to_path_buf());
                continue;
            }

            match move_path(entry.path(), &original) {
                Ok(()) => {
                    info!("Recovered {} -> {}", entry.path().display(), original.display());
                    recovery.restored.push(original);
                }
                Err(e) => {
                    error!(
                        temp = %entry.path().display(),
                        "Failed to recover orphaned temp file: {}",
                        e
                    );
                    recovery.reported.push(entry.path().to_path_buf());
                }
            }
        }
    }

    recovery
}

fn original_path_for(temp: &Path) -> Option<PathBuf> {
    let name = temp.file_name()?.to_str()?;
    let original = name.strip_suffix(TEMP_SUFFIX)?;
    if original.is_empty() {
        return None;
    }
    Some(temp.with_file_name(original))
}
