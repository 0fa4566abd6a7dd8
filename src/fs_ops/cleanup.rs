use same_file::is_same_file;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files that do not keep a directory alive.
pub const IGNORABLE_FILE_NAMES: [&str; 2] = [".DS_Store", "Thumbs.db"];

pub fn is_ignorable_file_name(name: &str) -> bool {
    IGNORABLE_FILE_NAMES.contains(&name)
}

/// Removes `start_dir` and then each parent in turn while they hold nothing but
/// empty subdirectories and ignorable files. Never removes a protected root,
/// and never walks outside of one. Returns the number of directories removed.
pub fn cleanup_empty_ancestors(start_dir: &Path, protected_roots: &[PathBuf]) -> usize {
    let roots: Vec<PathBuf> = protected_roots
        .iter()
        .filter_map(|root| fs::canonicalize(root).ok())
        .collect();

    let mut current = match fs::canonicalize(start_dir) {
        Ok(dir) => dir,
        Err(e) => {
            debug!("Skipping cleanup of {}: {}", start_dir.display(), e);
            return 0;
        }
    };

    if !roots.iter().any(|root| current.starts_with(root)) {
        warn!(
            "Refusing to clean {}: outside every library root",
            current.display()
        );
        return 0;
    }

    let mut removed = 0;
    loop {
        if is_protected(&current, &roots) {
            break;
        }
        match remove_if_empty(&current, &roots) {
            Ok((count, true)) => removed += count,
            Ok((count, false)) => {
                removed += count;
                break;
            }
            Err(e) => {
                warn!("Failed to clean up {}: {}", current.display(), e);
                break;
            }
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if removed > 0 {
        debug!("Removed {} empty directories under {}", removed, start_dir.display());
    }
    removed
}

fn is_protected(dir: &Path, roots: &[PathBuf]) -> bool {
    roots
        .iter()
        .any(|root| is_same_file(dir, root).unwrap_or(false))
}

/// Depth-first: cleans children, then removes `dir` if nothing is left.
/// Returns how many directories were removed and whether `dir` was one of them.
fn remove_if_empty(dir: &Path, roots: &[PathBuf]) -> io::Result<(usize, bool)> {
    let mut removed = 0;
    let mut keep = false;
    let mut ignorable = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if is_protected(&path, roots) {
                keep = true;
                continue;
            }
            let (count, gone) = remove_if_empty(&path, roots)?;
            removed += count;
            keep |= !gone;
        } else if is_ignorable_file_name(&entry.file_name().to_string_lossy()) {
            ignorable.push(path);
        } else {
            keep = true;
        }
    }

    if keep {
        return Ok((removed, false));
    }

    for file in ignorable {
        fs::remove_file(&file)?;
    }
    fs::remove_dir(dir)?;
    Ok((removed + 1, true))
}
