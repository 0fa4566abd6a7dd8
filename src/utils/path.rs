use std::path::{Path, PathBuf};

/// Forward slashes only, no duplicate or trailing separators.
pub fn normalize_separators(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let absolute = replaced.starts_with('/');
    let joined = replaced
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Comparison key for `root / sub_path / file_name`. Records and scanned files
/// must both go through here so separators never cause false mismatches.
pub fn full_path_key(root: &str, sub_path: &str, file_name: &str) -> String {
    let mut joined = String::with_capacity(root.len() + sub_path.len() + file_name.len() + 2);
    joined.push_str(root);
    for part in [sub_path, file_name] {
        if !part.is_empty() {
            joined.push('/');
            joined.push_str(part);
        }
    }
    normalize_separators(&joined)
}

pub fn full_path(root: &str, sub_path: &str, file_name: &str) -> PathBuf {
    let mut path = PathBuf::from(root);
    let sub_path = normalize_separators(sub_path);
    for segment in sub_path.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path.push(file_name);
    path
}

/// Splits `a/b/c.epub` into (`a/b`, `c.epub`).
pub fn split_relative(relative: &str) -> (String, String) {
    let normalized = normalize_separators(relative);
    let trimmed = normalized.trim_start_matches('/');
    match trimmed.rsplit_once('/') {
        Some((sub_path, file_name)) => (sub_path.to_string(), file_name.to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

/// Relative (`sub_path`, `file_name`) of `file` beneath `root`.
pub fn relative_parts(root: &Path, file: &Path) -> Option<(String, String)> {
    let relative = file.strip_prefix(root).ok()?;
    let file_name = relative.file_name()?.to_string_lossy().into_owned();
    let sub_path = relative
        .parent()
        .map(|p| normalize_separators(&p.to_string_lossy()))
        .unwrap_or_default();
    Some((sub_path, file_name))
}

/// Drop roots that sit beneath another root in the list, so nothing is listed twice.
pub fn non_overlapping_roots(roots: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for root in roots {
        let root_path = Path::new(&root);
        let mut should_add = true;
        let result_clone = result.clone();

        for kept in &result_clone {
            let kept_path = Path::new(kept);

            if root_path.starts_with(kept_path) {
                should_add = false;
                break;
            }

            if kept_path.starts_with(root_path) {
                result.retain(|x| x != kept);
                break;
            }
        }

        if should_add {
            result.push(root);
        }
    }

    result
}
