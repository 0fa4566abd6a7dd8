use crate::storage::models::BookRecord;
use crate::utils::path::normalize_separators;

/// Maps a book and a library naming pattern to a relative path
/// (`sub/dirs/file.ext`, forward slashes).
pub trait PathResolver: Send + Sync {
    fn resolve_path(&self, book: &BookRecord, pattern: &str) -> String;
}

/// Placeholder pattern such as `{authors}/<{series}/>{title}`.
///
/// `<...>` marks an optional block, dropped entirely when any placeholder in
/// it is empty. Unless the pattern uses `{currentFilename}`, the current file
/// extension is appended. An empty pattern keeps the current location.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternResolver;

const CURRENT_FILENAME: &str = "currentFilename";

impl PathResolver for PatternResolver {
    fn resolve_path(&self, book: &BookRecord, pattern: &str) -> String {
        let current = current_relative_path(book);
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return current;
        }

        let mut resolved = String::new();
        let mut rest = pattern;
        while let Some(start) = rest.find('<') {
            resolved.push_str(&substitute(&rest[..start], book).0);
            let block = &rest[start + 1..];
            match block.find('>') {
                Some(end) => {
                    let (text, complete) = substitute(&block[..end], book);
                    if complete {
                        resolved.push_str(&text);
                    }
                    rest = &block[end + 1..];
                }
                None => {
                    resolved.push_str(&substitute(block, book).0);
                    rest = "";
                }
            }
        }
        resolved.push_str(&substitute(rest, book).0);

        let mut relative = normalize_separators(&resolved)
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty() && *segment != "..")
            .collect::<Vec<_>>()
            .join("/");
        if relative.is_empty() {
            return current;
        }

        if !pattern.contains(&format!("{{{}}}", CURRENT_FILENAME)) {
            if let Some(extension) = extension_of(&book.file_name) {
                relative.push('.');
                relative.push_str(extension);
            }
        }
        relative
    }
}

fn current_relative_path(book: &BookRecord) -> String {
    if book.sub_path.is_empty() {
        book.file_name.clone()
    } else {
        format!("{}/{}", normalize_separators(&book.sub_path), book.file_name)
    }
}

fn extension_of(file_name: &str) -> Option<&str> {
    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && !extension.is_empty() => Some(extension),
        _ => None,
    }
}

fn stem_of(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

fn placeholder_value(name: &str, book: &BookRecord) -> String {
    let metadata = &book.metadata;
    let raw = match name {
        "title" => metadata
            .title
            .clone()
            .unwrap_or_else(|| stem_of(&book.file_name).to_string()),
        "authors" => metadata.authors.clone().unwrap_or_default(),
        "series" => metadata.series_name.clone().unwrap_or_default(),
        "seriesIndex" => metadata.series_number.map(format_number).unwrap_or_default(),
        "year" => metadata
            .published_year
            .map(|y| y.to_string())
            .unwrap_or_default(),
        CURRENT_FILENAME => book.file_name.clone(),
        "extension" => extension_of(&book.file_name).unwrap_or_default().to_string(),
        _ => String::new(),
    };
    sanitize(&raw)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Strips characters no filesystem accepts in a path segment.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Replaces `{name}` placeholders; the flag reports whether all were non-empty.
fn substitute(text: &str, book: &BookRecord) -> (String, bool) {
    let mut output = String::with_capacity(text.len());
    let mut complete = true;
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let value = placeholder_value(&after[..end], book);
                if value.is_empty() {
                    complete = false;
                }
                output.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    (output, complete)
}
