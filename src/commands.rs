use clap::{Parser, Subcommand};
use shelfkeeper::relocation::MoveRequest;

#[derive(Debug, Parser)]
#[command(name = "shelfkeeper")]
#[command(about = "Keeps a book library database in step with the files on disk", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register a library and its root paths
    AddLibrary {
        name: String,
        #[arg(required = true)]
        paths: Vec<String>,
        /// Naming pattern, e.g. "{authors}/<{series}/>{title}"
        #[arg(long)]
        pattern: Option<String>,
        /// Do not watch the library for external changes
        #[arg(long)]
        unwatched: bool,
    },
    /// Reconcile a library with its files on disk
    Scan { library_id: i64 },
    /// Move a book to the path its library's naming pattern gives
    Relocate { book_id: i64 },
    /// Move books to other libraries, each item as BOOK:LIBRARY:LIBRARY_PATH
    Move {
        #[arg(required = true, value_parser = parse_move_request)]
        items: Vec<MoveRequest>,
    },
    /// Recompute the current fingerprint of every book in a library
    RefreshHashes { library_id: i64 },
    /// Put back staging files left by an interrupted move
    RecoverTemp { library_id: i64 },
    /// Print the fingerprint of a file
    Fingerprint { path: String },
    /// Permanently delete books soft-deleted more than DAYS days ago
    PurgeDeleted {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Print configuration values
    PrintConfig,
}

fn parse_move_request(item: &str) -> Result<MoveRequest, String> {
    let parts: Vec<&str> = item.split(':').collect();
    let &[book, library, library_path] = parts.as_slice() else {
        return Err(format!("expected BOOK:LIBRARY:LIBRARY_PATH, got '{}'", item));
    };
    let id = |value: &str| {
        value
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("'{}' is not an id: {}", value, e))
    };
    Ok(MoveRequest {
        book_id: id(book)?,
        target_library_id: id(library)?,
        target_library_path_id: id(library_path)?,
    })
}
