use super::models::*;
use super::sqlite::Database;
use rusqlite::{params, Result, Row};
use tracing::debug;

const BOOK_COLUMNS: &str = "id, library_id, library_path_id, sub_path, file_name, book_type, \
     file_size_kb, initial_hash, current_hash, deleted, deleted_at, added_on, \
     title, authors, series_name, series_number, published_year";

const ADDITIONAL_FILE_COLUMNS: &str = "af.id, af.book_id, af.library_path_id, af.sub_path, \
     af.file_name, af.kind, af.file_size_kb, af.initial_hash, af.current_hash";

fn book_from_row(row: &Row<'_>) -> Result<BookRecord> {
    Ok(BookRecord {
        id: row.get(0)?,
        library_id: row.get(1)?,
        library_path_id: row.get(2)?,
        sub_path: row.get(3)?,
        file_name: row.get(4)?,
        book_type: row.get(5)?,
        file_size_kb: row.get(6)?,
        initial_hash: row.get(7)?,
        current_hash: row.get(8)?,
        deleted: row.get(9)?,
        deleted_at: row.get(10)?,
        added_on: row.get(11)?,
        metadata: BookMetadata {
            title: row.get(12)?,
            authors: row.get(13)?,
            series_name: row.get(14)?,
            series_number: row.get(15)?,
            published_year: row.get(16)?,
        },
    })
}

fn additional_file_from_row(row: &Row<'_>) -> Result<AdditionalFile> {
    Ok(AdditionalFile {
        id: row.get(0)?,
        book_id: row.get(1)?,
        library_path_id: row.get(2)?,
        sub_path: row.get(3)?,
        file_name: row.get(4)?,
        kind: row.get(5)?,
        file_size_kb: row.get(6)?,
        initial_hash: row.get(7)?,
        current_hash: row.get(8)?,
    })
}

/// Turns "no such row" into `None`.
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Single-row writes must hit exactly one row.
fn expect_one(changed: usize) -> Result<()> {
    if changed == 1 {
        Ok(())
    } else {
        Err(rusqlite::Error::QueryReturnedNoRows)
    }
}

impl Database {
    // ── Libraries ────────────────────────────────────────────────

    pub fn insert_library(
        &self,
        name: &str,
        naming_pattern: Option<&str>,
        watched: bool,
    ) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO library (name, naming_pattern, watched) VALUES (?1, ?2, ?3)",
            params![name, naming_pattern, watched],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_library(&self, library_id: i64) -> Result<Option<Library>> {
        optional(self.connection().query_row(
            "SELECT id, name, naming_pattern, watched FROM library WHERE id = ?1",
            params![library_id],
            |row| {
                Ok(Library {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    naming_pattern: row.get(2)?,
                    watched: row.get(3)?,
                })
            },
        ))
    }

    pub fn list_libraries(&self) -> Result<Vec<Library>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id, name, naming_pattern, watched FROM library ORDER BY id")?;
        let libraries = stmt
            .query_map([], |row| {
                Ok(Library {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    naming_pattern: row.get(2)?,
                    watched: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(libraries)
    }

    pub fn set_naming_pattern(&self, library_id: i64, pattern: Option<&str>) -> Result<()> {
        let changed = self.connection().execute(
            "UPDATE library SET naming_pattern = ?1 WHERE id = ?2",
            params![pattern, library_id],
        )?;
        expect_one(changed)
    }

    pub fn insert_library_path(&self, library_id: i64, path: &str) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO library_path (library_id, path) VALUES (?1, ?2)",
            params![library_id, path],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_library_path(&self, library_path_id: i64) -> Result<Option<LibraryPath>> {
        optional(self.connection().query_row(
            "SELECT id, library_id, path FROM library_path WHERE id = ?1",
            params![library_path_id],
            |row| {
                Ok(LibraryPath {
                    id: row.get(0)?,
                    library_id: row.get(1)?,
                    path: row.get(2)?,
                })
            },
        ))
    }

    pub fn get_library_paths(&self, library_id: i64) -> Result<Vec<LibraryPath>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, library_id, path FROM library_path WHERE library_id = ?1 ORDER BY id",
        )?;
        let paths = stmt
            .query_map(params![library_id], |row| {
                Ok(LibraryPath {
                    id: row.get(0)?,
                    library_id: row.get(1)?,
                    path: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(paths)
    }

    // ── Books ────────────────────────────────────────────────────

    pub fn insert_book(&self, book: &NewBook) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO book \
             (library_id, library_path_id, sub_path, file_name, book_type, file_size_kb, \
              initial_hash, current_hash, added_on, title, authors, series_name, \
              series_number, published_year) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                book.library_id,
                book.library_path_id,
                book.sub_path,
                book.file_name,
                book.book_type,
                book.file_size_kb,
                book.hash,
                now,
                book.metadata.title,
                book.metadata.authors,
                book.metadata.series_name,
                book.metadata.series_number,
                book.metadata.published_year,
            ],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_book(&self, book_id: i64) -> Result<Option<BookRecord>> {
        optional(self.connection().query_row(
            &format!("SELECT {} FROM book WHERE id = ?1", BOOK_COLUMNS),
            params![book_id],
            book_from_row,
        ))
    }

    /// Every book of the library, soft-deleted ones included.
    pub fn get_books_for_library(&self, library_id: i64) -> Result<Vec<BookRecord>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM book WHERE library_id = ?1 ORDER BY id",
            BOOK_COLUMNS
        ))?;
        let books = stmt
            .query_map(params![library_id], book_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(books)
    }

    pub fn update_book_location(
        &self,
        book_id: i64,
        library_id: i64,
        library_path_id: i64,
        sub_path: &str,
        file_name: &str,
    ) -> Result<()> {
        let changed = self.connection().execute(
            "UPDATE book SET library_id = ?1, library_path_id = ?2, sub_path = ?3, \
             file_name = ?4 WHERE id = ?5",
            params![library_id, library_path_id, sub_path, file_name, book_id],
        )?;
        expect_one(changed)?;
        debug!("Book {} now at {}/{}", book_id, sub_path, file_name);
        Ok(())
    }

    /// Only the current hash moves; the initial hash is fixed at discovery.
    pub fn update_book_hash(&self, book_id: i64, current_hash: &str) -> Result<()> {
        let changed = self.connection().execute(
            "UPDATE book SET current_hash = ?1 WHERE id = ?2",
            params![current_hash, book_id],
        )?;
        expect_one(changed)
    }

    pub fn soft_delete_book(&self, book_id: i64, deleted_at: &str) -> Result<()> {
        let changed = self.connection().execute(
            "UPDATE book SET deleted = 1, deleted_at = ?1 WHERE id = ?2",
            params![deleted_at, book_id],
        )?;
        expect_one(changed)
    }

    pub fn restore_book(&self, book_id: i64, added_on: &str) -> Result<()> {
        let changed = self.connection().execute(
            "UPDATE book SET deleted = 0, deleted_at = NULL, added_on = ?1 WHERE id = ?2",
            params![added_on, book_id],
        )?;
        expect_one(changed)
    }

    pub fn delete_book(&self, book_id: i64) -> Result<()> {
        let changed = self
            .connection()
            .execute("DELETE FROM book WHERE id = ?1", params![book_id])?;
        expect_one(changed)
    }

    /// Hard-deletes soft-deleted books removed before `cutoff` (RFC 3339).
    pub fn purge_deleted_before(&self, cutoff: &str) -> Result<usize> {
        let purged = self.connection().execute(
            "DELETE FROM book WHERE deleted = 1 AND deleted_at IS NOT NULL AND deleted_at < ?1",
            params![cutoff],
        )?;
        debug!("Purged {} soft-deleted books", purged);
        Ok(purged)
    }

    /// Makes `additional_file_id` the book's primary file in one transaction.
    /// `promoted` carries the book with its file fields already replaced.
    pub fn promote_additional_file(
        &self,
        promoted: &BookRecord,
        additional_file_id: i64,
    ) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE book SET library_path_id = ?1, sub_path = ?2, file_name = ?3, \
             book_type = ?4, file_size_kb = ?5, initial_hash = ?6, current_hash = ?7 \
             WHERE id = ?8",
            params![
                promoted.library_path_id,
                promoted.sub_path,
                promoted.file_name,
                promoted.book_type,
                promoted.file_size_kb,
                promoted.initial_hash,
                promoted.current_hash,
                promoted.id,
            ],
        )?;
        expect_one(changed)?;
        let removed = tx.execute(
            "DELETE FROM additional_file WHERE id = ?1 AND book_id = ?2",
            params![additional_file_id, promoted.id],
        )?;
        expect_one(removed)?;
        tx.commit()?;
        debug!(
            "Promoted additional file {} to primary file of book {}",
            additional_file_id, promoted.id
        );
        Ok(())
    }

    // ── Additional Files ─────────────────────────────────────────

    pub fn insert_additional_file(&self, file: &NewAdditionalFile) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO additional_file \
             (book_id, library_path_id, sub_path, file_name, kind, file_size_kb, \
              initial_hash, current_hash) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                file.book_id,
                file.library_path_id,
                file.sub_path,
                file.file_name,
                file.kind,
                file.file_size_kb,
                file.hash,
            ],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    /// In insertion order.
    pub fn get_additional_files_for_book(&self, book_id: i64) -> Result<Vec<AdditionalFile>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM additional_file af WHERE af.book_id = ?1 ORDER BY af.id",
            ADDITIONAL_FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![book_id], additional_file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn get_additional_files_for_library(
        &self,
        library_id: i64,
    ) -> Result<Vec<AdditionalFile>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM additional_file af \
             JOIN book b ON b.id = af.book_id \
             WHERE b.library_id = ?1 ORDER BY af.id",
            ADDITIONAL_FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![library_id], additional_file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn delete_additional_file(&self, additional_file_id: i64) -> Result<()> {
        let changed = self.connection().execute(
            "DELETE FROM additional_file WHERE id = ?1",
            params![additional_file_id],
        )?;
        expect_one(changed)
    }
}
